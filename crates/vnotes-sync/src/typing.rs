use std::time::Duration;
use std::time::Instant;

/// Process-wide "user is mid-keystroke" flag.
///
/// Every keystroke pushes the reset point `window` into the future, which is the
/// same as restarting a reset timer on each keystroke. All callers run on the
/// engine's event loop, so there is no locking.
#[derive(Debug)]
pub struct TypingGate {
    window: Duration,
    typing_until: Option<Instant>,
}

impl TypingGate {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            typing_until: None,
        }
    }

    pub fn notify_keystroke(&mut self, now: Instant) {
        self.typing_until = Some(now + self.window);
    }

    #[must_use]
    pub fn is_typing(&self, now: Instant) -> bool {
        self.typing_until.is_some_and(|until| now < until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_by_default() {
        let gate = TypingGate::new(Duration::from_millis(500));
        assert!(!gate.is_typing(Instant::now()));
    }

    #[test]
    fn test_window_restarts_on_each_keystroke() {
        let mut gate = TypingGate::new(Duration::from_millis(500));
        let t0 = Instant::now();

        gate.notify_keystroke(t0);
        assert!(gate.is_typing(t0 + Duration::from_millis(499)));

        gate.notify_keystroke(t0 + Duration::from_millis(400));
        assert!(gate.is_typing(t0 + Duration::from_millis(800)));
        assert!(!gate.is_typing(t0 + Duration::from_millis(900)));
    }
}
