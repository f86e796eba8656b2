use vnotes_store::DocumentId;

use crate::error::SyncError;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SwitchState {
    #[default]
    Idle,
    AwaitingUserDecision {
        from: Option<DocumentId>,
        to: DocumentId,
    },
}

/// How unsaved edits of the document being left are handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Flush them before switching.
    Flush,
    /// Abandon them and fall back to the last saved version.
    Discard,
}

/// What the engine must do in response to a switch request or decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Prompt {
        from: Option<DocumentId>,
        to: DocumentId,
    },
    Switch {
        from: Option<DocumentId>,
        to: DocumentId,
        resolution: Resolution,
    },
}

/// Decides whether changing the active document may happen immediately.
///
/// A switch while the user is mid-keystroke is never silent: it moves to
/// [`SwitchState::AwaitingUserDecision`] and waits for save, discard or cancel.
#[derive(Debug, Default)]
pub struct DocumentSwitcher {
    state: SwitchState,
}

impl DocumentSwitcher {
    #[must_use]
    pub fn state(&self) -> &SwitchState {
        &self.state
    }

    #[must_use]
    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, SwitchState::AwaitingUserDecision { .. })
    }

    /// The document being left while a prompt is open. Its edits must not be
    /// written until the user decides.
    #[must_use]
    pub fn held(&self) -> Option<&DocumentId> {
        match &self.state {
            SwitchState::AwaitingUserDecision { from, .. } => from.as_ref(),
            SwitchState::Idle => None,
        }
    }

    /// A request for the active document clears any open prompt. A new target
    /// while a prompt is open replaces the old target and prompts again.
    pub fn request(
        &mut self,
        active: Option<DocumentId>,
        to: DocumentId,
        typing: bool,
    ) -> Transition {
        if active.as_ref() == Some(&to) {
            self.state = SwitchState::Idle;
            return Transition::Stay;
        }

        if typing || self.is_awaiting() {
            self.state = SwitchState::AwaitingUserDecision {
                from: active.clone(),
                to: to.clone(),
            };
            return Transition::Prompt { from: active, to };
        }

        Transition::Switch {
            from: active,
            to,
            resolution: Resolution::Flush,
        }
    }

    pub fn confirm_save(&mut self) -> Result<Transition, SyncError> {
        self.decide(Resolution::Flush)
    }

    pub fn confirm_discard(&mut self) -> Result<Transition, SyncError> {
        self.decide(Resolution::Discard)
    }

    pub fn cancel(&mut self) -> Result<(), SyncError> {
        match std::mem::take(&mut self.state) {
            SwitchState::Idle => Err(SyncError::NoSwitchPending),
            SwitchState::AwaitingUserDecision { .. } => Ok(()),
        }
    }

    /// Drop an open prompt that involves a deleted document.
    pub fn forget(&mut self, id: &DocumentId) {
        if let SwitchState::AwaitingUserDecision { from, to } = &self.state {
            if to == id || from.as_ref() == Some(id) {
                self.state = SwitchState::Idle;
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = SwitchState::Idle;
    }

    fn decide(&mut self, resolution: Resolution) -> Result<Transition, SyncError> {
        match std::mem::take(&mut self.state) {
            SwitchState::Idle => Err(SyncError::NoSwitchPending),
            SwitchState::AwaitingUserDecision { from, to } => Ok(Transition::Switch {
                from,
                to,
                resolution,
            }),
        }
    }
}
