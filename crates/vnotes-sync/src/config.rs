use std::time::Duration;

use vnotes_conf::Settings;

/// Timing knobs of the sync engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quiescence required after the last edit before a pending write is handed off.
    pub debounce: Duration,
    /// How long a keystroke keeps the typing gate closed.
    pub typing_window: Duration,
    /// Fixed delay between a failed write and its retry.
    pub retry_backoff: Duration,
    /// Period of the safety-net sweep.
    pub sweep_interval: Duration,
    /// Seed the starter notes into an empty store.
    pub seed_welcome: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for SyncConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            debounce: Duration::from_millis(settings.debounce_ms),
            typing_window: Duration::from_millis(settings.typing_window_ms),
            retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
            sweep_interval: Duration::from_millis(settings.sweep_interval_ms.max(1)),
            seed_welcome: settings.seed_welcome,
        }
    }
}
