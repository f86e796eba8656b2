//! Persistence sync for the note editor.
//!
//! Edits are debounced per document, written one at a time under a single
//! write authority, verified by reading them back, and retried on failure with
//! the newest content. The deterministic core lives in [`SyncEngine`]; a tokio
//! actor behind [`SyncHandle`] drives it against a
//! [`DocumentStore`](vnotes_store::DocumentStore).

mod config;
mod engine;
mod error;
mod exit;
pub mod library;
mod pipeline;
mod runtime;
mod scheduler;
mod status;
mod surface;
mod switcher;
mod typing;
mod worker;

pub use config::SyncConfig;
pub use engine::Effect;
pub use engine::SwitchOutcome;
pub use engine::SyncEngine;
pub use error::SyncError;
pub use error::WriteFault;
pub use exit::ExitPlan;
pub use exit::ExitReport;
pub use pipeline::execute;
pub use pipeline::WriteReport;
pub use pipeline::Written;
pub use runtime::SyncHandle;
pub use scheduler::PendingWrite;
pub use status::SaveStatus;
pub use surface::EditSurface;
pub use surface::SyncEvent;
pub use switcher::SwitchState;
pub use worker::Job;
