use thiserror::Error;
use vnotes_store::DocumentId;
use vnotes_store::StoreError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("unknown document: {0}")]
    UnknownDocument(DocumentId),

    #[error("no document switch is waiting for a decision")]
    NoSwitchPending,

    #[error("sync engine has stopped")]
    EngineStopped,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why one write attempt did not become durable. Every fault is retried.
#[derive(Error, Debug)]
pub enum WriteFault {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("read-after-write check failed for {id}: {reason}")]
    Verification { id: DocumentId, reason: String },
}
