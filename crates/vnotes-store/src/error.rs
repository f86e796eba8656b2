use std::io;

use thiserror::Error;

use crate::DocumentId;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("document store unavailable: {reason}")]
    Unavailable {
        reason: String,
        #[source]
        source: Option<io::Error>,
    },
    #[error("failed to write document {id}: {reason}")]
    Write {
        id: DocumentId,
        reason: String,
        #[source]
        source: Option<io::Error>,
    },
}

impl StoreError {
    pub fn unavailable(reason: impl Into<String>, source: Option<io::Error>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
            source,
        }
    }

    pub fn write(id: &DocumentId, reason: impl Into<String>, source: Option<io::Error>) -> Self {
        Self::Write {
            id: id.clone(),
            reason: reason.into(),
            source,
        }
    }
}
