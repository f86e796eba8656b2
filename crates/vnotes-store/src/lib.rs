//! Durable persistence for notes.
//!
//! The sync engine only ever talks to a [`DocumentStore`]; this crate provides the
//! trait together with a JSON-file-per-document [`FileStore`] and an in-memory
//! [`MemoryStore`] used by tests and throwaway sessions.

mod document;
mod error;
mod fs;
mod memory;

use async_trait::async_trait;

pub use document::Document;
pub use document::DocumentId;
pub use document::Payload;
pub use document::TextStats;
pub use error::StoreError;
pub use fs::FileStore;
pub use memory::MemoryStore;
pub use memory::SaveCall;

/// Key-value persistence for documents, keyed by [`DocumentId`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load every persisted document.
    async fn load_all(&self) -> Result<Vec<Document>, StoreError>;

    /// Persist one document, replacing any previous record with the same id.
    async fn save(&self, document: &Document) -> Result<(), StoreError>;

    /// Remove a document. Removing an absent document is not an error.
    async fn delete(&self, id: &DocumentId) -> Result<(), StoreError>;

    /// Point read of a single document.
    ///
    /// The default implementation scans [`load_all`](Self::load_all); stores that can
    /// address a single record directly should override it.
    async fn load(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        let documents = self.load_all().await?;
        Ok(documents.into_iter().find(|doc| &doc.id == id))
    }
}
