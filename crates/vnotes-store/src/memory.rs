use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use async_trait::async_trait;
use tracing::debug;

use crate::Document;
use crate::DocumentId;
use crate::DocumentStore;
use crate::StoreError;

/// Record of one `save` call received by a [`MemoryStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveCall {
    pub id: DocumentId,
    pub content: String,
    pub succeeded: bool,
}

#[derive(Default)]
struct Inner {
    documents: Vec<Document>,
    saves: Vec<SaveCall>,
    deletes: Vec<DocumentId>,
    fail_saves: usize,
    drop_saves: usize,
    unavailable: bool,
}

/// In-memory [`DocumentStore`] with fault injection.
///
/// Documents keep insertion order. Faults are counted down per call:
/// [`fail_next_saves`](Self::fail_next_saves) makes `save` return an error, while
/// [`drop_next_saves`](Self::drop_next_saves) makes it report success without
/// persisting anything, which is what a lagging or lossy medium looks like to a
/// read-after-write check.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_documents(documents: Vec<Document>) -> Self {
        let store = Self::default();
        store.lock().documents = documents;
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail_next_saves(&self, count: usize) {
        self.lock().fail_saves = count;
    }

    pub fn drop_next_saves(&self, count: usize) {
        self.lock().drop_saves = count;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Every `save` call received so far, including failed ones.
    #[must_use]
    pub fn save_calls(&self) -> Vec<SaveCall> {
        self.lock().saves.clone()
    }

    #[must_use]
    pub fn delete_calls(&self) -> Vec<DocumentId> {
        self.lock().deletes.clone()
    }

    #[must_use]
    pub fn get(&self, id: &DocumentId) -> Option<Document> {
        self.lock().documents.iter().find(|doc| &doc.id == id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<Document>, StoreError> {
        let inner = self.lock();
        if inner.unavailable {
            return Err(StoreError::unavailable("memory store marked unavailable", None));
        }
        Ok(inner.documents.clone())
    }

    async fn save(&self, document: &Document) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let mut call = SaveCall {
            id: document.id.clone(),
            content: document.content.clone(),
            succeeded: false,
        };

        if inner.unavailable || inner.fail_saves > 0 {
            inner.fail_saves = inner.fail_saves.saturating_sub(1);
            inner.saves.push(call);
            return Err(StoreError::write(&document.id, "injected write failure", None));
        }

        call.succeeded = true;
        inner.saves.push(call);

        if inner.drop_saves > 0 {
            inner.drop_saves -= 1;
            debug!(id = %document.id, "Dropping save without persisting");
            return Ok(());
        }

        match inner.documents.iter_mut().find(|doc| doc.id == document.id) {
            Some(existing) => *existing = document.clone(),
            None => inner.documents.push(document.clone()),
        }
        Ok(())
    }

    async fn delete(&self, id: &DocumentId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.unavailable {
            return Err(StoreError::write(id, "memory store marked unavailable", None));
        }
        inner.deletes.push(id.clone());
        inner.documents.retain(|doc| &doc.id != id);
        Ok(())
    }
}
