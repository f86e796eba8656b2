//! Execution of a single write job against a [`DocumentStore`].
//!
//! A save is only reported as successful once a read of the same id returns
//! content of the expected length and SHA-256 digest. Anything else is a
//! [`WriteFault`] and the engine retries it.

use chrono::DateTime;
use chrono::Utc;
use sha2::Digest;
use sha2::Sha256;
use tracing::debug;
use tracing::instrument;
use vnotes_store::Document;
use vnotes_store::DocumentId;
use vnotes_store::DocumentStore;

use crate::error::WriteFault;
use crate::worker::Job;

/// Outcome of one executed [`Job`], fed back into the engine.
#[derive(Debug)]
pub struct WriteReport {
    pub id: DocumentId,
    pub outcome: Result<Written, WriteFault>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Written {
    /// The document as persisted, with its final `updated_at`.
    Saved(Document),
    Deleted,
}

#[instrument(skip_all, fields(id = %job.document_id()))]
pub async fn execute(store: &dyn DocumentStore, job: Job) -> WriteReport {
    match job {
        Job::Save(document) => {
            let id = document.id.clone();
            let outcome = save_verified(store, document, Utc::now()).await;
            WriteReport { id, outcome }
        }
        Job::Delete(id) => {
            let outcome = store
                .delete(&id)
                .await
                .map(|()| Written::Deleted)
                .map_err(WriteFault::from);
            WriteReport { id, outcome }
        }
    }
}

async fn save_verified(
    store: &dyn DocumentStore,
    mut document: Document,
    now: DateTime<Utc>,
) -> Result<Written, WriteFault> {
    document.updated_at = now;
    store.save(&document).await?;

    let stored = store.load(&document.id).await?;
    verify(&document, stored.as_ref())?;
    debug!(len = document.content.len(), "Write verified");
    Ok(Written::Saved(document))
}

fn verify(expected: &Document, stored: Option<&Document>) -> Result<(), WriteFault> {
    let fault = |reason: String| WriteFault::Verification {
        id: expected.id.clone(),
        reason,
    };

    let Some(stored) = stored else {
        return Err(fault("record missing after write".to_string()));
    };
    if stored.content.len() != expected.content.len() {
        return Err(fault(format!(
            "content length mismatch: expected {}, found {}",
            expected.content.len(),
            stored.content.len()
        )));
    }
    if Sha256::digest(stored.content.as_bytes()) != Sha256::digest(expected.content.as_bytes()) {
        return Err(fault("content digest mismatch".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use vnotes_store::MemoryStore;

    use super::*;

    fn doc(content: &str) -> Document {
        Document::new("1", "Note", content, Utc::now())
    }

    #[tokio::test]
    async fn test_save_is_verified_and_stamped() {
        let store = MemoryStore::new();
        let original = doc("hello");
        let report = execute(&store, Job::Save(original.clone())).await;

        let Ok(Written::Saved(saved)) = report.outcome else {
            panic!("expected a verified save, got {:?}", report.outcome);
        };
        assert_eq!(saved.content, "hello");
        assert!(saved.updated_at >= original.updated_at);
        assert_eq!(store.get(&saved.id), Some(saved));
    }

    #[tokio::test]
    async fn test_store_error_is_a_fault() {
        let store = MemoryStore::new();
        store.fail_next_saves(1);
        let report = execute(&store, Job::Save(doc("x"))).await;
        assert!(matches!(report.outcome, Err(WriteFault::Store(_))));
    }

    #[tokio::test]
    async fn test_lost_write_fails_verification() {
        let store = MemoryStore::new();
        store.drop_next_saves(1);
        let report = execute(&store, Job::Save(doc("x"))).await;
        assert!(matches!(
            report.outcome,
            Err(WriteFault::Verification { .. })
        ));
    }

    #[test]
    fn test_verify_detects_changed_content() {
        let expected = doc("abc");
        assert!(verify(&expected, Some(&doc("abc"))).is_ok());
        assert!(verify(&expected, Some(&doc("abcd"))).is_err());
        assert!(verify(&expected, Some(&doc("abd"))).is_err());
        assert!(verify(&expected, None).is_err());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::with_documents(vec![doc("x")]);
        let report = execute(&store, Job::Delete("1".into())).await;
        assert!(matches!(report.outcome, Ok(Written::Deleted)));
        assert!(store.is_empty());
    }
}
