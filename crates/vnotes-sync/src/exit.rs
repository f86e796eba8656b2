//! Final best-effort flush at shutdown.

use chrono::Utc;
use tracing::error;
use tracing::info;
use tracing::instrument;
use vnotes_store::DocumentId;
use vnotes_store::DocumentStore;

use crate::worker::Job;

/// Writes that must be attempted before the process exits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExitPlan {
    jobs: Vec<Job>,
}

impl ExitPlan {
    pub(crate) fn push(&mut self, job: Job) {
        self.jobs.push(job);
    }

    #[must_use]
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExitReport {
    pub written: Vec<DocumentId>,
    pub failed: Vec<(DocumentId, String)>,
}

impl ExitReport {
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.written.len() + self.failed.len()
    }
}

/// Attempt every job of `plan` once, in order. A failure is logged and the
/// flush moves on to the next job.
#[instrument(skip_all, fields(jobs = plan.len()))]
pub async fn flush(store: &dyn DocumentStore, plan: ExitPlan) -> ExitReport {
    let mut report = ExitReport::default();

    for job in plan.jobs {
        let id = job.document_id().clone();
        let result = match job {
            Job::Save(mut document) => {
                document.updated_at = Utc::now();
                store.save(&document).await
            }
            Job::Delete(id) => store.delete(&id).await,
        };
        match result {
            Ok(()) => report.written.push(id),
            Err(e) => {
                error!(%id, error = %e, "Exit flush write failed; continuing");
                report.failed.push((id, e.to_string()));
            }
        }
    }

    info!(
        written = report.written.len(),
        failed = report.failed.len(),
        "Exit flush finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use vnotes_store::Document;
    use vnotes_store::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn test_failure_does_not_stop_flush() {
        let store = MemoryStore::new();
        store.fail_next_saves(1);
        let now = Utc::now();

        let mut plan = ExitPlan::default();
        plan.push(Job::Save(Document::new("a", "A", "a", now)));
        plan.push(Job::Save(Document::new("b", "B", "b", now)));

        let report = flush(&store, plan).await;
        assert_eq!(report.attempted(), 2);
        assert_eq!(report.written, vec![DocumentId::new("b")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, DocumentId::new("a"));
        assert!(store.get(&"b".into()).is_some());
    }

    #[tokio::test]
    async fn test_deletes_are_flushed() {
        let store = MemoryStore::with_documents(vec![Document::new("a", "A", "a", Utc::now())]);
        let mut plan = ExitPlan::default();
        plan.push(Job::Delete("a".into()));

        let report = flush(&store, plan).await;
        assert_eq!(report.written, vec![DocumentId::new("a")]);
        assert!(store.is_empty());
    }
}
