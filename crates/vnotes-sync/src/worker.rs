//! Single-flight write authority.
//!
//! At most one durable write is outstanding across all documents. Writes that
//! arrive while the authority is held are deferred, coalesced per id, and run in
//! the order their id was first deferred once the authority is released.

use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;

use indexmap::IndexMap;
use vnotes_store::Document;
use vnotes_store::DocumentId;
use vnotes_store::Payload;

use crate::scheduler::PendingWrite;

/// A unit of work waiting for the write authority.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOp {
    Save(PendingWrite),
    Delete(DocumentId),
}

impl WriteOp {
    #[must_use]
    pub fn document_id(&self) -> &DocumentId {
        match self {
            Self::Save(write) => &write.document_id,
            Self::Delete(id) => id,
        }
    }

    #[must_use]
    pub fn kind(&self) -> OpKind {
        match self {
            Self::Save(_) => OpKind::Save,
            Self::Delete(_) => OpKind::Delete,
        }
    }
}

/// A write handed to the I/O layer, carrying the exact snapshot to persist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Job {
    Save(Document),
    Delete(DocumentId),
}

impl Job {
    #[must_use]
    pub fn document_id(&self) -> &DocumentId {
        match self {
            Self::Save(document) => &document.id,
            Self::Delete(id) => id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    Save,
    Delete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// The job is executing against the store.
    InFlight,
    /// The last attempt failed; the next one starts at `retry_at`.
    Backoff { retry_at: Instant },
}

/// The id currently holding the write authority.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Authority {
    pub id: DocumentId,
    pub kind: OpKind,
    pub phase: Phase,
    /// Failed attempts so far.
    pub attempts: u32,
    /// Set when the document was deleted while its save was in flight; the
    /// result of that save is then discarded.
    pub cancelled: bool,
}

/// What happened to the authority when its document was deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cancellation {
    NotHeld,
    /// The write was waiting out a backoff and has been abandoned.
    Released,
    /// The write is executing; its result will be ignored.
    Cancelled,
}

#[derive(Debug)]
pub struct WriteWorker {
    backoff: Duration,
    authority: Option<Authority>,
    deferred: IndexMap<DocumentId, WriteOp>,
    confirmed: HashMap<DocumentId, Payload>,
}

impl WriteWorker {
    /// Create a worker that treats `confirmed` as already durable.
    pub fn new(backoff: Duration, confirmed: impl IntoIterator<Item = (DocumentId, Payload)>) -> Self {
        Self {
            backoff,
            authority: None,
            deferred: IndexMap::new(),
            confirmed: confirmed.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.authority.is_some()
    }

    #[must_use]
    pub fn authority(&self) -> Option<&Authority> {
        self.authority.as_ref()
    }

    #[must_use]
    pub fn holds(&self, id: &DocumentId) -> bool {
        self.authority.as_ref().is_some_and(|authority| &authority.id == id)
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.authority
            .as_ref()
            .is_some_and(|authority| authority.phase == Phase::InFlight)
    }

    pub fn acquire(&mut self, id: DocumentId, kind: OpKind) {
        debug_assert!(self.authority.is_none(), "write authority already held");
        self.authority = Some(Authority {
            id,
            kind,
            phase: Phase::InFlight,
            attempts: 0,
            cancelled: false,
        });
    }

    pub fn release(&mut self) -> Option<Authority> {
        self.authority.take()
    }

    /// Move the authority into backoff after a failed attempt and return when
    /// the retry is due.
    pub fn schedule_retry(&mut self, now: Instant) -> Option<Instant> {
        let authority = self.authority.as_mut()?;
        let retry_at = now + self.backoff;
        authority.attempts += 1;
        authority.phase = Phase::Backoff { retry_at };
        Some(retry_at)
    }

    #[must_use]
    pub fn retry_at(&self) -> Option<Instant> {
        match self.authority.as_ref()?.phase {
            Phase::Backoff { retry_at } => Some(retry_at),
            Phase::InFlight => None,
        }
    }

    #[must_use]
    pub fn retry_due(&self, now: Instant) -> bool {
        self.retry_at().is_some_and(|at| at <= now)
    }

    pub fn mark_in_flight(&mut self) {
        if let Some(authority) = self.authority.as_mut() {
            authority.phase = Phase::InFlight;
        }
    }

    /// Give up on the held write for `id` because the document is gone.
    pub fn cancel(&mut self, id: &DocumentId) -> Cancellation {
        match self.authority.as_mut() {
            Some(authority) if &authority.id == id => match authority.phase {
                Phase::InFlight => {
                    authority.cancelled = true;
                    Cancellation::Cancelled
                }
                Phase::Backoff { .. } => {
                    self.authority = None;
                    Cancellation::Released
                }
            },
            _ => Cancellation::NotHeld,
        }
    }

    /// Queue `op` behind the held authority. A later op for the same id replaces
    /// the earlier one but keeps its place in line.
    pub fn defer(&mut self, op: WriteOp) {
        self.deferred.insert(op.document_id().clone(), op);
    }

    /// Queue `op` ahead of everything else deferred.
    pub fn defer_first(&mut self, op: WriteOp) {
        self.deferred.shift_remove(op.document_id());
        self.deferred.shift_insert(0, op.document_id().clone(), op);
    }

    pub fn pop_deferred(&mut self) -> Option<WriteOp> {
        self.deferred.shift_remove_index(0).map(|(_, op)| op)
    }

    pub fn remove_deferred(&mut self, id: &DocumentId) -> Option<WriteOp> {
        self.deferred.shift_remove(id)
    }

    #[must_use]
    pub fn is_deferred(&self, id: &DocumentId) -> bool {
        self.deferred.contains_key(id)
    }

    #[must_use]
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    pub fn drain_deferred(&mut self) -> Vec<WriteOp> {
        self.deferred.drain(..).map(|(_, op)| op).collect()
    }

    /// The payload last confirmed durable for `id`.
    #[must_use]
    pub fn confirmed(&self, id: &DocumentId) -> Option<&Payload> {
        self.confirmed.get(id)
    }

    pub fn confirm(&mut self, id: DocumentId, payload: Payload) {
        self.confirmed.insert(id, payload);
    }

    pub fn forget(&mut self, id: &DocumentId) {
        self.confirmed.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn save(id: &str, content: &str) -> WriteOp {
        WriteOp::Save(PendingWrite {
            document_id: id.into(),
            content: content.into(),
            enqueued_at: Instant::now(),
        })
    }

    fn worker() -> WriteWorker {
        WriteWorker::new(Duration::from_secs(2), [])
    }

    #[test]
    fn test_deferred_coalesces_and_keeps_position() {
        let mut worker = worker();
        worker.defer(save("a", "1"));
        worker.defer(save("b", "1"));
        worker.defer(save("a", "2"));

        assert_eq!(worker.deferred_len(), 2);
        assert_eq!(worker.pop_deferred(), Some(save("a", "2")));
        assert_eq!(worker.pop_deferred(), Some(save("b", "1")));
        assert_eq!(worker.pop_deferred(), None);
    }

    #[test]
    fn test_defer_first_jumps_the_queue() {
        let mut worker = worker();
        worker.defer(save("a", "1"));
        worker.defer(save("b", "1"));
        worker.defer_first(WriteOp::Delete("b".into()));

        assert_eq!(worker.pop_deferred(), Some(WriteOp::Delete("b".into())));
        assert_eq!(worker.pop_deferred(), Some(save("a", "1")));
    }

    #[test]
    fn test_retry_schedule() {
        let mut worker = worker();
        let t0 = Instant::now();
        worker.acquire("a".into(), OpKind::Save);
        assert!(worker.is_in_flight());
        assert_eq!(worker.retry_at(), None);

        let at = worker.schedule_retry(t0).unwrap();
        assert_eq!(at, t0 + Duration::from_secs(2));
        assert!(!worker.retry_due(t0 + Duration::from_secs(1)));
        assert!(worker.retry_due(at));
        assert_eq!(worker.authority().unwrap().attempts, 1);

        worker.mark_in_flight();
        assert!(worker.is_in_flight());
    }

    #[test]
    fn test_cancel_depends_on_phase() {
        let mut worker = worker();
        worker.acquire("a".into(), OpKind::Save);
        assert_eq!(worker.cancel(&"b".into()), Cancellation::NotHeld);
        assert_eq!(worker.cancel(&"a".into()), Cancellation::Cancelled);
        assert!(worker.authority().unwrap().cancelled);

        worker.release();
        worker.acquire("a".into(), OpKind::Save);
        worker.schedule_retry(Instant::now());
        assert_eq!(worker.cancel(&"a".into()), Cancellation::Released);
        assert!(!worker.is_busy());
    }
}
