use std::time::Duration;
use std::time::Instant;

use indexmap::IndexMap;
use vnotes_store::DocumentId;

/// The latest not-yet-handed-off content of one document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingWrite {
    pub document_id: DocumentId,
    pub content: String,
    pub enqueued_at: Instant,
}

#[derive(Debug)]
struct Scheduled {
    write: PendingWrite,
    due: Instant,
}

/// Per-document debounce of content changes.
///
/// Holds at most one [`PendingWrite`] per id. A new change replaces the pending
/// content and restarts that id's timer, so only the newest content of a burst is
/// ever handed to the writer. Timers are plain deadlines; whoever drives the
/// engine polls [`take_due`](Self::take_due).
///
/// One id can be put on hold. Its pending write keeps coalescing but never
/// comes due until the hold is lifted.
#[derive(Debug)]
pub struct SaveScheduler {
    debounce: Duration,
    pending: IndexMap<DocumentId, Scheduled>,
    held: Option<DocumentId>,
}

impl SaveScheduler {
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: IndexMap::new(),
            held: None,
        }
    }

    /// Put `id` on hold, or lift the hold with `None`.
    pub fn hold(&mut self, id: Option<DocumentId>) {
        self.held = id;
    }

    #[must_use]
    pub fn is_held(&self, id: &DocumentId) -> bool {
        self.held.as_ref() == Some(id)
    }

    /// Return a write that was handed off but could not start. It is due as
    /// soon as it is not held. Newer content already pending for the id wins.
    pub fn park(&mut self, write: PendingWrite) {
        let due = write.enqueued_at;
        self.pending
            .entry(write.document_id.clone())
            .or_insert(Scheduled { write, due });
    }

    pub fn on_content_changed(&mut self, document_id: DocumentId, content: String, now: Instant) {
        let due = now + self.debounce;
        let write = PendingWrite {
            document_id: document_id.clone(),
            content,
            enqueued_at: now,
        };
        self.pending.insert(document_id, Scheduled { write, due });
    }

    /// Cancel the timer of `id` and remove its pending write in one step.
    ///
    /// This is the primitive behind a forced flush: once it returns, the timer can
    /// no longer fire for the taken content.
    pub fn take(&mut self, id: &DocumentId) -> Option<PendingWrite> {
        self.pending.shift_remove(id).map(|scheduled| scheduled.write)
    }

    /// Drop the pending write of `id`, if any.
    pub fn cancel(&mut self, id: &DocumentId) -> bool {
        self.pending.shift_remove(id).is_some()
    }

    /// Remove and return every pending write whose debounce has elapsed, oldest
    /// change first.
    pub fn take_due(&mut self, now: Instant) -> Vec<PendingWrite> {
        let mut due = Vec::new();
        let held = self.held.as_ref();
        self.pending.retain(|id, scheduled| {
            if scheduled.due <= now && Some(id) != held {
                due.push(scheduled.write.clone());
                false
            } else {
                true
            }
        });
        due.sort_by_key(|write| write.enqueued_at);
        due
    }

    #[must_use]
    pub fn next_due(&self) -> Option<Instant> {
        self.pending
            .iter()
            .filter(|(id, _)| !self.is_held(id))
            .map(|(_, scheduled)| scheduled.due)
            .min()
    }

    #[must_use]
    pub fn get(&self, id: &DocumentId) -> Option<&PendingWrite> {
        self.pending.get(id).map(|scheduled| &scheduled.write)
    }

    pub fn drain(&mut self) -> Vec<PendingWrite> {
        self.pending.drain(..).map(|(_, scheduled)| scheduled.write).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
