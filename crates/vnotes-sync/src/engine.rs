//! The sans-IO core of the sync engine.
//!
//! [`SyncEngine`] owns every piece of state (library, typing gate, debounce
//! timers, write authority, switch prompt) and never touches a clock or a store
//! on its own. Callers pass the current [`Instant`] in, poll
//! [`next_deadline`](SyncEngine::next_deadline), and execute the [`Effect`]s it
//! queues, feeding write results back through
//! [`write_settled`](SyncEngine::write_settled).

use std::collections::BTreeSet;
use std::time::Instant;

use chrono::Utc;
use tracing::debug;
use tracing::info;
use tracing::warn;
use vnotes_store::Document;
use vnotes_store::DocumentId;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::exit::ExitPlan;
use crate::library;
use crate::library::Library;
use crate::pipeline::WriteReport;
use crate::pipeline::Written;
use crate::scheduler::PendingWrite;
use crate::scheduler::SaveScheduler;
use crate::status::SaveStatus;
use crate::switcher::DocumentSwitcher;
use crate::switcher::Resolution;
use crate::switcher::SwitchState;
use crate::switcher::Transition;
use crate::typing::TypingGate;
use crate::worker::Cancellation;
use crate::worker::Job;
use crate::worker::OpKind;
use crate::worker::WriteOp;
use crate::worker::WriteWorker;

/// Work the engine asks its driver to carry out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Execute a write. At most one is outstanding at a time.
    Write(Job),
    /// `id` became the active document. `reload` carries the content the
    /// editing surface must show, or `None` when it already shows it.
    Activated {
        id: DocumentId,
        reload: Option<String>,
    },
    /// No document is active any more.
    Deactivated,
    /// Ask the user to save, discard or cancel before switching.
    PromptSwitch {
        from: Option<DocumentId>,
        to: DocumentId,
    },
    Status(SaveStatus),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched,
    AlreadyActive,
    AwaitingDecision,
}

#[derive(Debug)]
pub struct SyncEngine {
    config: SyncConfig,
    library: Library,
    typing: TypingGate,
    scheduler: SaveScheduler,
    worker: WriteWorker,
    switcher: DocumentSwitcher,
    active: Option<DocumentId>,
    displayed: Option<String>,
    status: SaveStatus,
    published: SaveStatus,
    effects: Vec<Effect>,
}

impl SyncEngine {
    /// Build an engine over documents already durable in the store. The first
    /// document, if any, is activated.
    #[must_use]
    pub fn new(config: SyncConfig, documents: Vec<Document>) -> Self {
        let confirmed = documents
            .iter()
            .map(|doc| (doc.id.clone(), doc.payload()))
            .collect::<Vec<_>>();

        let mut engine = Self {
            config,
            library: Library::new(documents),
            typing: TypingGate::new(config.typing_window),
            scheduler: SaveScheduler::new(config.debounce),
            worker: WriteWorker::new(config.retry_backoff, confirmed),
            switcher: DocumentSwitcher::default(),
            active: None,
            displayed: None,
            status: SaveStatus::default(),
            published: SaveStatus::default(),
            effects: Vec::new(),
        };
        if let Some(first) = engine.library.first_id().cloned() {
            engine.activate(first);
        }
        engine
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Add a document that is not yet durable and queue its first save.
    pub fn import(&mut self, document: Document, now: Instant) {
        let write = PendingWrite {
            document_id: document.id.clone(),
            content: document.content.clone(),
            enqueued_at: now,
        };
        let id = document.id.clone();
        self.library.push(document);
        self.submit(WriteOp::Save(write), now);
        if self.active.is_none() {
            self.activate(id);
        }
    }

    pub fn keystroke(&mut self, now: Instant) {
        self.typing.notify_keystroke(now);
    }

    /// Record new content for `id` and restart its debounce timer.
    pub fn content_changed(
        &mut self,
        id: &DocumentId,
        content: String,
        now: Instant,
    ) -> Result<(), SyncError> {
        let document = self
            .library
            .get_mut(id)
            .ok_or_else(|| SyncError::UnknownDocument(id.clone()))?;
        document.content.clone_from(&content);

        if self.active.as_ref() == Some(id) {
            self.displayed = Some(content.clone());
        }
        self.scheduler.on_content_changed(id.clone(), content, now);
        Ok(())
    }

    pub fn rename(&mut self, id: &DocumentId, title: String, now: Instant) -> Result<(), SyncError> {
        self.edit(id, now, |doc| doc.title = title)
    }

    pub fn set_tags(
        &mut self,
        id: &DocumentId,
        tags: BTreeSet<String>,
        now: Instant,
    ) -> Result<(), SyncError> {
        self.edit(id, now, |doc| doc.tags = tags)
    }

    fn edit(
        &mut self,
        id: &DocumentId,
        now: Instant,
        apply: impl FnOnce(&mut Document),
    ) -> Result<(), SyncError> {
        let document = self
            .library
            .get_mut(id)
            .ok_or_else(|| SyncError::UnknownDocument(id.clone()))?;
        apply(document);
        let content = document.content.clone();
        self.scheduler.on_content_changed(id.clone(), content, now);
        Ok(())
    }

    /// Hand the pending write of `id` to the writer right away, bypassing the
    /// debounce. Returns `false` when there was nothing new to write.
    pub fn force_flush(&mut self, id: &DocumentId, now: Instant) -> bool {
        let Some(pending) = self.scheduler.take(id) else {
            return false;
        };
        if self.is_unchanged(&pending) {
            debug!(%id, "Pending content already saved; nothing to flush");
            return false;
        }
        debug!(%id, "Force flushing pending write");
        self.submit(WriteOp::Save(pending), now);
        true
    }

    pub fn request_switch(
        &mut self,
        target: &DocumentId,
        now: Instant,
    ) -> Result<SwitchOutcome, SyncError> {
        if !self.library.contains(target) {
            return Err(SyncError::UnknownDocument(target.clone()));
        }
        let typing = self.typing.is_typing(now);
        let transition = self
            .switcher
            .request(self.active.clone(), target.clone(), typing);
        Ok(self.apply_transition(transition, now))
    }

    pub fn confirm_save_and_switch(&mut self, now: Instant) -> Result<SwitchOutcome, SyncError> {
        let transition = self.switcher.confirm_save()?;
        Ok(self.apply_transition(transition, now))
    }

    pub fn discard_and_switch(&mut self, now: Instant) -> Result<SwitchOutcome, SyncError> {
        let transition = self.switcher.confirm_discard()?;
        Ok(self.apply_transition(transition, now))
    }

    pub fn cancel_switch(&mut self) -> Result<(), SyncError> {
        self.switcher.cancel()?;
        self.sync_hold();
        info!("Document switch cancelled");
        Ok(())
    }

    /// Keep the edits of the document a prompt is leaving away from the store
    /// until the prompt is resolved.
    fn sync_hold(&mut self) {
        self.scheduler.hold(self.switcher.held().cloned());
    }

    fn apply_transition(&mut self, transition: Transition, now: Instant) -> SwitchOutcome {
        self.sync_hold();
        match transition {
            Transition::Stay => SwitchOutcome::AlreadyActive,
            Transition::Prompt { from, to } => {
                info!(?from, %to, "Switch requested while typing; asking the user");
                self.effects.push(Effect::PromptSwitch { from, to });
                SwitchOutcome::AwaitingDecision
            }
            Transition::Switch {
                from,
                to,
                resolution,
            } => {
                if let Some(from) = &from {
                    match resolution {
                        Resolution::Flush => {
                            self.force_flush(from, now);
                        }
                        Resolution::Discard => self.discard_unsaved(from),
                    }
                }
                debug!(?from, %to, "Switching document");
                self.activate(to);
                SwitchOutcome::Switched
            }
        }
    }

    /// Drop queued edits of `id` and restore its last durable version.
    fn discard_unsaved(&mut self, id: &DocumentId) {
        self.scheduler.cancel(id);
        self.worker.remove_deferred(id);
        let Some(saved) = self.worker.confirmed(id).cloned() else {
            return;
        };
        if let Some(document) = self.library.get_mut(id) {
            document.title = saved.title;
            document.content = saved.content;
            document.tags = saved.tags;
        }
        info!(%id, "Discarded unsaved changes");
    }

    fn activate(&mut self, id: DocumentId) {
        let Some(content) = self.library.get(&id).map(|doc| doc.content.clone()) else {
            return;
        };
        let reload = (self.displayed.as_deref() != Some(content.as_str())).then(|| content.clone());
        self.displayed = Some(content);
        self.active = Some(id.clone());
        self.effects.push(Effect::Activated { id, reload });
    }

    /// Create a new untitled document, activate it and queue its first save.
    pub fn create_document(&mut self, now: Instant) -> DocumentId {
        let created = Utc::now();
        let id = self.library.next_id(created);
        let document = library::untitled(id.clone(), created);

        if let Some(previous) = self.active.clone() {
            self.force_flush(&previous, now);
        }
        self.switcher.reset();
        self.sync_hold();

        let write = PendingWrite {
            document_id: id.clone(),
            content: document.content.clone(),
            enqueued_at: now,
        };
        self.library.insert_first(document);
        info!(%id, "Created document");
        self.submit(WriteOp::Save(write), now);
        self.activate(id.clone());
        id
    }

    /// Remove `id` from the library and the store. Any queued or in-flight save
    /// for it is abandoned.
    pub fn delete_document(&mut self, id: &DocumentId, now: Instant) -> Result<(), SyncError> {
        if self.library.remove(id).is_none() {
            return Err(SyncError::UnknownDocument(id.clone()));
        }
        self.scheduler.cancel(id);
        self.worker.remove_deferred(id);
        self.switcher.forget(id);
        self.sync_hold();

        match self.worker.cancel(id) {
            Cancellation::Cancelled => {
                info!(%id, "Deleting document with a write in flight; its result will be discarded");
                self.worker.defer_first(WriteOp::Delete(id.clone()));
            }
            Cancellation::Released => {
                info!(%id, "Abandoned retrying write of deleted document");
                self.submit(WriteOp::Delete(id.clone()), now);
            }
            Cancellation::NotHeld => self.submit(WriteOp::Delete(id.clone()), now),
        }

        if self.active.as_ref() == Some(id) {
            self.active = None;
            self.displayed = None;
            match self.library.first_id().cloned() {
                Some(next) => self.activate(next),
                None => self.effects.push(Effect::Deactivated),
            }
        }
        self.refresh_status();
        Ok(())
    }

    /// Fire every timer that is due: the write retry first, then elapsed
    /// debounces.
    pub fn poll_timers(&mut self, now: Instant) {
        if self.worker.retry_due(now) {
            self.retry(now);
        }
        for pending in self.scheduler.take_due(now) {
            if self.is_unchanged(&pending) {
                debug!(id = %pending.document_id, "Debounced content already saved");
                continue;
            }
            self.submit(WriteOp::Save(pending), now);
        }
        self.refresh_status();
    }

    /// Safety net: submit every document whose content differs from what was
    /// last saved and that nothing else will write. Skipped while typing.
    pub fn sweep(&mut self, now: Instant) {
        if self.typing.is_typing(now) {
            return;
        }
        let dirty: Vec<(DocumentId, String)> = self
            .library
            .iter()
            .filter(|doc| !self.is_covered(&doc.id) && self.is_dirty(&doc.id))
            .map(|doc| (doc.id.clone(), doc.content.clone()))
            .collect();

        for (id, content) in dirty {
            info!(%id, "Sweep found unsaved changes");
            let write = PendingWrite {
                document_id: id,
                content,
                enqueued_at: now,
            };
            self.submit(WriteOp::Save(write), now);
        }
        self.refresh_status();
    }

    /// Whether a pending debounce, the write authority, a deferred op or an
    /// open switch prompt already accounts for `id`.
    fn is_covered(&self, id: &DocumentId) -> bool {
        self.scheduler.get(id).is_some()
            || self.scheduler.is_held(id)
            || self.worker.holds(id)
            || self.worker.is_deferred(id)
    }

    /// Apply the outcome of the outstanding write.
    pub fn write_settled(&mut self, report: WriteReport, now: Instant) {
        let Some(authority) = self.worker.authority().cloned() else {
            warn!(id = %report.id, "Write settled without an outstanding write");
            return;
        };
        if authority.id != report.id {
            warn!(id = %report.id, holder = %authority.id, "Write settled for a document not holding the write authority");
            return;
        }
        if authority.cancelled {
            debug!(id = %report.id, "Discarding result of cancelled write");
            self.worker.release();
            self.start_next(now);
            return;
        }

        match report.outcome {
            Ok(Written::Saved(saved)) => {
                info!(id = %saved.id, attempts = authority.attempts + 1, "Document saved");
                if let Some(document) = self.library.get_mut(&saved.id) {
                    document.updated_at = saved.updated_at;
                }
                self.worker.confirm(saved.id.clone(), saved.payload());
                self.status.last_saved_id = Some(saved.id);
                self.status.error = None;
            }
            Ok(Written::Deleted) => {
                info!(id = %report.id, "Document deleted from store");
                self.worker.forget(&report.id);
                self.status.error = None;
            }
            Err(fault) => {
                let retry_at = self.worker.schedule_retry(now);
                warn!(
                    id = %report.id,
                    error = %fault,
                    attempts = authority.attempts + 1,
                    retry_in = ?retry_at.map(|at| at.saturating_duration_since(now)),
                    "Write failed; will retry"
                );
                self.status.error = Some(fault.to_string());
                self.refresh_status();
                return;
            }
        }

        self.worker.release();
        self.start_next(now);
    }

    fn retry(&mut self, now: Instant) {
        let Some(authority) = self.worker.authority().cloned() else {
            return;
        };
        let id = authority.id;

        if authority.kind == OpKind::Delete {
            debug!(%id, attempt = authority.attempts + 1, "Retrying delete");
            self.worker.mark_in_flight();
            self.effects.push(Effect::Write(Job::Delete(id)));
            return;
        }

        let Some(document) = self.library.get(&id).cloned() else {
            warn!(%id, "Document vanished before its retry; dropping write");
            self.worker.release();
            self.start_next(now);
            return;
        };

        if self.scheduler.is_held(&id) {
            debug!(%id, "Retry waits for the switch decision");
            self.worker.release();
            self.scheduler.park(PendingWrite {
                document_id: id,
                content: document.content,
                enqueued_at: now,
            });
            self.start_next(now);
            return;
        }

        // The newest content supersedes whatever is still queued for this id.
        self.scheduler.cancel(&id);
        self.worker.remove_deferred(&id);

        if !self.is_dirty(&id) {
            debug!(%id, "Content matches last save; retry no longer needed");
            self.worker.release();
            self.status.error = None;
            self.start_next(now);
            return;
        }

        debug!(%id, attempt = authority.attempts + 1, "Retrying save with latest content");
        self.worker.mark_in_flight();
        self.effects.push(Effect::Write(Job::Save(document)));
    }

    fn submit(&mut self, op: WriteOp, now: Instant) {
        if self.worker.is_busy() {
            debug!(id = %op.document_id(), "Write authority held; deferring");
            self.worker.defer(op);
            return;
        }
        if !self.begin(op, now) {
            self.start_next(now);
        }
    }

    /// Start deferred writes until one actually begins or the queue is empty.
    fn start_next(&mut self, now: Instant) {
        while let Some(op) = self.worker.pop_deferred() {
            let op = match op {
                WriteOp::Save(pending) if self.scheduler.is_held(&pending.document_id) => {
                    debug!(id = %pending.document_id, "Holding deferred save until the switch decision");
                    self.scheduler.park(pending);
                    continue;
                }
                op => op,
            };
            if self.begin(op, now) {
                break;
            }
        }
        self.refresh_status();
    }

    /// Acquire the authority for `op` and emit its job. Returns `false` when
    /// the op turned out to need no write.
    fn begin(&mut self, op: WriteOp, now: Instant) -> bool {
        let kind = op.kind();
        let job = match op {
            WriteOp::Save(pending) => {
                let Some(document) = self.library.get(&pending.document_id) else {
                    warn!(id = %pending.document_id, "Save for a document that no longer exists; dropping");
                    return false;
                };
                if self.is_unchanged(&pending) {
                    debug!(id = %pending.document_id, "Content already saved; skipping write");
                    return false;
                }
                debug!(
                    id = %pending.document_id,
                    queued_for = ?now.saturating_duration_since(pending.enqueued_at),
                    "Handing off pending write"
                );
                let mut snapshot = document.clone();
                snapshot.content = pending.content;
                Job::Save(snapshot)
            }
            WriteOp::Delete(id) => Job::Delete(id),
        };

        debug!(id = %job.document_id(), ?kind, "Starting write");
        self.worker.acquire(job.document_id().clone(), kind);
        self.effects.push(Effect::Write(job));
        self.refresh_status();
        true
    }

    /// Whether writing `pending` would persist exactly what is already durable.
    fn is_unchanged(&self, pending: &PendingWrite) -> bool {
        let (Some(document), Some(saved)) = (
            self.library.get(&pending.document_id),
            self.worker.confirmed(&pending.document_id),
        ) else {
            return false;
        };
        saved.content == pending.content && saved.title == document.title && saved.tags == document.tags
    }

    fn refresh_status(&mut self) {
        self.status.is_saving = self.worker.is_in_flight();
        if self.status != self.published {
            self.published = self.status.clone();
            self.effects.push(Effect::Status(self.status.clone()));
        }
    }

    /// Hand over every write that must reach the store before the process exits
    /// and clear all queues.
    ///
    /// Must only be called while no write is executing: the caller waits for the
    /// outstanding write to settle first.
    pub fn prepare_exit(&mut self) -> ExitPlan {
        let mut plan = ExitPlan::default();

        if let Some(authority) = self.worker.release() {
            if authority.kind == OpKind::Delete {
                plan.push(Job::Delete(authority.id));
            }
        }
        for op in self.worker.drain_deferred() {
            if let WriteOp::Delete(id) = op {
                plan.push(Job::Delete(id));
            }
        }
        self.scheduler.drain();

        for document in self.library.iter() {
            if self.is_dirty(&document.id) {
                plan.push(Job::Save(document.clone()));
            }
        }
        info!(jobs = plan.len(), "Prepared exit flush");
        plan
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.scheduler.next_due(), self.worker.retry_at()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Whether the in-memory version of `id` differs from its last durable one.
    #[must_use]
    pub fn is_dirty(&self, id: &DocumentId) -> bool {
        match (self.library.get(id), self.worker.confirmed(id)) {
            (Some(document), Some(saved)) => document.payload() != *saved,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        !self.scheduler.is_empty() || self.worker.is_busy() || self.worker.deferred_len() > 0
    }

    #[must_use]
    pub fn is_typing(&self, now: Instant) -> bool {
        self.typing.is_typing(now)
    }

    #[must_use]
    pub fn write_in_flight(&self) -> bool {
        self.worker.is_in_flight()
    }

    #[must_use]
    pub fn active_id(&self) -> Option<&DocumentId> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn active_document(&self) -> Option<&Document> {
        self.active.as_ref().and_then(|id| self.library.get(id))
    }

    #[must_use]
    pub fn document(&self, id: &DocumentId) -> Option<&Document> {
        self.library.get(id)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.library.iter()
    }

    #[must_use]
    pub fn search(&self, query: &str) -> Vec<Document> {
        self.library.search(query).cloned().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.library.is_empty()
    }

    #[must_use]
    pub fn status(&self) -> &SaveStatus {
        &self.status
    }

    #[must_use]
    pub fn switch_state(&self) -> &SwitchState {
        self.switcher.state()
    }

    #[must_use]
    pub fn pending(&self, id: &DocumentId) -> Option<&PendingWrite> {
        self.scheduler.get(id)
    }
}
