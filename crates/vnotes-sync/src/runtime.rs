//! Tokio driver for [`SyncEngine`].
//!
//! One actor task owns the engine and serializes every event through a single
//! `select!` loop: requests from [`SyncHandle`]s, completed writes, the next
//! engine deadline, and the sweep interval. Writes run in their own task and
//! report back over a channel, so the loop never blocks on I/O.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::time;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;
use tracing::Instrument;
use vnotes_store::Document;
use vnotes_store::DocumentId;
use vnotes_store::DocumentStore;

use crate::config::SyncConfig;
use crate::engine::Effect;
use crate::engine::SwitchOutcome;
use crate::engine::SyncEngine;
use crate::error::SyncError;
use crate::exit;
use crate::exit::ExitReport;
use crate::library;
use crate::pipeline;
use crate::pipeline::WriteReport;
use crate::status::SaveStatus;
use crate::surface::EditSurface;
use crate::surface::SyncEvent;
use crate::worker::Job;

const IDLE_WAKE: Duration = Duration::from_secs(3600);
/// How long the exit path waits for a write that is still running.
const EXIT_WRITE_GRACE: Duration = Duration::from_secs(10);

type Reply<T> = oneshot::Sender<T>;

enum Request {
    Keystroke,
    ContentChanged {
        id: DocumentId,
        content: String,
    },
    Rename {
        id: DocumentId,
        title: String,
        reply: Reply<Result<(), SyncError>>,
    },
    SetTags {
        id: DocumentId,
        tags: BTreeSet<String>,
        reply: Reply<Result<(), SyncError>>,
    },
    Create {
        reply: Reply<DocumentId>,
    },
    Delete {
        id: DocumentId,
        reply: Reply<Result<(), SyncError>>,
    },
    ForceFlush {
        id: DocumentId,
        reply: Reply<bool>,
    },
    Switch {
        id: DocumentId,
        reply: Reply<Result<SwitchOutcome, SyncError>>,
    },
    ConfirmSave {
        reply: Reply<Result<SwitchOutcome, SyncError>>,
    },
    Discard {
        reply: Reply<Result<SwitchOutcome, SyncError>>,
    },
    CancelSwitch {
        reply: Reply<Result<(), SyncError>>,
    },
    Documents {
        query: String,
        reply: Reply<Vec<Document>>,
    },
    Active {
        reply: Reply<Option<Document>>,
    },
    Shutdown {
        reply: Reply<ExitReport>,
    },
}

/// Cloneable handle to a running sync engine.
///
/// When the last handle is dropped the engine performs its exit flush on its
/// own; call [`shutdown`](Self::shutdown) to wait for that flush.
#[derive(Clone)]
pub struct SyncHandle {
    sender: mpsc::UnboundedSender<Request>,
    status: watch::Receiver<SaveStatus>,
}

impl SyncHandle {
    /// Load every document from `store`, seed starter notes into an empty store
    /// when configured to, and spawn the engine.
    #[instrument(skip_all)]
    pub async fn start(
        store: Arc<dyn DocumentStore>,
        config: SyncConfig,
        surface: impl EditSurface,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SyncEvent>), SyncError> {
        let documents = store.load_all().await?;
        let seed = documents.is_empty() && config.seed_welcome;
        info!(count = documents.len(), "Starting sync engine");

        let mut engine = SyncEngine::new(config, documents);
        if seed {
            info!("Store is empty; seeding starter notes");
            let now = now();
            for document in library::starter_documents(Utc::now()) {
                engine.import(document, now);
            }
        }

        let (sender, requests) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let (status, status_rx) = watch::channel(SaveStatus::default());

        let actor = Actor {
            engine,
            store,
            surface: Box::new(surface),
            events,
            status,
            writing: false,
        };
        tokio::spawn(actor.run(requests).in_current_span());

        Ok((
            Self {
                sender,
                status: status_rx,
            },
            events_rx,
        ))
    }

    fn send(&self, request: Request) -> Result<(), SyncError> {
        self.sender
            .send(request)
            .map_err(|_| SyncError::EngineStopped)
    }

    async fn call<T>(&self, request: impl FnOnce(Reply<T>) -> Request) -> Result<T, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(request(tx))?;
        rx.await.map_err(|_| SyncError::EngineStopped)
    }

    pub fn keystroke(&self) -> Result<(), SyncError> {
        self.send(Request::Keystroke)
    }

    /// Report an edit made on the surface. Edits of unknown documents are
    /// logged and dropped by the engine.
    pub fn content_changed(
        &self,
        id: &DocumentId,
        content: impl Into<String>,
    ) -> Result<(), SyncError> {
        self.send(Request::ContentChanged {
            id: id.clone(),
            content: content.into(),
        })
    }

    pub async fn rename(&self, id: &DocumentId, title: impl Into<String>) -> Result<(), SyncError> {
        let id = id.clone();
        let title = title.into();
        self.call(|reply| Request::Rename { id, title, reply }).await?
    }

    pub async fn set_tags(&self, id: &DocumentId, tags: BTreeSet<String>) -> Result<(), SyncError> {
        let id = id.clone();
        self.call(|reply| Request::SetTags { id, tags, reply }).await?
    }

    pub async fn create_document(&self) -> Result<DocumentId, SyncError> {
        self.call(|reply| Request::Create { reply }).await
    }

    pub async fn delete_document(&self, id: &DocumentId) -> Result<(), SyncError> {
        let id = id.clone();
        self.call(|reply| Request::Delete { id, reply }).await?
    }

    /// Write the pending edit of `id` now. Returns whether a write was issued.
    pub async fn force_flush(&self, id: &DocumentId) -> Result<bool, SyncError> {
        let id = id.clone();
        self.call(|reply| Request::ForceFlush { id, reply }).await
    }

    pub async fn request_switch(&self, id: &DocumentId) -> Result<SwitchOutcome, SyncError> {
        let id = id.clone();
        self.call(|reply| Request::Switch { id, reply }).await?
    }

    pub async fn confirm_save_and_switch(&self) -> Result<SwitchOutcome, SyncError> {
        self.call(|reply| Request::ConfirmSave { reply }).await?
    }

    pub async fn discard_and_switch(&self) -> Result<SwitchOutcome, SyncError> {
        self.call(|reply| Request::Discard { reply }).await?
    }

    pub async fn cancel_switch(&self) -> Result<(), SyncError> {
        self.call(|reply| Request::CancelSwitch { reply }).await?
    }

    /// Documents matching `query`, newest first. An empty query lists all.
    pub async fn documents(&self, query: impl Into<String>) -> Result<Vec<Document>, SyncError> {
        let query = query.into();
        self.call(|reply| Request::Documents { query, reply }).await
    }

    pub async fn active_document(&self) -> Result<Option<Document>, SyncError> {
        self.call(|reply| Request::Active { reply }).await
    }

    #[must_use]
    pub fn status(&self) -> watch::Receiver<SaveStatus> {
        self.status.clone()
    }

    /// Stop the engine after flushing every unsaved change, and wait for it.
    pub async fn shutdown(&self) -> Result<ExitReport, SyncError> {
        self.call(|reply| Request::Shutdown { reply }).await
    }
}

struct Actor {
    engine: SyncEngine,
    store: Arc<dyn DocumentStore>,
    surface: Box<dyn EditSurface>,
    events: mpsc::UnboundedSender<SyncEvent>,
    status: watch::Sender<SaveStatus>,
    /// A write task is running.
    writing: bool,
}

impl Actor {
    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        let (settled_tx, mut settled_rx) = mpsc::unbounded_channel();
        let period = self.engine.config().sweep_interval;
        let mut sweep = time::interval_at(time::Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Sync engine task started");
        self.dispatch(&settled_tx);

        let shutdown_reply = loop {
            let wake = self.engine.next_deadline().map(time::Instant::from_std);
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => {
                        if let Some(reply) = self.handle(request) {
                            break Some(reply);
                        }
                    }
                    None => {
                        info!("All sync handles dropped");
                        break None;
                    }
                },
                Some(report) = settled_rx.recv() => {
                    self.writing = false;
                    self.engine.write_settled(report, now());
                }
                () = time::sleep_until(wake.unwrap_or_else(|| time::Instant::now() + IDLE_WAKE)), if wake.is_some() => {
                    self.engine.poll_timers(now());
                }
                _ = sweep.tick() => {
                    self.engine.sweep(now());
                }
            }
            self.dispatch(&settled_tx);
        };

        requests.close();
        let report = self.shutdown(&mut settled_rx).await;
        if let Some(reply) = shutdown_reply {
            if reply.send(report).is_err() {
                debug!("Shutdown requester went away before the exit report");
            }
        }
        info!("Sync engine task stopped");
    }

    /// Apply one request. Returns the reply channel of a shutdown request.
    fn handle(&mut self, request: Request) -> Option<Reply<ExitReport>> {
        let now = now();
        let engine = &mut self.engine;
        match request {
            Request::Keystroke => engine.keystroke(now),
            Request::ContentChanged { id, content } => {
                if let Err(e) = engine.content_changed(&id, content, now) {
                    warn!(error = %e, "Ignoring content change");
                }
            }
            Request::Rename { id, title, reply } => respond(reply, engine.rename(&id, title, now)),
            Request::SetTags { id, tags, reply } => respond(reply, engine.set_tags(&id, tags, now)),
            Request::Create { reply } => respond(reply, engine.create_document(now)),
            Request::Delete { id, reply } => respond(reply, engine.delete_document(&id, now)),
            Request::ForceFlush { id, reply } => respond(reply, engine.force_flush(&id, now)),
            Request::Switch { id, reply } => respond(reply, engine.request_switch(&id, now)),
            Request::ConfirmSave { reply } => respond(reply, engine.confirm_save_and_switch(now)),
            Request::Discard { reply } => respond(reply, engine.discard_and_switch(now)),
            Request::CancelSwitch { reply } => respond(reply, engine.cancel_switch()),
            Request::Documents { query, reply } => respond(reply, engine.search(&query)),
            Request::Active { reply } => respond(reply, engine.active_document().cloned()),
            Request::Shutdown { reply } => return Some(reply),
        }
        None
    }

    fn dispatch(&mut self, settled: &mpsc::UnboundedSender<WriteReport>) {
        for effect in self.engine.take_effects() {
            match effect {
                Effect::Write(job) => self.spawn_write(job, settled.clone()),
                other => self.present(other),
            }
        }
    }

    fn spawn_write(&mut self, job: Job, settled: mpsc::UnboundedSender<WriteReport>) {
        let store = Arc::clone(&self.store);
        self.writing = true;
        tokio::spawn(
            async move {
                let report = pipeline::execute(store.as_ref(), job).await;
                if settled.send(report).is_err() {
                    warn!("Sync engine stopped before a write settled");
                }
            }
            .in_current_span(),
        );
    }

    fn present(&mut self, effect: Effect) {
        match effect {
            Effect::Write(job) => {
                debug!(id = %job.document_id(), "Leaving write to the exit flush");
            }
            Effect::Activated { id, reload } => {
                if let Some(content) = reload {
                    self.surface.set_content(&content, false);
                }
                self.emit(SyncEvent::Activated(id));
            }
            Effect::Deactivated => {
                self.surface.set_content("", false);
                self.emit(SyncEvent::Deactivated);
            }
            Effect::PromptSwitch { from, to } => self.emit(SyncEvent::SwitchPrompt { from, to }),
            Effect::Status(status) => {
                debug!(%status, "Save status changed");
                self.status.send_replace(status);
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        if self.events.send(event).is_err() {
            debug!("No listener for sync events");
        }
    }

    async fn shutdown(&mut self, settled: &mut mpsc::UnboundedReceiver<WriteReport>) -> ExitReport {
        if self.writing {
            debug!("Waiting for the outstanding write before exit flush");
            match time::timeout(EXIT_WRITE_GRACE, settled.recv()).await {
                Ok(Some(report)) => self.engine.write_settled(report, now()),
                Ok(None) => {}
                Err(_) => warn!(
                    grace = ?EXIT_WRITE_GRACE,
                    "Outstanding write did not settle; flushing its document again"
                ),
            }
            self.writing = false;
        }
        for effect in self.engine.take_effects() {
            self.present(effect);
        }

        let plan = self.engine.prepare_exit();
        let report = exit::flush(self.store.as_ref(), plan).await;
        self.status.send_modify(|status| {
            status.is_saving = false;
            if let Some(id) = report.written.last() {
                status.last_saved_id = Some(id.clone());
            }
            if let Some((_, error)) = report.failed.last() {
                status.error = Some(error.clone());
            }
        });
        report
    }
}

fn respond<T>(reply: Reply<T>, value: T) {
    if reply.send(value).is_err() {
        debug!("Requester went away before the reply");
    }
}

fn now() -> std::time::Instant {
    time::Instant::now().into_std()
}
