mod delete;
mod list;
mod new;
mod session;

use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Subcommand;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;
use vnotes_conf::Settings;
use vnotes_store::DocumentStore;
use vnotes_store::FileStore;
use vnotes_store::MemoryStore;
use vnotes_sync::EditSurface;
use vnotes_sync::ExitReport;
use vnotes_sync::SyncConfig;
use vnotes_sync::SyncEvent;
use vnotes_sync::SyncHandle;

use crate::args::Args;
use crate::args::GlobalArgs;
use crate::exit::Exit;

pub trait Command {
    async fn execute(&self, args: &Args, settings: &Settings) -> Result<Exit>;
}

#[derive(Debug, Subcommand)]
pub enum VnotesCommand {
    /// List notes, newest first
    List(self::list::List),
    /// Create a new note and print its id
    New(self::new::New),
    /// Delete a note
    Delete(self::delete::Delete),
    /// Edit notes interactively, one command per line on stdin
    Session(self::session::Session),
}

impl VnotesCommand {
    pub async fn execute(&self, args: &Args, settings: &Settings) -> Result<Exit> {
        match self {
            Self::List(command) => command.execute(args, settings).await,
            Self::New(command) => command.execute(args, settings).await,
            Self::Delete(command) => command.execute(args, settings).await,
            Self::Session(command) => command.execute(args, settings).await,
        }
    }
}

/// Surface for commands that never display a note.
struct Headless;

impl EditSurface for Headless {
    fn set_content(&mut self, _content: &str, _emit_change_event: bool) {}
}

/// Open the configured store and start the sync engine on it.
async fn start_engine(
    args: &GlobalArgs,
    settings: &Settings,
    surface: impl EditSurface,
) -> Result<(SyncHandle, UnboundedReceiver<SyncEvent>)> {
    let store: Arc<dyn DocumentStore> = if args.in_memory {
        info!("Using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        let dir = match &args.notes_dir {
            Some(dir) => dir.clone(),
            None => settings
                .notes_dir()
                .context("Failed to resolve notes directory")?,
        };
        Arc::new(
            FileStore::open(dir)
                .await
                .context("Failed to open notes directory")?,
        )
    };

    SyncHandle::start(store, SyncConfig::from(settings), surface)
        .await
        .context("Failed to load notes")
}

/// Stop the engine, waiting for the exit flush, and turn its failures into an
/// error exit.
async fn finish(handle: &SyncHandle, exit: Exit) -> Result<Exit> {
    let report = handle
        .shutdown()
        .await
        .context("Sync engine stopped unexpectedly")?;
    Ok(flush_failures(&report).unwrap_or(exit))
}

fn flush_failures(report: &ExitReport) -> Option<Exit> {
    if report.failed.is_empty() {
        return None;
    }
    let ids: Vec<_> = report.failed.iter().map(|(id, _)| id.as_str()).collect();
    Some(Exit::error().with_message(format!(
        "Failed to save {} note(s) on exit: {}",
        ids.len(),
        ids.join(", ")
    )))
}
