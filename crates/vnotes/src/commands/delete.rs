use anyhow::Result;
use clap::Parser;
use vnotes_conf::Settings;
use vnotes_store::DocumentId;
use vnotes_sync::SyncError;

use crate::args::Args;
use crate::commands::finish;
use crate::commands::start_engine;
use crate::commands::Command;
use crate::commands::Headless;
use crate::exit::Exit;

#[derive(Debug, Parser)]
pub struct Delete {
    /// Id of the note to delete.
    id: String,
}

impl Command for Delete {
    async fn execute(&self, args: &Args, settings: &Settings) -> Result<Exit> {
        let (handle, _events) = start_engine(&args.global, settings, Headless).await?;
        let id = DocumentId::new(self.id.as_str());

        let exit = match handle.delete_document(&id).await {
            Ok(()) => Exit::success(),
            Err(SyncError::UnknownDocument(id)) => {
                Exit::error().with_message(format!("No note with id {id}"))
            }
            Err(e) => return Err(e.into()),
        };

        finish(&handle, exit).await
    }
}
