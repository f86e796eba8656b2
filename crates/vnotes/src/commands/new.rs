use std::collections::BTreeSet;

use anyhow::Result;
use clap::Parser;
use vnotes_conf::Settings;

use crate::args::Args;
use crate::commands::finish;
use crate::commands::start_engine;
use crate::commands::Command;
use crate::commands::Headless;
use crate::exit::Exit;

#[derive(Debug, Parser)]
pub struct New {
    /// Title of the note.
    #[arg(long, short)]
    title: Option<String>,

    /// Tag to attach. May be repeated.
    #[arg(long = "tag", value_name = "TAG")]
    tags: Vec<String>,
}

impl Command for New {
    async fn execute(&self, args: &Args, settings: &Settings) -> Result<Exit> {
        let (handle, _events) = start_engine(&args.global, settings, Headless).await?;
        let id = handle.create_document().await?;

        if let Some(title) = &self.title {
            handle.rename(&id, title.clone()).await?;
        }
        if !self.tags.is_empty() {
            let tags: BTreeSet<String> = self.tags.iter().cloned().collect();
            handle.set_tags(&id, tags).await?;
        }

        finish(&handle, Exit::success().with_message(id.to_string())).await
    }
}
