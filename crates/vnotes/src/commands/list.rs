use anyhow::Result;
use clap::Parser;
use vnotes_conf::Settings;
use vnotes_store::Document;

use crate::args::Args;
use crate::commands::finish;
use crate::commands::start_engine;
use crate::commands::Command;
use crate::commands::Headless;
use crate::exit::Exit;

#[derive(Debug, Parser)]
pub struct List {
    /// Only show notes whose title, content or tags contain this text.
    #[arg(long, short)]
    search: Option<String>,
}

impl Command for List {
    async fn execute(&self, args: &Args, settings: &Settings) -> Result<Exit> {
        let (handle, _events) = start_engine(&args.global, settings, Headless).await?;
        let documents = handle
            .documents(self.search.clone().unwrap_or_default())
            .await?;

        if documents.is_empty() {
            println!("No notes found.");
        }
        for document in &documents {
            println!("{}", line(document));
        }

        finish(&handle, Exit::success()).await
    }
}

pub(crate) fn line(document: &Document) -> String {
    let tags = document.tags.iter().cloned().collect::<Vec<_>>().join(",");
    let stats = document.stats();
    format!(
        "{}\t{}\t{}\t{} words",
        document.id, document.title, tags, stats.words
    )
}
