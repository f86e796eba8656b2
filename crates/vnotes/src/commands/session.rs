use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;
use vnotes_conf::Settings;
use vnotes_store::DocumentId;
use vnotes_store::TextStats;
use vnotes_sync::EditSurface;
use vnotes_sync::SwitchOutcome;
use vnotes_sync::SyncError;
use vnotes_sync::SyncEvent;
use vnotes_sync::SyncHandle;

use crate::args::Args;
use crate::commands::finish;
use crate::commands::list::line;
use crate::commands::start_engine;
use crate::commands::Command;
use crate::exit::Exit;

const HELP: &str = "\
commands:
  ls             list notes
  open ID        switch to a note
  type TEXT      append TEXT to the open note
  set TEXT       replace the open note's content (\\n for newlines)
  title TEXT     rename the open note
  tags A,B       replace the open note's tags
  save           write the open note now
  yes|no|cancel  answer a switch prompt
  new            create a note
  rm ID          delete a note
  status         save status and counts
  show           print the open note
  quit           save everything and exit";

#[derive(Debug, Parser)]
pub struct Session {}

/// Terminal stand-in for the editor widget: the text the user is editing.
#[derive(Clone, Default)]
struct TerminalSurface {
    text: Arc<Mutex<String>>,
}

impl TerminalSurface {
    fn text(&self) -> String {
        self.text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn edit(&self, apply: impl FnOnce(&mut String)) -> String {
        let mut text = self.text.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut text);
        text.clone()
    }
}

impl EditSurface for TerminalSurface {
    fn set_content(&mut self, content: &str, emit_change_event: bool) {
        debug!(len = content.len(), emit_change_event, "Surface reloaded");
        self.edit(|text| content.clone_into(text));
    }
}

impl Command for Session {
    async fn execute(&self, args: &Args, settings: &Settings) -> Result<Exit> {
        let surface = TerminalSurface::default();
        let (handle, mut events) = start_engine(&args.global, settings, surface.clone()).await?;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        print_events(&mut events);
        while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
            if command == "quit" {
                break;
            }
            if let Err(e) = run_line(&handle, &surface, command, rest).await {
                match e.downcast_ref::<SyncError>() {
                    Some(SyncError::EngineStopped) => return Err(e),
                    _ => println!("error: {e}"),
                }
            }
            print_events(&mut events);
        }

        finish(&handle, Exit::success()).await
    }
}

async fn run_line(handle: &SyncHandle, surface: &TerminalSurface, command: &str, rest: &str) -> Result<()> {
    match command {
        "help" => println!("{HELP}"),
        "ls" => {
            let active = active_id(handle).await?;
            for document in handle.documents("").await? {
                let marker = if Some(&document.id) == active.as_ref() { "*" } else { " " };
                println!("{marker} {}", line(&document));
            }
        }
        "open" => match handle.request_switch(&DocumentId::new(rest)).await? {
            SwitchOutcome::Switched => println!("opened {rest}"),
            SwitchOutcome::AlreadyActive => println!("{rest} is already open"),
            SwitchOutcome::AwaitingDecision => {}
        },
        "type" | "set" => {
            let id = require_active(handle).await?;
            let input = rest.replace("\\n", "\n");
            let content = surface.edit(|text| {
                if command == "set" {
                    text.clear();
                }
                text.push_str(&input);
            });
            handle.keystroke()?;
            handle.content_changed(&id, content)?;
        }
        "title" => {
            let id = require_active(handle).await?;
            handle.rename(&id, rest).await?;
        }
        "tags" => {
            let id = require_active(handle).await?;
            let tags: BTreeSet<String> = rest
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(ToString::to_string)
                .collect();
            handle.set_tags(&id, tags).await?;
        }
        "save" => {
            let id = require_active(handle).await?;
            if handle.force_flush(&id).await? {
                println!("saving {id}");
            } else {
                println!("nothing to save");
            }
        }
        "yes" => switched(handle.confirm_save_and_switch().await?),
        "no" => switched(handle.discard_and_switch().await?),
        "cancel" => {
            handle.cancel_switch().await?;
            println!("switch cancelled");
        }
        "new" => {
            let id = handle.create_document().await?;
            println!("created {id}");
        }
        "rm" => {
            handle.delete_document(&DocumentId::new(rest)).await?;
            println!("deleted {rest}");
        }
        "status" => {
            let status = handle.status().borrow().clone();
            let stats = TextStats::of(&surface.text());
            let label = status.to_string();
            let label = if label.is_empty() { "Idle" } else { label.as_str() };
            println!("{label} | {} words | {} chars", stats.words, stats.chars);
        }
        "show" => println!("{}", surface.text()),
        other => println!("unknown command: {other} (try `help`)"),
    }
    Ok(())
}

fn switched(outcome: SwitchOutcome) {
    if outcome == SwitchOutcome::Switched {
        println!("switched");
    }
}

async fn active_id(handle: &SyncHandle) -> Result<Option<DocumentId>> {
    Ok(handle.active_document().await?.map(|document| document.id))
}

async fn require_active(handle: &SyncHandle) -> Result<DocumentId> {
    active_id(handle)
        .await?
        .context("No note is open; use `new` or `open ID`")
}

fn print_events(events: &mut UnboundedReceiver<SyncEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            SyncEvent::Activated(id) => debug!(%id, "Activated"),
            SyncEvent::Deactivated => println!("no note open"),
            SyncEvent::SwitchPrompt { from, to } => {
                let from = from.map_or_else(|| "the open note".to_string(), |id| id.to_string());
                println!("unsaved changes in {from}; save before opening {to}? (yes/no/cancel)");
            }
        }
    }
}
