//! Command-line front end for a notes store.
//!
//! # Responsibility
//! - Exercise the repository surface end to end against a real store.
//! - Keep output deterministic for quick local sanity checks.

use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::process::ExitCode;
use storekeep_core::{
    init_logging, BaseRepository, EntityKind, FieldType, LogLevel, MappingContract, PageSpec,
    PersistedRecord, PersistenceClient, Predicate, Repository, Schema, SortSpec, StoreConfig,
};

#[derive(Parser)]
#[command(name = "storekeep", about = "Notes kept in an embedded object store")]
struct Cli {
    /// Store file; an in-memory store is used when omitted
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Write logs into this absolute directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Save one note per title
    Save { titles: Vec<String> },
    /// List notes ordered by title
    List {
        #[arg(long)]
        desc: bool,
        #[arg(long, default_value_t = 0)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Only titles starting with this prefix
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Delete every note
    Clear,
    /// Save a note, list, delete everything, list again
    Demo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Note {
    title: String,
}

impl MappingContract for Note {
    const KIND: &'static str = "note";

    fn write_record(&self, record: &mut PersistedRecord) {
        record.set("title", self.title.as_str());
    }

    fn from_record(record: &PersistedRecord) -> Self {
        Self {
            title: record.text("title").unwrap_or_default().to_string(),
        }
    }
}

fn note_schema() -> Schema {
    Schema::new().with_kind(EntityKind::new(Note::KIND).field("title", FieldType::Text))
}

fn print_notes(notes: &[Note]) {
    if notes.is_empty() {
        println!("(no notes)");
    }
    for note in notes {
        println!("- {}", note.title);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(log_dir) = &cli.log_dir {
        init_logging(LogLevel::default_for_build(), log_dir)?;
    }

    let config = match &cli.db {
        Some(path) => StoreConfig::at_path("notes", path, note_schema()),
        None => StoreConfig::in_memory("notes", note_schema()),
    };
    let client = PersistenceClient::open(config)?;
    let notes: Repository<Note> = Repository::new(&client)?;

    match cli.command {
        Command::Save { titles } => {
            let count = titles.len();
            notes.save_several(titles.into_iter().map(|title| Note { title }).collect())?;
            println!("saved {count} note(s)");
        }
        Command::List {
            desc,
            limit,
            offset,
            prefix,
        } => {
            let sort = if desc {
                SortSpec::descending("title")
            } else {
                SortSpec::ascending("title")
            };
            let predicate = prefix.map(|prefix| Predicate::starts_with("title", prefix));
            let page = Some(PageSpec::new(limit, offset));
            print_notes(&notes.fetch(predicate, Some(sort), page)?);
        }
        Command::Clear => {
            notes.delete_all()?;
            println!("cleared");
        }
        Command::Demo => {
            notes.save(Note {
                title: "Test title".to_string(),
            })?;
            print_notes(&notes.fetch_all()?);
            notes.delete_all()?;
            print_notes(&notes.fetch_all()?);
        }
    }

    client.close()?;
    info!("event=cli_exit module=cli status=ok");
    Ok(())
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("storekeep: {err}");
            ExitCode::FAILURE
        }
    }
}
