//! Inspect the annotations stored for a book.
//!
//! - Load configuration from `conf/config.toml`.
//! - Open the file-backed store under the configured storage directory.
//! - Print highlights, notes, and bookmarks, or check a text for duplicates.

use anyhow::{Context, Result, anyhow};
use ebup_annotations::config::load_config;
use ebup_annotations::text_utils::is_duplicate_highlight;
use ebup_annotations::{AnnotationRepository, BookmarkRepository, FileStore};
use std::env;
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

enum Command {
    List { book_id: String },
    Check { book_id: String, text: String },
}

fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle) {
        error!("{err:?}");
        std::process::exit(1);
    }
}

fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let command = parse_args()?;
    let config = load_config(Path::new("conf/config.toml"));
    set_log_level(reload_handle, config.log_level.as_filter_str());
    let store = FileStore::new(&config.storage_dir);
    info!(dir = %store.root().display(), "Opened annotation store");

    let annotations = AnnotationRepository::new(store.clone());
    match command {
        Command::List { book_id } => {
            let record = annotations
                .peek(&book_id)
                .with_context(|| format!("failed to read annotations for {book_id}"))?;
            let bookmarks = BookmarkRepository::new(store).for_book(&book_id)?;
            println!("highlights ({}):", record.highlights.len());
            for highlight in &record.highlights {
                println!("  {}  {:?}", highlight.cfi, highlight.text);
            }
            println!("notes ({}):", record.notes.len());
            for note in &record.notes {
                println!("  {}  {:?}", note.cfi, note.body);
            }
            println!("bookmarks ({}):", bookmarks.len());
            for bookmark in &bookmarks {
                println!("  {:.2}%  {}", bookmark.percentage * 100.0, bookmark.date);
            }
        }
        Command::Check { book_id, text } => {
            let record = annotations.peek(&book_id)?;
            let duplicate = is_duplicate_highlight(&text, &record.highlights);
            println!("{}", if duplicate { "highlighted" } else { "not highlighted" });
        }
    }
    Ok(())
}

fn parse_args() -> Result<Command> {
    let usage = || anyhow!("Usage: ebup-annotations <book-id> [check <text>]");
    let mut args = env::args().skip(1);
    let book_id = args.next().ok_or_else(usage)?;
    match args.next().as_deref() {
        None => Ok(Command::List { book_id }),
        Some("check") => {
            let text = args.collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                return Err(usage());
            }
            Ok(Command::Check { book_id, text })
        }
        Some(other) => Err(anyhow!("Unknown command: {other}")),
    }
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(filter_layer),
        )
        .init();
    handle
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    if env::var_os("RUST_LOG").is_some() {
        return;
    }
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(err) = handle.modify(|filter| *filter = parsed) {
        warn!(%level, "Failed to update log level from config: {err}");
    }
}
