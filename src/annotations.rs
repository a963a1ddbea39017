//! Per-book highlights and notes.
//!
//! All books share one JSON document under [`ANNOTATIONS_KEY`], keyed by book
//! identifier. Every write replaces the whole per-book record. A document that
//! fails to parse reads as empty and is only replaced by an explicit write.

use crate::renderer::Cfi;
use crate::storage::KeyValueStore;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use ts_rs::TS;

pub const ANNOTATIONS_KEY: &str = "epubAnnotations";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Highlight {
    #[serde(default)]
    pub cfi: Cfi,
    /// Plain text captured when the highlight was created.
    #[serde(default)]
    pub text: String,
    /// Fields written by other clients, carried through untouched.
    #[serde(flatten)]
    #[ts(skip)]
    pub extra: Map<String, Value>,
}

impl Highlight {
    pub fn new(cfi: Cfi, text: impl Into<String>) -> Self {
        Self {
            cfi,
            text: text.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Note {
    #[serde(default)]
    pub cfi: Cfi,
    #[serde(default, alias = "text", alias = "note")]
    pub body: String,
    #[serde(flatten)]
    #[ts(skip)]
    pub extra: Map<String, Value>,
}

impl Note {
    pub fn new(cfi: Cfi, body: impl Into<String>) -> Self {
        Self {
            cfi,
            body: body.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BookAnnotations {
    #[serde(default)]
    pub highlights: Vec<Highlight>,
    #[serde(default)]
    pub notes: Vec<Note>,
}

#[derive(Debug, Clone)]
pub struct AnnotationRepository<S> {
    store: S,
}

impl<S: KeyValueStore> AnnotationRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Annotations for `book_id`, creating and persisting an empty record on
    /// first access.
    ///
    /// An unreadable document yields the empty record without being rewritten.
    pub fn load(&self, book_id: &str) -> Result<BookAnnotations> {
        let book_id = require_book_id(book_id)?;
        let Some(mut all) = self.read_document()? else {
            return Ok(BookAnnotations::default());
        };
        if let Some(entry) = all.get(book_id) {
            return Ok(decode_book(book_id, entry));
        }
        let empty = BookAnnotations::default();
        all.insert(book_id.to_string(), encode_book(&empty)?);
        self.write_all(&all)?;
        debug!(book_id, "Initialized empty annotations");
        Ok(empty)
    }

    /// Annotations for `book_id` without writing a default record.
    pub fn peek(&self, book_id: &str) -> Result<BookAnnotations> {
        let book_id = require_book_id(book_id)?;
        let all = self.read_all()?;
        Ok(all
            .get(book_id)
            .map(|entry| decode_book(book_id, entry))
            .unwrap_or_default())
    }

    pub fn save(&self, book_id: &str, highlights: &[Highlight], notes: &[Note]) -> Result<()> {
        let book_id = require_book_id(book_id)?;
        let mut all = self.read_all()?;
        let record = BookAnnotations {
            highlights: highlights.to_vec(),
            notes: notes.to_vec(),
        };
        all.insert(book_id.to_string(), encode_book(&record)?);
        self.write_all(&all)
    }

    /// Overwrite the highlight list of an existing record, keeping its notes.
    ///
    /// Returns `false` without writing when the book has no record yet.
    pub fn replace_highlights(&self, book_id: &str, highlights: &[Highlight]) -> Result<bool> {
        let book_id = require_book_id(book_id)?;
        let mut all = self.read_all()?;
        let Some(entry) = all.get(book_id) else {
            return Ok(false);
        };
        let mut record = decode_book(book_id, entry);
        record.highlights = highlights.to_vec();
        all.insert(book_id.to_string(), encode_book(&record)?);
        self.write_all(&all)?;
        Ok(true)
    }

    pub fn add_highlight(&self, book_id: &str, highlight: Highlight) -> Result<Vec<Highlight>> {
        let mut record = self.load(book_id)?;
        record.highlights.push(highlight);
        self.save(book_id, &record.highlights, &record.notes)?;
        Ok(record.highlights)
    }

    pub fn remove_highlight(&self, book_id: &str, cfi: &Cfi) -> Result<Vec<Highlight>> {
        let mut record = self.load(book_id)?;
        record.highlights.retain(|highlight| &highlight.cfi != cfi);
        self.save(book_id, &record.highlights, &record.notes)?;
        Ok(record.highlights)
    }

    pub fn load_notes(&self, book_id: &str) -> Result<Vec<Note>> {
        Ok(self.load(book_id)?.notes)
    }

    pub fn add_note(&self, book_id: &str, note: Note) -> Result<Vec<Note>> {
        let mut record = self.load(book_id)?;
        record.notes.push(note);
        self.save(book_id, &record.highlights, &record.notes)?;
        Ok(record.notes)
    }

    pub fn delete_note(&self, book_id: &str, cfi: &Cfi) -> Result<Vec<Note>> {
        let mut record = self.load(book_id)?;
        record.notes.retain(|note| &note.cfi != cfi);
        self.save(book_id, &record.highlights, &record.notes)?;
        Ok(record.notes)
    }

    pub fn update_notes(&self, book_id: &str, notes: Vec<Note>) -> Result<Vec<Note>> {
        let record = self.load(book_id)?;
        self.save(book_id, &record.highlights, &notes)?;
        Ok(notes)
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        Ok(self.read_document()?.unwrap_or_default())
    }

    /// The stored document, or `None` when it is not a JSON object.
    fn read_document(&self) -> Result<Option<Map<String, Value>>> {
        let Some(raw) = self
            .store
            .get(ANNOTATIONS_KEY)
            .context("failed to read annotations")?
        else {
            return Ok(Some(Map::new()));
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(all)) => Ok(Some(all)),
            Ok(_) | Err(_) => {
                warn!("Stored annotations are not a JSON object; treating as empty");
                Ok(None)
            }
        }
    }

    fn write_all(&self, all: &Map<String, Value>) -> Result<()> {
        let encoded = serde_json::to_string(all).context("failed to encode annotations")?;
        self.store
            .set(ANNOTATIONS_KEY, &encoded)
            .context("failed to write annotations")
    }
}

fn require_book_id(book_id: &str) -> Result<&str> {
    let trimmed = book_id.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("missing book identifier"));
    }
    Ok(trimmed)
}

fn decode_book(book_id: &str, entry: &Value) -> BookAnnotations {
    match serde_json::from_value::<BookAnnotations>(entry.clone()) {
        Ok(record) => record,
        Err(err) => {
            warn!(book_id, "Stored annotations for book are malformed: {err}");
            BookAnnotations::default()
        }
    }
}

fn encode_book(record: &BookAnnotations) -> Result<Value> {
    serde_json::to_value(record).context("failed to encode book annotations")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn repo() -> (Arc<MemoryStore>, AnnotationRepository<Arc<MemoryStore>>) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), AnnotationRepository::new(store))
    }

    fn stored(store: &MemoryStore) -> Value {
        serde_json::from_str(&store.get(ANNOTATIONS_KEY).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn unknown_book_loads_and_persists_empty_shape() {
        let (store, repo) = repo();

        let loaded = repo.load("moby-dick").unwrap();

        assert_eq!(loaded, BookAnnotations::default());
        assert_eq!(
            stored(&store),
            json!({ "moby-dick": { "highlights": [], "notes": [] } })
        );
    }

    #[test]
    fn corrupt_document_reads_as_empty_until_written() {
        let (store, repo) = repo();
        store.set(ANNOTATIONS_KEY, "{not json").unwrap();

        assert_eq!(repo.peek("book").unwrap(), BookAnnotations::default());
        assert_eq!(repo.load("book").unwrap(), BookAnnotations::default());
        assert_eq!(store.get(ANNOTATIONS_KEY).unwrap().as_deref(), Some("{not json"));

        repo.add_highlight("book", Highlight::new(Cfi::new("c1"), "text"))
            .unwrap();

        assert_eq!(
            stored(&store),
            json!({ "book": { "highlights": [{ "cfi": "c1", "text": "text" }], "notes": [] } })
        );
    }

    #[test]
    fn peek_does_not_write_default_record() {
        let (store, repo) = repo();
        assert!(repo.peek("book").unwrap().highlights.is_empty());
        assert_eq!(store.get(ANNOTATIONS_KEY).unwrap(), None);
    }

    #[test]
    fn missing_book_id_is_rejected() {
        let (_, repo) = repo();
        assert!(repo.load("  ").is_err());
        assert!(repo.save("", &[], &[]).is_err());
    }

    #[test]
    fn replace_highlights_requires_existing_record() {
        let (store, repo) = repo();
        let highlights = vec![Highlight::new(Cfi::new("c1"), "a")];

        assert!(!repo.replace_highlights("book", &highlights).unwrap());
        assert_eq!(store.get(ANNOTATIONS_KEY).unwrap(), None);

        repo.add_note("book", Note::new(Cfi::new("n1"), "remember"))
            .unwrap();
        assert!(repo.replace_highlights("book", &highlights).unwrap());
        let record = repo.peek("book").unwrap();
        assert_eq!(record.highlights, highlights);
        assert_eq!(record.notes.len(), 1);
    }

    #[test]
    fn unknown_fields_survive_rewrite() {
        let (store, repo) = repo();
        store
            .set(
                ANNOTATIONS_KEY,
                r#"{"book":{"highlights":[{"cfi":"c1","text":"a","color":"yellow"}],"notes":[]}}"#,
            )
            .unwrap();

        let mut highlights = repo.peek("book").unwrap().highlights;
        highlights[0].cfi = Cfi::new("c2");
        repo.replace_highlights("book", &highlights).unwrap();

        assert_eq!(
            stored(&store)["book"]["highlights"][0],
            json!({ "cfi": "c2", "text": "a", "color": "yellow" })
        );
    }

    #[test]
    fn other_books_are_left_untouched() {
        let (_, repo) = repo();
        repo.add_highlight("a", Highlight::new(Cfi::new("c1"), "one"))
            .unwrap();
        repo.add_highlight("b", Highlight::new(Cfi::new("c2"), "two"))
            .unwrap();

        repo.remove_highlight("a", &Cfi::new("c1")).unwrap();

        assert!(repo.peek("a").unwrap().highlights.is_empty());
        assert_eq!(repo.peek("b").unwrap().highlights.len(), 1);
    }

    #[test]
    fn note_operations_keep_current_highlights() {
        let (_, repo) = repo();
        repo.add_highlight("book", Highlight::new(Cfi::new("h1"), "marked"))
            .unwrap();
        repo.add_note("book", Note::new(Cfi::new("n1"), "first"))
            .unwrap();
        repo.add_note("book", Note::new(Cfi::new("n2"), "second"))
            .unwrap();

        let notes = repo.delete_note("book", &Cfi::new("n1")).unwrap();
        assert_eq!(notes, vec![Note::new(Cfi::new("n2"), "second")]);

        let replaced = repo
            .update_notes("book", vec![Note::new(Cfi::new("n3"), "third")])
            .unwrap();
        assert_eq!(repo.load_notes("book").unwrap(), replaced);
        assert_eq!(repo.peek("book").unwrap().highlights.len(), 1);
    }

    #[test]
    fn legacy_note_text_field_maps_to_body() {
        let (store, repo) = repo();
        store
            .set(
                ANNOTATIONS_KEY,
                r#"{"book":{"highlights":[],"notes":[{"cfi":"n1","text":"old"}]}}"#,
            )
            .unwrap();
        assert_eq!(repo.load_notes("book").unwrap()[0].body, "old");
    }
}
