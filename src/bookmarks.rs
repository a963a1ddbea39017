//! Per-book bookmarks stored as reading-progress fractions.
//!
//! A bookmark is identified by its progress fraction; two positions closer
//! than [`BOOKMARK_TOLERANCE`] count as the same bookmark. Stored entries
//! are decoded one by one, and a write only replaces the edited book's list.

use crate::renderer::Renderer;
use crate::storage::KeyValueStore;
use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use ts_rs::TS;

pub const BOOKMARKS_KEY: &str = "bookmarks";
pub const BOOKMARK_TOLERANCE: f64 = 0.001;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Bookmark {
    /// Reading progress in `0.0..=1.0`.
    pub percentage: f64,
    /// Creation date as `YYYY.M.D`.
    pub date: String,
}

impl Bookmark {
    pub fn new(percentage: f64, date: NaiveDate) -> Self {
        Self {
            percentage,
            date: format_bookmark_date(date),
        }
    }

    pub fn is_near(&self, percentage: f64) -> bool {
        (self.percentage - percentage).abs() < BOOKMARK_TOLERANCE
    }
}

pub fn format_bookmark_date(date: NaiveDate) -> String {
    format!("{}.{}.{}", date.year(), date.month(), date.day())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Duplicate,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct BookmarkRepository<S> {
    store: S,
}

impl<S: KeyValueStore> BookmarkRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Bookmarks of every book. Entries that fail to decode are left out.
    pub fn load_all(&self) -> Result<BTreeMap<String, Vec<Bookmark>>> {
        Ok(self
            .read_document()?
            .iter()
            .map(|(book_id, entry)| (book_id.clone(), decode_bookmarks(book_id, entry)))
            .collect())
    }

    pub fn for_book(&self, book_id: &str) -> Result<Vec<Bookmark>> {
        let document = self.read_document()?;
        Ok(book_bookmarks(&document, book_id))
    }

    pub fn add(&self, book_id: &str, percentage: f64, date: NaiveDate) -> Result<AddOutcome> {
        if book_id.trim().is_empty() {
            warn!("Cannot add bookmark without a book id");
            return Ok(AddOutcome::Skipped);
        }
        if !percentage.is_finite() {
            return Err(anyhow!("invalid reading progress {percentage}"));
        }
        let percentage = percentage.clamp(0.0, 1.0);
        let mut document = self.read_document()?;
        let mut entries = book_bookmarks(&document, book_id);
        if entries.iter().any(|existing| existing.is_near(percentage)) {
            debug!(book_id, percentage, "Bookmark already exists");
            return Ok(AddOutcome::Duplicate);
        }
        entries.push(Bookmark::new(percentage, date));
        self.write_book(&mut document, book_id, &entries)?;
        info!(book_id, percentage, "Added bookmark");
        Ok(AddOutcome::Added)
    }

    /// Bookmark the renderer's current position.
    pub fn add_current<R: Renderer>(
        &self,
        renderer: &R,
        book_id: &str,
        today: NaiveDate,
    ) -> Result<AddOutcome> {
        let Some(location) = renderer.current_location() else {
            warn!(book_id, "Cannot bookmark: renderer has no current location");
            return Ok(AddOutcome::Skipped);
        };
        let Some(percentage) = renderer.percentage_from_cfi(&location.start) else {
            warn!(book_id, cfi = %location.start, "Cannot bookmark: position has no progress");
            return Ok(AddOutcome::Skipped);
        };
        self.add(book_id, percentage, today)
    }

    /// Remove bookmarks stored at exactly `percentage`.
    pub fn remove(&self, book_id: &str, percentage: f64) -> Result<Vec<Bookmark>> {
        if book_id.trim().is_empty() {
            warn!("Cannot remove bookmark without a book id");
            return Ok(Vec::new());
        }
        let mut document = self.read_document()?;
        let mut entries = book_bookmarks(&document, book_id);
        entries.retain(|bookmark| bookmark.percentage != percentage);
        self.write_book(&mut document, book_id, &entries)?;
        Ok(entries)
    }

    /// Navigate the renderer to the bookmark near `percentage`.
    ///
    /// Returns the bookmark that was displayed, or `None` when inputs are
    /// missing or no bookmark matches.
    pub fn goto<R: Renderer>(
        &self,
        renderer: &mut R,
        book_id: &str,
        percentage: f64,
        location_chars: usize,
    ) -> Result<Option<Bookmark>> {
        if book_id.trim().is_empty() {
            warn!("Cannot open bookmark without a book id");
            return Ok(None);
        }
        let bookmarks = self.for_book(book_id)?;
        if bookmarks.is_empty() {
            warn!(book_id, "No bookmarks found for book");
            return Ok(None);
        }
        let Some(target) = bookmarks.into_iter().find(|b| b.is_near(percentage)) else {
            warn!(book_id, percentage, "Bookmark not found");
            return Ok(None);
        };
        if !renderer.has_locations() {
            renderer
                .generate_locations(location_chars)
                .context("failed to generate book locations")?;
        }
        if !display_bookmark(renderer, &target)? {
            return Ok(None);
        }
        Ok(Some(target))
    }

    /// Raw per-book entries; a document that is not a JSON object reads as empty.
    fn read_document(&self) -> Result<Map<String, Value>> {
        let Some(raw) = self
            .store
            .get(BOOKMARKS_KEY)
            .context("failed to read bookmarks")?
        else {
            return Ok(Map::new());
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(document)) => Ok(document),
            Ok(_) | Err(_) => {
                warn!("Stored bookmarks are malformed; treating as empty");
                Ok(Map::new())
            }
        }
    }

    /// Replace one book's list, leaving every other book's raw entry as stored.
    fn write_book(
        &self,
        document: &mut Map<String, Value>,
        book_id: &str,
        entries: &[Bookmark],
    ) -> Result<()> {
        let encoded = serde_json::to_value(entries).context("failed to encode bookmarks")?;
        document.insert(book_id.to_string(), encoded);
        let encoded = serde_json::to_string(document).context("failed to encode bookmarks")?;
        self.store
            .set(BOOKMARKS_KEY, &encoded)
            .context("failed to write bookmarks")
    }
}

fn book_bookmarks(document: &Map<String, Value>, book_id: &str) -> Vec<Bookmark> {
    document
        .get(book_id)
        .map(|entry| decode_bookmarks(book_id, entry))
        .unwrap_or_default()
}

fn decode_bookmarks(book_id: &str, entry: &Value) -> Vec<Bookmark> {
    let Some(items) = entry.as_array() else {
        warn!(book_id, "Stored bookmarks for book are not a list; ignoring");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<Bookmark>(item.clone()) {
            Ok(bookmark) => Some(bookmark),
            Err(err) => {
                warn!(book_id, "Skipping malformed bookmark: {err}");
                None
            }
        })
        .collect()
}

/// Show the bookmark's position; call again after a resize to re-anchor.
pub fn display_bookmark<R: Renderer>(renderer: &mut R, bookmark: &Bookmark) -> Result<bool> {
    let Some(cfi) = renderer.cfi_from_percentage(bookmark.percentage) else {
        warn!(
            percentage = bookmark.percentage,
            "Renderer has no position for bookmark"
        );
        return Ok(false);
    };
    renderer
        .display(&cfi)
        .with_context(|| format!("failed to display {cfi}"))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::mock::MockRenderer;
    use crate::renderer::{Cfi, VisibleRange};
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    fn repo() -> (Arc<MemoryStore>, BookmarkRepository<Arc<MemoryStore>>) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), BookmarkRepository::new(store))
    }

    #[test]
    fn date_is_formatted_without_padding() {
        assert_eq!(format_bookmark_date(day()), "2024.3.7");
    }

    #[test]
    fn close_progress_is_rejected_as_duplicate() {
        let (_, repo) = repo();
        assert_eq!(repo.add("book", 0.5005, day()).unwrap(), AddOutcome::Added);

        assert_eq!(
            repo.add("book", 0.5001, day()).unwrap(),
            AddOutcome::Duplicate
        );
        assert_eq!(repo.for_book("book").unwrap().len(), 1);
    }

    #[test]
    fn progress_beyond_tolerance_is_accepted() {
        let (_, repo) = repo();
        repo.add("book", 0.5005, day()).unwrap();

        assert_eq!(repo.add("book", 0.502, day()).unwrap(), AddOutcome::Added);
        let stored = repo.for_book("book").unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1], Bookmark::new(0.502, day()));
    }

    #[test]
    fn duplicates_are_scoped_per_book() {
        let (_, repo) = repo();
        repo.add("a", 0.25, day()).unwrap();
        assert_eq!(repo.add("b", 0.25, day()).unwrap(), AddOutcome::Added);
    }

    #[test]
    fn missing_book_id_is_skipped() {
        let (store, repo) = repo();
        assert_eq!(repo.add("", 0.3, day()).unwrap(), AddOutcome::Skipped);
        assert_eq!(store.get(BOOKMARKS_KEY).unwrap(), None);
    }

    #[test]
    fn non_finite_progress_is_an_error() {
        let (_, repo) = repo();
        assert!(repo.add("book", f64::NAN, day()).is_err());
    }

    #[test]
    fn corrupt_store_reads_as_empty() {
        let (store, repo) = repo();
        store.set(BOOKMARKS_KEY, "[oops").unwrap();
        assert!(repo.load_all().unwrap().is_empty());
        assert_eq!(repo.add("book", 0.1, day()).unwrap(), AddOutcome::Added);
    }

    #[test]
    fn malformed_entries_leave_other_bookmarks_intact() {
        let (store, repo) = repo();
        store
            .set(
                BOOKMARKS_KEY,
                r#"{"a":[{"percentage":0.1,"date":"2024.3.1"},{"date":"2024.3.2"}],
                    "b":[{"percentage":null,"date":"2024.3.3"}]}"#,
            )
            .unwrap();

        let earlier = Bookmark {
            percentage: 0.1,
            date: "2024.3.1".to_string(),
        };
        assert_eq!(repo.for_book("a").unwrap(), vec![earlier.clone()]);
        assert!(repo.load_all().unwrap()["b"].is_empty());

        assert_eq!(repo.add("a", 0.5, day()).unwrap(), AddOutcome::Added);

        assert_eq!(
            repo.for_book("a").unwrap(),
            vec![earlier, Bookmark::new(0.5, day())]
        );
        let stored: Value =
            serde_json::from_str(&store.get(BOOKMARKS_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(
            stored["b"],
            serde_json::json!([{ "percentage": null, "date": "2024.3.3" }])
        );
    }

    #[test]
    fn remove_drops_exact_match_only() {
        let (_, repo) = repo();
        repo.add("book", 0.1, day()).unwrap();
        repo.add("book", 0.2, day()).unwrap();

        let remaining = repo.remove("book", 0.1).unwrap();

        assert_eq!(remaining, vec![Bookmark::new(0.2, day())]);
        assert_eq!(repo.for_book("book").unwrap(), remaining);
    }

    #[test]
    fn add_current_uses_renderer_progress() {
        let (_, repo) = repo();
        let mut renderer = MockRenderer::with_page("book", &[]);
        renderer.location = Some(VisibleRange {
            start: Cfi::new("pos:42"),
            end: Cfi::new("pos:43"),
        });

        assert_eq!(
            repo.add_current(&renderer, "book", day()).unwrap(),
            AddOutcome::Added
        );
        let stored = repo.for_book("book").unwrap();
        assert!((stored[0].percentage - 0.42).abs() < 1e-9);
    }

    #[test]
    fn goto_generates_locations_then_displays() {
        let (_, repo) = repo();
        repo.add("book", 0.25, day()).unwrap();
        let mut renderer = MockRenderer::with_page("book", &[]);

        let shown = repo.goto(&mut renderer, "book", 0.2504, 1000).unwrap();

        assert_eq!(shown, Some(Bookmark::new(0.25, day())));
        assert_eq!(renderer.generated_with, Some(1000));
        assert_eq!(renderer.displayed, vec![Cfi::new("pos:25")]);
    }

    #[test]
    fn goto_unknown_bookmark_does_nothing() {
        let (_, repo) = repo();
        repo.add("book", 0.25, day()).unwrap();
        let mut renderer = MockRenderer::with_page("book", &[]);

        assert_eq!(repo.goto(&mut renderer, "book", 0.9, 1000).unwrap(), None);
        assert_eq!(repo.goto(&mut renderer, "other", 0.25, 1000).unwrap(), None);
        assert!(renderer.displayed.is_empty());
        assert_eq!(renderer.generated_with, None);
    }
}
