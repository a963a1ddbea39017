//! Reader-side glue between settings controls, the renderer, and storage.
//!
//! Style changes are applied to the renderer and followed by a highlight
//! reflow pass. Selections are checked against stored highlights by text
//! before a new one is recorded.

use crate::annotations::{AnnotationRepository, Highlight};
use crate::bookmarks::{AddOutcome, BookmarkRepository};
use crate::config::AppConfig;
use crate::reflow::{
    Reconciler, ReflowCoordinator, ReflowOutcome, ReflowSettings, SkipReason, restore_decorations,
};
use crate::renderer::{Cfi, Renderer};
use crate::storage::KeyValueStore;
use crate::text_utils::is_duplicate_highlight;
use crate::theme;
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub const VIEW_MODE_KEY: &str = "viewMode";

/// Style values picked in the current session; `None` means renderer default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReaderPrefs {
    pub font_size: Option<f64>,
    pub line_spacing: Option<f64>,
    pub view_mode: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    Added,
    AlreadyHighlighted,
    Unresolvable,
    Skipped,
}

pub struct ReaderSession<S> {
    config: AppConfig,
    store: S,
    annotations: AnnotationRepository<S>,
    bookmarks: BookmarkRepository<S>,
    reconciler: Reconciler<S>,
    prefs: Mutex<ReaderPrefs>,
}

impl<S: KeyValueStore + Clone> ReaderSession<S> {
    pub fn new(store: S, config: AppConfig) -> Self {
        Self::with_coordinator(store, config, Arc::new(ReflowCoordinator::new()))
    }

    /// Share one coordinator between sessions that may touch the same book.
    pub fn with_coordinator(
        store: S,
        config: AppConfig,
        coordinator: Arc<ReflowCoordinator>,
    ) -> Self {
        let annotations = AnnotationRepository::new(store.clone());
        let reconciler = Reconciler::new(
            annotations.clone(),
            coordinator,
            ReflowSettings::from(&config),
        );
        let prefs = ReaderPrefs {
            font_size: None,
            line_spacing: None,
            view_mode: config.default_view_mode,
        };
        Self {
            bookmarks: BookmarkRepository::new(store.clone()),
            store,
            annotations,
            reconciler,
            prefs: Mutex::new(prefs),
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn annotations(&self) -> &AnnotationRepository<S> {
        &self.annotations
    }

    pub fn bookmarks(&self) -> &BookmarkRepository<S> {
        &self.bookmarks
    }

    pub fn prefs(&self) -> ReaderPrefs {
        *self.prefs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update_prefs(&self, apply: impl FnOnce(&mut ReaderPrefs)) {
        let mut prefs = self.prefs.lock().unwrap_or_else(|e| e.into_inner());
        apply(&mut prefs);
    }

    /// Style the renderer for highlights and draw the stored ones.
    pub fn attach<R: Renderer>(&self, renderer: &mut R) -> Result<usize> {
        theme::setup_highlight_theme(renderer, self.config.highlight);
        let Some(book_id) = renderer.book_key() else {
            warn!("Renderer has no book key; nothing to restore");
            return Ok(0);
        };
        self.restore_all_highlights(renderer, &book_id)
    }

    pub async fn update_font_size<R: Renderer>(
        &self,
        renderer: &mut R,
        slider: f64,
    ) -> ReflowOutcome {
        let size = theme::font_size_for_slider(&self.config, slider);
        renderer.set_font_size(&theme::rem(size));
        self.update_prefs(|prefs| prefs.font_size = Some(size));
        debug!(slider, font_size = size, "Font size changed");
        self.reflow_highlights(renderer).await
    }

    pub async fn update_line_height<R: Renderer>(
        &self,
        renderer: &mut R,
        slider: f64,
    ) -> ReflowOutcome {
        let height = theme::line_height_for_slider(&self.config, slider);
        renderer.override_style("line-height", &theme::rem(height));
        self.update_prefs(|prefs| prefs.line_spacing = Some(height));
        debug!(slider, line_height = height, "Line height changed");
        self.reflow_highlights(renderer).await
    }

    async fn reflow_highlights<R: Renderer>(&self, renderer: &mut R) -> ReflowOutcome {
        let Some(book_id) = renderer.book_key() else {
            warn!("Style changed without a loaded book");
            return ReflowOutcome::Skipped(SkipReason::MissingBookKey);
        };
        let highlights = match self.annotations.load(&book_id) {
            Ok(record) => record.highlights,
            Err(err) => {
                warn!(%book_id, "Cannot load highlights for reflow: {err:#}");
                return ReflowOutcome::Skipped(SkipReason::StorageUnavailable);
            }
        };
        self.reconciler
            .relocate_after_reflow(renderer, highlights)
            .await
    }

    /// Bookmark the renderer's current position with today's date.
    pub fn add_bookmark<R: Renderer>(&self, renderer: &R) -> Result<AddOutcome> {
        let Some(book_id) = renderer.book_key() else {
            warn!("Cannot bookmark without a loaded book");
            return Ok(AddOutcome::Skipped);
        };
        let today = chrono::Local::now().date_naive();
        self.bookmarks.add_current(renderer, &book_id, today)
    }

    pub fn reset_reader_settings(&self) {
        self.update_prefs(|prefs| {
            prefs.font_size = None;
            prefs.line_spacing = None;
        });
    }

    pub fn toggle_view_mode(&self, value: u8) -> Result<()> {
        self.update_prefs(|prefs| prefs.view_mode = value);
        let encoded = serde_json::to_string(&value).context("failed to encode view mode")?;
        self.store
            .set(VIEW_MODE_KEY, &encoded)
            .context("failed to persist view mode")
    }

    /// Restore the persisted view mode, keeping the current one if none is stored.
    pub fn load_view_mode(&self) -> Result<u8> {
        if let Some(raw) = self
            .store
            .get(VIEW_MODE_KEY)
            .context("failed to read view mode")?
        {
            match serde_json::from_str::<u8>(&raw) {
                Ok(mode) => self.update_prefs(|prefs| prefs.view_mode = mode),
                Err(err) => warn!(%raw, "Ignoring malformed view mode: {err}"),
            }
        }
        Ok(self.prefs().view_mode)
    }

    /// Whether the text under `cfi` is already highlighted in `book_id`.
    pub fn is_text_highlighted<R: Renderer>(&self, renderer: &R, cfi: &Cfi, book_id: &str) -> bool {
        if cfi.is_empty() || book_id.trim().is_empty() {
            return false;
        }
        let Some(selected) = renderer.resolve_text(cfi) else {
            return false;
        };
        match self.annotations.peek(book_id) {
            Ok(record) => is_duplicate_highlight(&selected, &record.highlights),
            Err(err) => {
                warn!(book_id, "Cannot read highlights: {err:#}");
                false
            }
        }
    }

    /// Record and render a highlight for the selection at `cfi`.
    pub fn highlight_selection<R: Renderer>(
        &self,
        renderer: &mut R,
        book_id: &str,
        cfi: &Cfi,
    ) -> Result<SelectionOutcome> {
        if cfi.is_empty() || book_id.trim().is_empty() {
            warn!("Cannot highlight without a selection and book id");
            return Ok(SelectionOutcome::Skipped);
        }
        let Some(text) = renderer
            .resolve_text(cfi)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
        else {
            debug!(book_id, %cfi, "Selection has no text");
            return Ok(SelectionOutcome::Unresolvable);
        };
        let existing = self.annotations.peek(book_id)?;
        if is_duplicate_highlight(&text, &existing.highlights) {
            debug!(book_id, %cfi, "Selection already highlighted");
            return Ok(SelectionOutcome::AlreadyHighlighted);
        }
        if !renderer.add_highlight(cfi) {
            warn!(book_id, %cfi, "Renderer refused highlight decoration");
        }
        self.annotations
            .add_highlight(book_id, Highlight::new(cfi.clone(), text))?;
        info!(book_id, %cfi, "Added highlight");
        Ok(SelectionOutcome::Added)
    }

    pub fn remove_highlight<R: Renderer>(
        &self,
        renderer: &mut R,
        book_id: &str,
        cfi: &Cfi,
    ) -> Result<bool> {
        if cfi.is_empty() || book_id.trim().is_empty() {
            warn!("Cannot remove highlight without a reference and book id");
            return Ok(false);
        }
        renderer.remove_highlight(cfi);
        let before = self.annotations.peek(book_id)?.highlights.len();
        let after = self.annotations.remove_highlight(book_id, cfi)?.len();
        Ok(after < before)
    }

    /// Clear decorations and draw every stored highlight of `book_id`.
    pub fn restore_all_highlights<R: Renderer>(
        &self,
        renderer: &mut R,
        book_id: &str,
    ) -> Result<usize> {
        let highlights = self.annotations.load(book_id)?.highlights;
        if highlights.is_empty() {
            return Ok(0);
        }
        renderer.clear_highlights();
        restore_decorations(renderer, &highlights);
        Ok(highlights.iter().filter(|h| !h.cfi.is_empty()).count())
    }
}
