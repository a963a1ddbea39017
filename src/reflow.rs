//! Highlight reconciliation after a reflow.
//!
//! Font and line-height changes make the renderer re-paginate, after which the
//! stored references of existing highlights may point at the wrong text. A
//! reflow pass waits for the renderer to settle, looks each highlight's text
//! up on the visible page, re-renders the decorations, and writes the new
//! references back.
//!
//! Passes are single-flight per book: starting a pass cancels the previous one
//! for the same book, and a cancelled pass stops before it renders or
//! persists anything.

use crate::annotations::{AnnotationRepository, Highlight};
use crate::cancellation::CancellationToken;
use crate::config::AppConfig;
use crate::renderer::{Cfi, Renderer};
use crate::storage::KeyValueStore;
use crate::text_utils::find_first_occurrence;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReflowSettings {
    /// Fixed wait after a style change when the renderer cannot report
    /// relayout progress; also the pause between retries.
    pub settle_delay: Duration,
    /// Extra scans for highlights that were not found on the first one.
    pub retry_limit: usize,
    pub relayout_timeout: Duration,
    pub relayout_poll: Duration,
}

impl From<&AppConfig> for ReflowSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            retry_limit: config.reflow_retry_limit,
            relayout_timeout: config.relayout_timeout(),
            relayout_poll: config.relayout_poll(),
        }
    }
}

impl Default for ReflowSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

#[derive(Debug)]
struct InFlight {
    generation: u64,
    token: CancellationToken,
}

/// Tracks the latest reflow pass per book.
#[derive(Debug, Default)]
pub struct ReflowCoordinator {
    inflight: Mutex<HashMap<String, InFlight>>,
    next_generation: AtomicU64,
}

/// Handle for one reflow pass.
#[derive(Debug, Clone)]
pub struct ReflowTicket {
    book_id: String,
    generation: u64,
    token: CancellationToken,
}

impl ReflowTicket {
    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl ReflowCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pass for `book_id`, cancelling the one it replaces.
    pub fn begin(&self, book_id: &str) -> ReflowTicket {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = inflight.insert(
            book_id.to_string(),
            InFlight {
                generation,
                token: token.clone(),
            },
        ) {
            debug!(
                book_id,
                superseded = previous.generation,
                generation,
                "Cancelling earlier reflow pass"
            );
            previous.token.cancel_by(generation);
        }
        ReflowTicket {
            book_id: book_id.to_string(),
            generation,
            token,
        }
    }

    pub fn finish(&self, ticket: &ReflowTicket) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if inflight
            .get(&ticket.book_id)
            .is_some_and(|current| current.generation == ticket.generation)
        {
            inflight.remove(&ticket.book_id);
        }
    }

    pub fn in_flight(&self, book_id: &str) -> bool {
        let inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        inflight.contains_key(book_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingBookKey,
    NoHighlights,
    NoVisibleRange,
    StorageUnavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReflowReport {
    /// Input highlights in input order, with references replaced where found.
    pub highlights: Vec<Highlight>,
    pub relocated: usize,
    pub missed: usize,
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReflowOutcome {
    Skipped(SkipReason),
    Superseded,
    Completed(ReflowReport),
}

impl ReflowOutcome {
    pub fn highlights(&self) -> Option<&[Highlight]> {
        match self {
            ReflowOutcome::Completed(report) => Some(&report.highlights),
            _ => None,
        }
    }
}

pub struct Reconciler<S> {
    repo: AnnotationRepository<S>,
    coordinator: Arc<ReflowCoordinator>,
    settings: ReflowSettings,
}

impl<S: KeyValueStore> Reconciler<S> {
    pub fn new(
        repo: AnnotationRepository<S>,
        coordinator: Arc<ReflowCoordinator>,
        settings: ReflowSettings,
    ) -> Self {
        Self {
            repo,
            coordinator,
            settings,
        }
    }

    pub fn coordinator(&self) -> &Arc<ReflowCoordinator> {
        &self.coordinator
    }

    /// Recompute highlight references for the renderer's book after a reflow.
    pub async fn relocate_after_reflow<R: Renderer>(
        &self,
        renderer: &mut R,
        highlights: Vec<Highlight>,
    ) -> ReflowOutcome {
        let Some(book_id) = renderer.book_key().filter(|key| !key.trim().is_empty()) else {
            warn!("Skipping highlight reflow: renderer has no book key");
            return ReflowOutcome::Skipped(SkipReason::MissingBookKey);
        };
        if highlights.is_empty() {
            debug!(%book_id, "No highlights to reflow");
            return ReflowOutcome::Skipped(SkipReason::NoHighlights);
        }
        let ticket = self.coordinator.begin(&book_id);
        let outcome = self.run_pass(renderer, &ticket, highlights).await;
        self.coordinator.finish(&ticket);
        outcome
    }

    /// Run one pass under an already issued ticket.
    pub async fn run_pass<R: Renderer>(
        &self,
        renderer: &mut R,
        ticket: &ReflowTicket,
        highlights: Vec<Highlight>,
    ) -> ReflowOutcome {
        let book_id = ticket.book_id();
        renderer.clear_highlights();
        self.wait_for_relayout(renderer).await;
        if ticket.token.check_cancelled("settle").is_err() {
            debug!(book_id, "Reflow pass superseded while settling");
            return ReflowOutcome::Superseded;
        }

        let targets: Vec<Option<String>> = highlights
            .iter()
            .map(|highlight| search_text(&*renderer, highlight))
            .collect();
        let mut relocated: Vec<Option<Cfi>> = vec![None; highlights.len()];

        let mut attempt = 0;
        loop {
            let Some(range) = renderer.current_location() else {
                if attempt == 0 {
                    warn!(book_id, "No visible range after reflow; keeping references");
                    restore_decorations(renderer, &highlights);
                    return ReflowOutcome::Skipped(SkipReason::NoVisibleRange);
                }
                break;
            };
            let nodes = renderer.text_nodes(&range);
            for (idx, target) in targets.iter().enumerate() {
                let Some(text) = target else { continue };
                if relocated[idx].is_some() {
                    continue;
                }
                if let Some(found) = find_first_occurrence(&nodes, text) {
                    relocated[idx] =
                        renderer.range_in_node(&nodes[found.node_index], found.start, found.end);
                }
            }

            let outstanding = targets
                .iter()
                .zip(&relocated)
                .filter(|(target, cfi)| target.is_some() && cfi.is_none())
                .count();
            if outstanding == 0 || attempt >= self.settings.retry_limit {
                break;
            }
            attempt += 1;
            debug!(book_id, outstanding, attempt, "Retrying highlight lookup");
            sleep(self.settings.settle_delay).await;
            if ticket.token.check_cancelled("retry").is_err() {
                return ReflowOutcome::Superseded;
            }
        }

        if ticket.token.check_cancelled("render").is_err() {
            return ReflowOutcome::Superseded;
        }
        let mut moved = 0;
        let mut missed = 0;
        let updated: Vec<Highlight> = highlights
            .into_iter()
            .zip(relocated)
            .zip(&targets)
            .map(|((mut highlight, new_cfi), target)| {
                match new_cfi {
                    Some(cfi) => {
                        moved += 1;
                        highlight.cfi = cfi;
                    }
                    None if target.is_some() => {
                        missed += 1;
                        debug!(book_id, cfi = %highlight.cfi, "Highlight text not on visible page");
                    }
                    None => {}
                }
                highlight
            })
            .collect();
        restore_decorations(renderer, &updated);

        if ticket.token.check_cancelled("persist").is_err() {
            return ReflowOutcome::Superseded;
        }
        let persisted = match self.repo.replace_highlights(book_id, &updated) {
            Ok(written) => written,
            Err(err) => {
                warn!(book_id, "Failed to persist reflowed highlights: {err:#}");
                false
            }
        };
        info!(
            book_id,
            relocated = moved,
            missed,
            persisted,
            "Reconciled highlights after reflow"
        );
        ReflowOutcome::Completed(ReflowReport {
            highlights: updated,
            relocated: moved,
            missed,
            persisted,
        })
    }

    async fn wait_for_relayout<R: Renderer>(&self, renderer: &R) {
        if renderer.relayout_pending().is_none() {
            sleep(self.settings.settle_delay).await;
            return;
        }
        let deadline = Instant::now() + self.settings.relayout_timeout;
        while renderer.relayout_pending() == Some(true) {
            if Instant::now() >= deadline {
                warn!("Renderer still relaying out after timeout; continuing");
                break;
            }
            sleep(self.settings.relayout_poll).await;
        }
    }
}

/// Text to look for, or `None` when the highlight has nothing to relocate.
fn search_text<R: Renderer>(renderer: &R, highlight: &Highlight) -> Option<String> {
    if highlight.cfi.is_empty() {
        return None;
    }
    renderer
        .resolve_text(&highlight.cfi)
        .filter(|text| !text.trim().is_empty())
        .or_else(|| Some(highlight.text.clone()))
        .filter(|text| !text.trim().is_empty())
}

/// Re-render every highlight that has a reference.
pub fn restore_decorations<R: Renderer>(renderer: &mut R, highlights: &[Highlight]) {
    for highlight in highlights.iter().filter(|h| !h.cfi.is_empty()) {
        if !renderer.add_highlight(&highlight.cfi) {
            warn!(cfi = %highlight.cfi, "Renderer refused highlight decoration");
        }
    }
}
