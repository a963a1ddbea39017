//! The rendering library seam.
//!
//! Pagination, layout, and drawing belong to the e-book renderer. This module
//! names only the calls the annotation layer makes into it; the locatable
//! references it hands out are opaque [`Cfi`] tokens.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

/// Opaque locatable reference produced and resolved by the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct Cfi(String);

impl Cfi {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Cfi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Cfi {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Start and end references of what is currently on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleRange {
    pub start: Cfi,
    pub end: Cfi,
}

/// A text node inside the rendered page, in document order.
///
/// `handle` is meaningful only to the renderer that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextNode {
    pub handle: usize,
    pub text: String,
}

/// One CSS rule of a named renderer theme.
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeRule {
    pub selector: String,
    pub declarations: Vec<(String, String)>,
}

pub trait Renderer {
    /// Identifier of the loaded book, used to scope persisted annotations.
    fn book_key(&self) -> Option<String>;

    fn current_location(&self) -> Option<VisibleRange>;

    /// Plain text currently covered by `cfi`.
    fn resolve_text(&self, cfi: &Cfi) -> Option<String>;

    /// Text nodes of the page covering `range`, in document order.
    fn text_nodes(&self, range: &VisibleRange) -> Vec<TextNode>;

    /// Reference bounded to `[start, end)` char offsets inside `node`.
    fn range_in_node(&self, node: &TextNode, start: usize, end: usize) -> Option<Cfi>;

    fn add_highlight(&mut self, cfi: &Cfi) -> bool;

    fn remove_highlight(&mut self, cfi: &Cfi) -> bool;

    /// Drop every rendered highlight decoration.
    fn clear_highlights(&mut self);

    fn register_theme(&mut self, name: &str, rules: Vec<ThemeRule>);

    fn select_theme(&mut self, name: &str);

    fn set_font_size(&mut self, value: &str);

    fn override_style(&mut self, property: &str, value: &str);

    fn percentage_from_cfi(&self, cfi: &Cfi) -> Option<f64>;

    fn cfi_from_percentage(&self, percentage: f64) -> Option<Cfi>;

    fn has_locations(&self) -> bool;

    fn generate_locations(&mut self, chars_per_location: usize) -> Result<()>;

    fn display(&mut self, cfi: &Cfi) -> Result<()>;

    /// `Some(true)` while a relayout is in progress, `None` when the renderer
    /// cannot report it.
    fn relayout_pending(&self) -> Option<bool> {
        None
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashMap;

    /// In-memory renderer whose visible page is a list of text nodes.
    #[derive(Debug, Default)]
    pub(crate) struct MockRenderer {
        pub book_key: Option<String>,
        pub location: Option<VisibleRange>,
        pub nodes: Vec<TextNode>,
        pub resolvable: HashMap<Cfi, String>,
        pub decorations: Vec<Cfi>,
        pub clear_calls: usize,
        pub themes: HashMap<String, Vec<ThemeRule>>,
        pub selected_theme: Option<String>,
        pub font_size: Option<String>,
        pub style_overrides: Vec<(String, String)>,
        pub locations_ready: bool,
        pub generated_with: Option<usize>,
        pub displayed: Vec<Cfi>,
        pub total_len: f64,
        /// Remaining `relayout_pending` polls that report `true`.
        pub pending_polls: Option<Cell<usize>>,
        /// Page scans left before `late_nodes` replace `nodes`.
        pub reveal_after: Option<Cell<usize>>,
        pub late_nodes: Vec<TextNode>,
    }

    impl MockRenderer {
        pub(crate) fn with_page(book: &str, texts: &[&str]) -> Self {
            Self {
                book_key: Some(book.to_string()),
                location: Some(VisibleRange {
                    start: Cfi::new("page-start"),
                    end: Cfi::new("page-end"),
                }),
                nodes: texts
                    .iter()
                    .enumerate()
                    .map(|(handle, text)| TextNode {
                        handle,
                        text: text.to_string(),
                    })
                    .collect(),
                total_len: 100.0,
                ..Self::default()
            }
        }
    }

    impl Renderer for MockRenderer {
        fn book_key(&self) -> Option<String> {
            self.book_key.clone()
        }

        fn current_location(&self) -> Option<VisibleRange> {
            self.location.clone()
        }

        fn resolve_text(&self, cfi: &Cfi) -> Option<String> {
            self.resolvable.get(cfi).cloned()
        }

        fn text_nodes(&self, _range: &VisibleRange) -> Vec<TextNode> {
            match &self.reveal_after {
                Some(scans) if scans.get() == 0 => self.late_nodes.clone(),
                Some(scans) => {
                    scans.set(scans.get() - 1);
                    self.nodes.clone()
                }
                None => self.nodes.clone(),
            }
        }

        fn range_in_node(&self, node: &TextNode, start: usize, end: usize) -> Option<Cfi> {
            Some(Cfi::new(format!("node{}:{start}-{end}", node.handle)))
        }

        fn add_highlight(&mut self, cfi: &Cfi) -> bool {
            self.decorations.push(cfi.clone());
            true
        }

        fn remove_highlight(&mut self, cfi: &Cfi) -> bool {
            let before = self.decorations.len();
            self.decorations.retain(|existing| existing != cfi);
            before != self.decorations.len()
        }

        fn clear_highlights(&mut self) {
            self.clear_calls += 1;
            self.decorations.clear();
        }

        fn register_theme(&mut self, name: &str, rules: Vec<ThemeRule>) {
            self.themes.insert(name.to_string(), rules);
        }

        fn select_theme(&mut self, name: &str) {
            self.selected_theme = Some(name.to_string());
        }

        fn set_font_size(&mut self, value: &str) {
            self.font_size = Some(value.to_string());
        }

        fn override_style(&mut self, property: &str, value: &str) {
            self.style_overrides
                .push((property.to_string(), value.to_string()));
        }

        fn percentage_from_cfi(&self, cfi: &Cfi) -> Option<f64> {
            cfi.as_str()
                .strip_prefix("pos:")
                .and_then(|pos| pos.parse::<f64>().ok())
                .map(|pos| pos / self.total_len)
        }

        fn cfi_from_percentage(&self, percentage: f64) -> Option<Cfi> {
            Some(Cfi::new(format!("pos:{}", percentage * self.total_len)))
        }

        fn has_locations(&self) -> bool {
            self.locations_ready
        }

        fn generate_locations(&mut self, chars_per_location: usize) -> Result<()> {
            self.generated_with = Some(chars_per_location);
            self.locations_ready = true;
            Ok(())
        }

        fn display(&mut self, cfi: &Cfi) -> Result<()> {
            self.displayed.push(cfi.clone());
            Ok(())
        }

        fn relayout_pending(&self) -> Option<bool> {
            let remaining = self.pending_polls.as_ref()?;
            let left = remaining.get();
            if left == 0 {
                return Some(false);
            }
            remaining.set(left - 1);
            Some(true)
        }
    }
}
