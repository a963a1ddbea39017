//! Text matching helpers for highlight bookkeeping.
//!
//! Positions are unreliable after a reflow, so highlights are identified by
//! their text. Near-identical text counts as the same highlight.

use crate::annotations::Highlight;
use crate::renderer::TextNode;

/// Similarity a selection must exceed to count as an existing highlight.
pub const DUPLICATE_SIMILARITY: f64 = 0.99;

/// Case-insensitive Levenshtein distance, counted in chars.
///
/// Keeps a single cost row sized to the shorter input.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().flat_map(char::to_lowercase).collect();
    let b: Vec<char> = b.chars().flat_map(char::to_lowercase).collect();
    let (outer, inner) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    if inner.is_empty() {
        return outer.len();
    }

    let mut costs: Vec<usize> = (0..=inner.len()).collect();
    for (i, oc) in outer.iter().enumerate() {
        let mut diagonal = costs[0];
        costs[0] = i + 1;
        for (j, ic) in inner.iter().enumerate() {
            let above = costs[j + 1];
            costs[j + 1] = if oc == ic {
                diagonal
            } else {
                diagonal.min(above).min(costs[j]) + 1
            };
            diagonal = above;
        }
    }
    costs[inner.len()]
}

/// Normalized similarity in `0.0..=1.0`; two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    longest.saturating_sub(edit_distance(a, b)) as f64 / longest as f64
}

/// Whether `selection` matches the text of any stored highlight.
pub fn is_duplicate_highlight<'a, I>(selection: &str, existing: I) -> bool
where
    I: IntoIterator<Item = &'a Highlight>,
{
    let selection = selection.trim();
    existing.into_iter().any(|highlight| {
        let stored = highlight.text.trim();
        !stored.is_empty() && similarity(selection, stored) > DUPLICATE_SIMILARITY
    })
}

/// First occurrence of `needle` within a single text node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMatch {
    pub node_index: usize,
    /// Char offset of the match start inside the node.
    pub start: usize,
    /// Char offset one past the match end.
    pub end: usize,
}

/// Scan nodes in order and report the first one containing `needle`.
///
/// Matches never span node boundaries.
pub fn find_first_occurrence(nodes: &[TextNode], needle: &str) -> Option<NodeMatch> {
    if needle.is_empty() {
        return None;
    }
    nodes.iter().enumerate().find_map(|(node_index, node)| {
        let byte_idx = node.text.find(needle)?;
        let start = node.text[..byte_idx].chars().count();
        Some(NodeMatch {
            node_index,
            start,
            end: start + needle.chars().count(),
        })
    })
}
