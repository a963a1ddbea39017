//! Client-side annotation layer for an e-book reader.
//!
//! Persists highlights, notes, and bookmarks per book over a key-value store,
//! maps settings sliders to theme values, and keeps highlight references
//! valid when the renderer reflows after a style change.

pub mod annotations;
pub mod bookmarks;
pub mod cancellation;
pub mod config;
pub mod reader;
pub mod reflow;
pub mod renderer;
pub mod storage;
pub mod text_utils;
pub mod theme;

pub use annotations::{AnnotationRepository, BookAnnotations, Highlight, Note};
pub use bookmarks::{AddOutcome, Bookmark, BookmarkRepository};
pub use reader::{ReaderSession, SelectionOutcome};
pub use reflow::{Reconciler, ReflowCoordinator, ReflowOutcome, ReflowSettings};
pub use renderer::{Cfi, Renderer};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
