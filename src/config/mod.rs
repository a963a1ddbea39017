//! Configuration loading for the annotation layer.
//!
//! Settings are loaded from `conf/config.toml` if present. Missing or invalid
//! entries fall back to defaults so a reading session can always start.

mod defaults;
mod io;
mod models;

pub use io::{load_config, parse_config, serialize_config};
pub use models::{AppConfig, HighlightColor, LogLevel};
