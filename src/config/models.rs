use serde::Deserialize;
use std::time::Duration;

/// Annotation layer configuration; deserializable from TOML.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct AppConfig {
    #[serde(default = "crate::config::defaults::default_storage_dir")]
    pub storage_dir: String,
    #[serde(default = "crate::config::defaults::default_log_level")]
    pub log_level: LogLevel,
    #[serde(default = "crate::config::defaults::default_font_size_min")]
    pub font_size_min: f64,
    #[serde(default = "crate::config::defaults::default_font_size_max")]
    pub font_size_max: f64,
    #[serde(default = "crate::config::defaults::default_line_height_min")]
    pub line_height_min: f64,
    #[serde(default = "crate::config::defaults::default_line_height_max")]
    pub line_height_max: f64,
    #[serde(default = "crate::config::defaults::default_reflow_settle_ms")]
    pub reflow_settle_ms: u64,
    #[serde(default = "crate::config::defaults::default_reflow_retry_limit")]
    pub reflow_retry_limit: usize,
    #[serde(default = "crate::config::defaults::default_relayout_timeout_ms")]
    pub relayout_timeout_ms: u64,
    #[serde(default = "crate::config::defaults::default_relayout_poll_ms")]
    pub relayout_poll_ms: u64,
    #[serde(default = "crate::config::defaults::default_location_chars")]
    pub location_chars: usize,
    #[serde(default = "crate::config::defaults::default_view_mode")]
    pub default_view_mode: u8,
    #[serde(default = "crate::config::defaults::default_highlight")]
    pub highlight: HighlightColor,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            storage_dir: crate::config::defaults::default_storage_dir(),
            log_level: crate::config::defaults::default_log_level(),
            font_size_min: crate::config::defaults::default_font_size_min(),
            font_size_max: crate::config::defaults::default_font_size_max(),
            line_height_min: crate::config::defaults::default_line_height_min(),
            line_height_max: crate::config::defaults::default_line_height_max(),
            reflow_settle_ms: crate::config::defaults::default_reflow_settle_ms(),
            reflow_retry_limit: crate::config::defaults::default_reflow_retry_limit(),
            relayout_timeout_ms: crate::config::defaults::default_relayout_timeout_ms(),
            relayout_poll_ms: crate::config::defaults::default_relayout_poll_ms(),
            location_chars: crate::config::defaults::default_location_chars(),
            default_view_mode: crate::config::defaults::default_view_mode(),
            highlight: crate::config::defaults::default_highlight(),
        }
    }
}

impl AppConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.reflow_settle_ms)
    }

    pub fn relayout_timeout(&self) -> Duration {
        Duration::from_millis(self.relayout_timeout_ms)
    }

    pub fn relayout_poll(&self) -> Duration {
        Duration::from_millis(self.relayout_poll_ms.max(1))
    }
}

/// RGBA color with channels in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize, PartialEq)]
pub struct HighlightColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl HighlightColor {
    /// CSS `rgba(..)` form understood by the renderer's theme rules.
    pub fn to_css(self) -> String {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!(
            "rgba({}, {}, {}, {})",
            channel(self.r),
            channel(self.g),
            channel(self.b),
            self.a.clamp(0.0, 1.0)
        )
    }
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
