pub(crate) fn default_storage_dir() -> String {
    ".cache".to_string()
}

pub(crate) fn default_log_level() -> crate::config::LogLevel {
    crate::config::LogLevel::Info
}

pub(crate) fn default_font_size_min() -> f64 {
    0.8
}

pub(crate) fn default_font_size_max() -> f64 {
    1.2
}

pub(crate) fn default_line_height_min() -> f64 {
    1.8
}

pub(crate) fn default_line_height_max() -> f64 {
    2.2
}

pub(crate) fn default_reflow_settle_ms() -> u64 {
    100
}

pub(crate) fn default_reflow_retry_limit() -> usize {
    2
}

pub(crate) fn default_relayout_timeout_ms() -> u64 {
    1000
}

pub(crate) fn default_relayout_poll_ms() -> u64 {
    16
}

pub(crate) fn default_location_chars() -> usize {
    1000
}

pub(crate) fn default_view_mode() -> u8 {
    2
}

pub(crate) fn default_highlight() -> crate::config::HighlightColor {
    crate::config::HighlightColor {
        r: 1.0,
        g: 1.0,
        b: 0.0,
        a: 0.3,
    }
}
