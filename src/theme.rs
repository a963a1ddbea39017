//! Reader theme parameters derived from the settings sliders.

use crate::config::{AppConfig, HighlightColor};
use crate::renderer::{Renderer, ThemeRule};

/// Name of the renderer theme carrying highlight styling.
pub const HIGHLIGHT_THEME: &str = "highlight";

/// Linear map of a `0..=100` slider position onto `min..=max`.
pub fn map_slider_to_value(value: f64, min: f64, max: f64) -> f64 {
    min + ((max - min) * value.clamp(0.0, 100.0)) / 100.0
}

/// Font size in rem for a slider position.
pub fn font_size_for_slider(config: &AppConfig, value: f64) -> f64 {
    map_slider_to_value(value, config.font_size_min, config.font_size_max)
}

/// Line height in rem for a slider position.
pub fn line_height_for_slider(config: &AppConfig, value: f64) -> f64 {
    map_slider_to_value(value, config.line_height_min, config.line_height_max)
}

pub fn rem(value: f64) -> String {
    format!("{value}rem")
}

fn highlight_rules(color: HighlightColor) -> Vec<ThemeRule> {
    let background = color.to_css();
    ["::selection", ".annotator-hl"]
        .into_iter()
        .map(|selector| ThemeRule {
            selector: selector.to_string(),
            declarations: vec![("background".to_string(), background.clone())],
        })
        .collect()
}

/// Register and select the theme that colors selections and highlights.
pub fn setup_highlight_theme<R: Renderer>(renderer: &mut R, color: HighlightColor) {
    renderer.register_theme(HIGHLIGHT_THEME, highlight_rules(color));
    renderer.select_theme(HIGHLIGHT_THEME);
}
