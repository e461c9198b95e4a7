use crate::config::LayoutConfig;
use crate::text_metrics::{estimate_text_width, measure_text_width};

use super::TextBlock;

pub(super) fn measure_label(text: &str, font_size: f32, font_family: &str, config: &LayoutConfig) -> TextBlock {
    let max_width = estimate_text_width(&"n".repeat(config.max_label_width_chars.max(1)), font_size);
    let mut lines = Vec::new();
    for line in text.split('\n') {
        lines.extend(wrap_line(line.trim(), max_width, font_size, font_family));
    }
    if lines.is_empty() {
        lines.push(String::new());
    }

    let width = lines
        .iter()
        .map(|line| measure_text_width(line, font_size, font_family))
        .fold(0.0, f32::max);
    let height = lines.len() as f32 * font_size * config.label_line_height;
    TextBlock { lines, width, height }
}

/// Greedy word wrap. A single word wider than `max_width` keeps its own line.
pub(super) fn wrap_line(line: &str, max_width: f32, font_size: f32, font_family: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if !current.is_empty() && measure_text_width(&candidate, font_size, font_family) > max_width {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
