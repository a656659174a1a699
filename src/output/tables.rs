use std::time::Duration;

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use super::format_duration;
use super::styling::Severity;

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn create_cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

/// Colors a duration relative to the slowness threshold.
pub fn color_coded_duration_cell(duration: Duration, threshold: Duration) -> Cell {
    let color = match Severity::of(duration, threshold) {
        Severity::Fast => TableColor::Green,
        Severity::Slow => TableColor::Yellow,
        Severity::VerySlow => TableColor::Red,
    };
    Cell::new(format_duration(duration)).fg(color)
}
