use std::fmt::Display;
use std::time::Duration;

use console::{style, StyledObject};

/// How far a duration is past the slowness threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fast,
    Slow,
    VerySlow,
}

impl Severity {
    /// Below the threshold is fast, up to twice the threshold is slow.
    pub fn of(duration: Duration, threshold: Duration) -> Self {
        if duration < threshold {
            Severity::Fast
        } else if duration <= threshold * 2 {
            Severity::Slow
        } else {
            Severity::VerySlow
        }
    }
}

pub fn bright_yellow(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).bright().yellow()
}

pub fn bright_green(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).bright().green()
}

pub fn bright_red(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).bright().red()
}

pub fn cyan(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).cyan()
}

pub fn dim(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).dim()
}

pub fn bright(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).bright()
}

pub fn magenta_bold(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).magenta().bold()
}

/// Job or run conclusion: green on success, yellow when skipped or
/// cancelled, red otherwise.
pub fn conclusion(value: &str) -> StyledObject<String> {
    match value {
        "success" => bright_green(value),
        "skipped" | "cancelled" | "neutral" => bright_yellow(value),
        _ => bright_red(value),
    }
}
