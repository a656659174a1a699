mod exports;
mod markdown;
mod progress;
mod styling;
mod summary;
mod tables;

use std::time::Duration;

pub use exports::export_insights;
pub use progress::PhaseProgress;
use styling::{dim, magenta_bold};

/// Prints the ghaperf banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("⏱️ ghaperf"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("GitHub Actions Performance Analyzer")
    );
}

/// Formats a duration rounded to whole seconds, e.g. `1m 35s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs() + u64::from(duration.subsec_millis() >= 500);
    humantime::format_duration(Duration::from_secs(secs)).to_string()
}
