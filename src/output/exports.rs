use anyhow::Result;
use std::io::Write;

use crate::config::OutputFormat;
use crate::insights::PerfInsights;

use super::markdown::render_markdown;
use super::summary::render_summary;

/// Writes a report in the requested format.
///
/// - Summary: color-coded terminal tables
/// - JSON: programmatic access, optionally pretty-printed
/// - Markdown: HTML tables for job summaries and issue comments
pub fn export_insights(
    insights: &PerfInsights,
    format: OutputFormat,
    pretty: bool,
    output: &mut dyn Write,
) -> Result<()> {
    match format {
        OutputFormat::Summary => write!(output, "{}", render_summary(insights))?,
        OutputFormat::Json => export_json(insights, pretty, output)?,
        OutputFormat::Markdown => write!(output, "{}", render_markdown(insights))?,
    }
    output.flush()?;
    Ok(())
}

fn export_json(insights: &PerfInsights, pretty: bool, output: &mut dyn Write) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(insights)?
    } else {
        serde_json::to_string(insights)?
    };
    writeln!(output, "{json}")?;
    Ok(())
}
