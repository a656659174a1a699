use std::fmt::Write;
use std::time::Duration;

use crate::insights::{
    GroupReport, JobReport, LogGroupsReport, PerfInsights, Report, ReportHeader, RunReport,
    WorkflowReport,
};
use crate::providers::github::{JobMetric, Metric};

use super::format_duration;
use super::styling::{bright, bright_green, bright_red, bright_yellow, conclusion, cyan, dim};
use super::tables::{color_coded_duration_cell, create_cyan_header, create_table};

/// Renders a human-readable terminal report.
///
/// Durations in tables are color coded against the threshold:
/// - Green: below the threshold
/// - Yellow: up to twice the threshold
/// - Red: more than twice the threshold
pub fn render_summary(insights: &PerfInsights) -> String {
    let mut output = String::new();
    let threshold = insights.header.threshold;

    render_overview(&mut output, &insights.header);

    match &insights.report {
        Report::LogGroups(report) => render_log_groups(&mut output, report, threshold),
        Report::Job(report) => render_job(&mut output, report, threshold),
        Report::Run(report) => render_run(&mut output, report, threshold),
        Report::Workflow(report) => render_workflow(&mut output, report, threshold),
    }

    output
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn add_field(output: &mut String, label: &str, value: impl std::fmt::Display) {
    let _ = writeln!(output, "  {} {}", dim(format!("{label}:")), value);
}

fn render_overview(output: &mut String, header: &ReportHeader) {
    add_section_header(output, "📊", "Overview");

    if let Some(repository) = &header.repository {
        add_field(output, "Repository", cyan(repository));
    }
    if let Some(workflow) = &header.workflow {
        add_field(output, "Workflow", cyan(workflow));
    }
    add_field(output, "Threshold", bright_yellow(format_duration(header.threshold)));

    if let Some(filter) = &header.filter {
        for (label, value) in [
            ("Status", &filter.status),
            ("Actor", &filter.actor),
            ("Branch", &filter.branch),
            ("Event", &filter.event),
            ("Created", &filter.created),
        ] {
            if let Some(value) = value {
                add_field(output, label, value);
            }
        }
    }

    if !header.job_names.is_empty() {
        add_field(output, "Job names", header.job_names.join(", "));
    }
    if !header.excluded_job_names.is_empty() {
        add_field(output, "Excluded job names", header.excluded_job_names.join(", "));
    }
    for (pattern, name) in &header.job_name_mappings {
        add_field(output, "Job name mapping", format!("{pattern} => {name}"));
    }

    add_field(
        output,
        "Analysis date",
        dim(header.collected_at.format("%Y-%m-%d %H:%M UTC")),
    );
    output.push('\n');
}

fn render_log_groups(output: &mut String, report: &LogGroupsReport, threshold: Duration) {
    let title = match &report.job_name {
        Some(name) => format!("Slow log groups: {name}"),
        None => "Slow log groups".to_string(),
    };
    add_section_header(output, "🐢", &title);

    if report.groups.is_empty() {
        let _ = writeln!(output, "{}", bright_green("No slow log group is found"));
        return;
    }

    let mut table = create_table();
    table.set_header(create_cyan_header(&["#", "Group", "Duration", "Started"]));
    for (i, group) in report.groups.iter().enumerate() {
        table.add_row(vec![
            (i + 1).into(),
            group.name.as_str().into(),
            color_coded_duration_cell(group.duration, threshold),
            group
                .start_time
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_default()
                .into(),
        ]);
    }
    let _ = writeln!(output, "{table}\n");
}

fn format_groups(groups: &[GroupReport]) -> String {
    groups
        .iter()
        .map(|g| format!("{} ({})", g.name, format_duration(g.duration)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_job(output: &mut String, report: &JobReport, threshold: Duration) {
    add_section_header(output, "🧩", &format!("Job: {}", report.name));

    add_field(output, "ID", report.id);
    if let Some(url) = &report.html_url {
        add_field(output, "URL", cyan(url));
    }
    add_field(output, "Status", &report.status);
    if let Some(value) = &report.conclusion {
        add_field(output, "Conclusion", conclusion(value));
    }
    add_field(output, "Duration", bright_yellow(format_duration(report.duration)));
    add_field(output, "All steps", format_duration(report.timings.all_steps));
    add_field(output, "Setup", format_duration(report.timings.setup));
    add_field(output, "Cleanup", format_duration(report.timings.cleanup));
    add_field(output, "Steps overhead", format_duration(report.timings.steps_overhead));
    if report.logs_unavailable {
        let _ = writeln!(
            output,
            "  {}",
            bright_red("The job log is unavailable, so no log groups are shown")
        );
    }
    output.push('\n');

    if report.slow_steps.is_empty() {
        let _ = writeln!(
            output,
            "{}\n",
            bright_green(format!("The job {} has no slow steps", report.name))
        );
        return;
    }

    let mut table = create_table();
    table.set_header(create_cyan_header(&["#", "Step", "Duration", "Slow Groups"]));
    for (i, step) in report.slow_steps.iter().enumerate() {
        table.add_row(vec![
            (i + 1).into(),
            step.name.as_str().into(),
            color_coded_duration_cell(step.duration, threshold),
            format_groups(&step.groups).into(),
        ]);
    }
    let _ = writeln!(output, "{table}\n");
}

fn render_run(output: &mut String, report: &RunReport, threshold: Duration) {
    let title = match &report.name {
        Some(name) => format!("Run: {name} #{}", report.id),
        None => format!("Run: #{}", report.id),
    };
    add_section_header(output, "🏃", &title);

    if let Some(url) = &report.html_url {
        add_field(output, "URL", cyan(url));
    }
    if let Some(attempt) = report.attempt {
        add_field(output, "Attempt", attempt);
    }
    if let Some(value) = &report.conclusion {
        add_field(output, "Conclusion", conclusion(value));
    }
    add_field(output, "Jobs analyzed", bright_yellow(report.job_count));
    add_field(output, "Slow jobs", bright_yellow(report.slow_jobs.len()));
    if report.logs_unavailable {
        let _ = writeln!(
            output,
            "  {}",
            bright_red("Logs of this run are no longer available")
        );
    }
    output.push('\n');

    if report.slow_jobs.is_empty() {
        let _ = writeln!(output, "{}", bright_green("There is no slow job"));
        return;
    }

    for job in &report.slow_jobs {
        render_job(output, job, threshold);
    }
}

fn format_metric(metric: &Metric) -> String {
    format!(
        "{} ({}/{})",
        format_duration(metric.avg),
        format_duration(metric.sum),
        metric.count
    )
}

fn render_job_metric(output: &mut String, job: &JobMetric, threshold: Duration) {
    add_section_header(output, "🧩", &format!("Job: {}", job.name));

    add_field(output, "Average duration", bright_yellow(format_metric(&job.metric)));
    let slowest = job
        .slowest_jobs
        .iter()
        .map(|j| match &j.html_url {
            Some(url) => format!("{} {}", format_duration(j.duration), dim(url)),
            None => format_duration(j.duration),
        })
        .collect::<Vec<_>>();
    add_field(output, "Slowest jobs", "");
    for line in slowest {
        let _ = writeln!(output, "    {line}");
    }
    output.push('\n');

    if job.steps.is_empty() {
        let _ = writeln!(output, "{}\n", bright_green("The job has no slow steps"));
        return;
    }

    let mut table = create_table();
    table.set_header(create_cyan_header(&["#", "Step", "Average", "Total/Count", "Slow Groups"]));
    for (i, step) in job.steps.iter().enumerate() {
        let groups = step
            .groups
            .iter()
            .filter(|g| g.metric.avg >= threshold)
            .map(|g| format!("{} {}", g.name, format_metric(&g.metric)))
            .collect::<Vec<_>>()
            .join("\n");

        table.add_row(vec![
            (i + 1).into(),
            step.name.as_str().into(),
            color_coded_duration_cell(step.metric.avg, threshold),
            format!("{}/{}", format_duration(step.metric.sum), step.metric.count).into(),
            groups.into(),
        ]);
    }
    let _ = writeln!(output, "{table}\n");
}

fn render_workflow(output: &mut String, report: &WorkflowReport, threshold: Duration) {
    add_section_header(output, "📋", "Workflow Runs");
    add_field(output, "Runs analyzed", bright_yellow(report.run_count));
    if report.runs_without_logs > 0 {
        add_field(
            output,
            "Runs without logs",
            bright_red(report.runs_without_logs),
        );
    }
    add_field(output, "Slow jobs", bright_yellow(report.jobs.len()));
    output.push('\n');

    if report.jobs.is_empty() {
        let _ = writeln!(output, "{}", bright_green("There is no slow job"));
        return;
    }

    for job in &report.jobs {
        render_job_metric(output, job, threshold);
    }
}
