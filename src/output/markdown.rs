use std::fmt::Write;
use std::time::Duration;

use crate::insights::{
    JobReport, LogGroupsReport, PerfInsights, Report, ReportHeader, RunReport, WorkflowReport,
};
use crate::providers::github::Metric;

use super::format_duration;

/// Renders a report as Markdown with HTML tables, suitable for a job summary
/// or an issue comment.
pub fn render_markdown(insights: &PerfInsights) -> String {
    let mut output = String::new();
    let threshold = insights.header.threshold;

    render_header(&mut output, &insights.header);

    match &insights.report {
        Report::LogGroups(report) => render_log_groups(&mut output, report),
        Report::Job(report) => render_job(&mut output, report),
        Report::Run(report) => render_run(&mut output, report),
        Report::Workflow(report) => render_workflow(&mut output, report, threshold),
    }

    output
}

fn row(output: &mut String, label: &str, value: impl std::fmt::Display) {
    let _ = writeln!(output, "<tr><td>{label}</td><td>{value}</td></tr>");
}

fn list_row(output: &mut String, label: &str, items: &[String]) {
    match items {
        [] => {}
        [item] => row(output, label, item),
        items => {
            let list: String = items.iter().map(|item| format!("<li>{item}</li>")).collect();
            row(output, label, format!("<ul>{list}</ul>"));
        }
    }
}

fn link(url: Option<&str>, text: impl std::fmt::Display) -> String {
    match url {
        Some(url) => format!(r#"<a href="{url}">{text}</a>"#),
        None => text.to_string(),
    }
}

fn render_header(output: &mut String, header: &ReportHeader) {
    output.push_str("<table>\n");
    row(output, "ghaperf version", &header.version);
    row(output, "Created At", header.collected_at.to_rfc3339());
    row(output, "Threshold", format_duration(header.threshold));
    if let Some(repository) = &header.repository {
        row(
            output,
            "Repository",
            link(Some(format!("https://github.com/{repository}").as_str()), repository),
        );
    }
    list_row(output, "Job Names", &header.job_names);
    list_row(output, "Excluded Job Names", &header.excluded_job_names);
    let mappings: Vec<String> = header
        .job_name_mappings
        .iter()
        .map(|(pattern, name)| format!("{pattern} =&gt; {name}"))
        .collect();
    list_row(output, "Job Name Mappings", &mappings);
    if let Some(workflow) = &header.workflow {
        row(output, "Workflow", workflow);
    }
    if let Some(filter) = &header.filter {
        for (label, value) in [
            ("Workflow Status", &filter.status),
            ("Workflow Actor", &filter.actor),
            ("Workflow Branch", &filter.branch),
            ("Workflow Event", &filter.event),
            ("Workflow Created", &filter.created),
        ] {
            if let Some(value) = value {
                row(output, label, value);
            }
        }
    }
    output.push_str("</table>\n\n");
}

fn render_log_groups(output: &mut String, report: &LogGroupsReport) {
    if report.groups.is_empty() {
        output.push_str("No slow log group is found\n");
        return;
    }

    output.push_str("## Slow log groups\n");
    for (i, group) in report.groups.iter().enumerate() {
        let _ = writeln!(
            output,
            "{}. {}: {}",
            i + 1,
            format_duration(group.duration),
            group.name
        );
    }
}

fn render_job(output: &mut String, report: &JobReport) {
    let _ = writeln!(output, "## Job: {}\n", report.name);
    output.push_str("<table>\n");
    row(output, "Job ID", link(report.html_url.as_deref(), report.id));
    row(output, "Job Status", &report.status);
    if let Some(conclusion) = &report.conclusion {
        row(output, "Job Conclusion", conclusion);
    }
    row(output, "Job Duration", format_duration(report.duration));
    row(output, "All Steps Duration", format_duration(report.timings.all_steps));
    row(output, "Setup Job Duration", format_duration(report.timings.setup));
    row(output, "Cleanup Job Duration", format_duration(report.timings.cleanup));
    row(output, "Steps Overhead", format_duration(report.timings.steps_overhead));
    output.push_str("</table>\n\n");

    if report.logs_unavailable {
        output.push_str(
            "> [!WARNING]\n> The job log is unavailable, so no log groups are shown\n\n",
        );
    }

    if report.slow_steps.is_empty() {
        let _ = writeln!(output, "The job {} has no slow steps\n", report.name);
        return;
    }

    output.push_str("### Slow steps\n");
    for (i, step) in report.slow_steps.iter().enumerate() {
        let _ = writeln!(
            output,
            "{}. {}: {}",
            i + 1,
            format_duration(step.duration),
            step.name
        );
        for (j, group) in step.groups.iter().enumerate() {
            let _ = writeln!(
                output,
                "    {}. {}: {}",
                j + 1,
                format_duration(group.duration),
                group.name
            );
        }
    }
    output.push('\n');
}

fn render_run(output: &mut String, report: &RunReport) {
    let name = report.name.as_deref().unwrap_or("Workflow run");
    let _ = writeln!(
        output,
        "# {}\n",
        link(report.html_url.as_deref(), format!("{name} #{}", report.id))
    );

    if report.logs_unavailable {
        output.push_str("> [!WARNING]\n> Logs of this run are no longer available\n\n");
    }

    if report.slow_jobs.is_empty() {
        output.push_str("There is no slow job\n");
        return;
    }

    for job in &report.slow_jobs {
        render_job(output, job);
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

fn render_workflow(output: &mut String, report: &WorkflowReport, threshold: Duration) {
    let _ = writeln!(output, "Workflow runs analyzed: {}\n", report.run_count);
    if report.runs_without_logs > 0 {
        let _ = writeln!(
            output,
            "> [!WARNING]\n> Logs of {} runs are no longer available\n",
            report.runs_without_logs
        );
    }

    if report.jobs.is_empty() {
        output.push_str("There is no slow job\n");
        return;
    }

    for job in &report.jobs {
        let _ = writeln!(output, "## Job: {}", job.name);
        let slowest: Vec<String> = job
            .slowest_jobs
            .iter()
            .map(|j| link(j.html_url.as_deref(), format_duration(j.duration)))
            .collect();

        output.push_str("<table>\n");
        row(output, "Average Job Duration", format_metric(&job.metric));
        row(output, "Slowest Jobs", slowest.join(", "));
        output.push_str("</table>\n\n");

        if job.steps.is_empty() {
            output.push_str("The job has no slow steps\n\n");
            continue;
        }

        output.push_str("### Slow steps\n");
        for (i, step) in job.steps.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. {}: {}",
                i + 1,
                format_metric(&step.metric),
                step.name
            );
            for (j, group) in step
                .groups
                .iter()
                .filter(|g| g.metric.avg >= threshold)
                .enumerate()
            {
                let _ = writeln!(
                    output,
                    "    {}. {}: {}",
                    j + 1,
                    format_metric(&group.metric),
                    group.name
                );
            }
        }
        output.push('\n');
    }
}
