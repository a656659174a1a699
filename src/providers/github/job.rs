use std::time::Duration;

use chrono::{DateTime, Utc};

use super::log_parser::Group;
use super::step::Step;
use super::types::{GitHubJob, GitHubWorkflowRun};

const STATUS_COMPLETED: &str = "completed";
const CONCLUSION_SKIPPED: &str = "skipped";

/// A single job execution together with its steps and parsed log groups.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: u64,
    /// Name as reported by GitHub, including any matrix suffix.
    pub name: String,
    /// Name used as the aggregation key. Equal to `name` until job name
    /// mappings are applied.
    pub normalized_name: String,
    pub status: String,
    pub conclusion: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub html_url: Option<String>,
    pub steps: Vec<Step>,
    /// Log groups in log order; empty when the log was not available.
    pub groups: Vec<Group>,
    /// The job ran but its log could not be fetched.
    pub logs_unavailable: bool,
    duration: Duration,
}

impl Job {
    pub fn new(job: GitHubJob, groups: Vec<Group>) -> Self {
        let skipped = job.conclusion.as_deref() == Some(CONCLUSION_SKIPPED);
        let duration = match (job.started_at, job.completed_at) {
            (Some(start), Some(end)) if !skipped => (end - start).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        };

        let steps = job
            .steps
            .into_iter()
            .map(|step| Step::new(step.name, step.started_at, step.completed_at))
            .collect();

        Self {
            id: job.id,
            normalized_name: job.name.clone(),
            name: job.name,
            status: job.status,
            conclusion: job.conclusion,
            started_at: job.started_at,
            completed_at: job.completed_at,
            html_url: job.html_url,
            steps,
            groups,
            logs_unavailable: false,
            duration,
        }
    }

    /// A job whose log could not be fetched. Step timings are still usable.
    pub fn without_log(job: GitHubJob) -> Self {
        Self {
            logs_unavailable: true,
            ..Self::new(job, Vec::new())
        }
    }

    /// Wall-clock duration of the job. Zero for skipped jobs and for jobs
    /// with missing or inverted timestamps.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_completed(&self) -> bool {
        self.status == STATUS_COMPLETED
    }
}

/// One attempt of a workflow run and the jobs it executed.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub id: u64,
    pub name: Option<String>,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub html_url: Option<String>,
    pub attempt: Option<u32>,
    pub jobs: Vec<Job>,
    /// Set when GitHub reported the run's logs as expired or deleted.
    pub logs_unavailable: bool,
}

impl WorkflowRun {
    pub fn new(run: GitHubWorkflowRun, jobs: Vec<Job>, logs_unavailable: bool) -> Self {
        Self {
            id: run.id,
            name: run.name,
            status: run.status,
            conclusion: run.conclusion,
            html_url: run.html_url,
            attempt: run.run_attempt,
            jobs,
            logs_unavailable,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::providers::github::types::GitHubStep;
    use chrono::{TimeDelta, TimeZone};

    pub fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    pub fn api_step(name: &str, start: i64, end: i64) -> GitHubStep {
        GitHubStep {
            name: name.to_string(),
            status: Some(STATUS_COMPLETED.to_string()),
            conclusion: Some("success".to_string()),
            number: 0,
            started_at: Some(at(start)),
            completed_at: Some(at(end)),
        }
    }

    pub fn api_job(id: u64, name: &str, start: i64, end: i64, steps: Vec<GitHubStep>) -> GitHubJob {
        GitHubJob {
            id,
            run_id: Some(1),
            name: name.to_string(),
            status: STATUS_COMPLETED.to_string(),
            conclusion: Some("success".to_string()),
            started_at: Some(at(start)),
            completed_at: Some(at(end)),
            html_url: Some(format!("https://github.com/o/r/actions/runs/1/job/{id}")),
            steps,
        }
    }

    pub fn job(id: u64, name: &str, secs: i64) -> Job {
        Job::new(api_job(id, name, 0, secs, vec![]), vec![])
    }

    pub fn group(name: &str, start: i64, end: i64) -> Group {
        Group {
            name: name.to_string(),
            start_time: Some(at(start)),
            end_time: Some(at(end)),
            lines: vec![],
        }
    }

    pub fn run(id: u64, jobs: Vec<Job>) -> WorkflowRun {
        WorkflowRun {
            id,
            name: Some("CI".to_string()),
            status: Some(STATUS_COMPLETED.to_string()),
            conclusion: Some("success".to_string()),
            html_url: None,
            attempt: Some(1),
            jobs,
            logs_unavailable: false,
        }
    }
}
