use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::providers::github::{
    slow_groups, Group, Job, JobAnalysis, JobMetric, JobTimings, ParsedLog, SlowStep,
    WorkflowRun, WorkflowRunFilter,
};

/// Serializes a duration as fractional seconds.
pub fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Full output of one analysis: what was asked for and what was found.
#[derive(Debug, Serialize)]
pub struct PerfInsights {
    pub header: ReportHeader,
    pub report: Report,
}

/// Parameters an analysis ran with.
#[derive(Debug, Serialize)]
pub struct ReportHeader {
    pub version: String,
    pub collected_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_secs")]
    pub threshold: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<WorkflowRunFilter>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub job_names: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excluded_job_names: Vec<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub job_name_mappings: IndexMap<String, String>,
}

impl ReportHeader {
    pub fn new(threshold: Duration) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            collected_at: Utc::now(),
            threshold,
            repository: None,
            workflow: None,
            filter: None,
            job_names: Vec::new(),
            excluded_job_names: Vec::new(),
            job_name_mappings: IndexMap::new(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Report {
    LogGroups(LogGroupsReport),
    Job(JobReport),
    Run(RunReport),
    Workflow(WorkflowReport),
}

/// Slow groups of a local log file.
#[derive(Debug, Serialize)]
pub struct LogGroupsReport {
    pub job_name: Option<String>,
    pub groups: Vec<GroupReport>,
}

impl LogGroupsReport {
    /// Groups of `log` lasting at least `threshold`, longest first.
    pub fn new(log: &ParsedLog, threshold: Duration) -> Self {
        Self {
            job_name: log.job_name.clone(),
            groups: slow_groups(&log.groups, threshold)
                .into_iter()
                .map(GroupReport::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub name: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
}

impl From<&Group> for GroupReport {
    fn from(group: &Group) -> Self {
        Self {
            name: group.name.clone(),
            start_time: group.start_time,
            end_time: group.end_time,
            duration: group.duration(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub name: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
    pub groups: Vec<GroupReport>,
}

impl From<&SlowStep<'_>> for StepReport {
    fn from(slow: &SlowStep<'_>) -> Self {
        Self {
            name: slow.step.name.clone(),
            started_at: slow.step.started_at,
            completed_at: slow.step.completed_at,
            duration: slow.step.duration(),
            groups: slow.groups.iter().map(|g| GroupReport::from(*g)).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub id: u64,
    pub name: String,
    pub normalized_name: String,
    pub status: String,
    pub conclusion: Option<String>,
    pub html_url: Option<String>,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
    pub timings: JobTimings,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub logs_unavailable: bool,
    pub slow_steps: Vec<StepReport>,
}

impl JobReport {
    pub fn new(analysis: &JobAnalysis<'_>) -> Self {
        let job: &Job = analysis.job;
        Self {
            id: job.id,
            name: job.name.clone(),
            normalized_name: job.normalized_name.clone(),
            status: job.status.clone(),
            conclusion: job.conclusion.clone(),
            html_url: job.html_url.clone(),
            duration: job.duration(),
            timings: analysis.timings,
            logs_unavailable: job.logs_unavailable,
            slow_steps: analysis.slow_steps.iter().map(StepReport::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub id: u64,
    pub name: Option<String>,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub html_url: Option<String>,
    pub attempt: Option<u32>,
    pub job_count: usize,
    pub logs_unavailable: bool,
    /// Jobs at or above the threshold, longest first.
    pub slow_jobs: Vec<JobReport>,
}

impl RunReport {
    pub fn new(run: &WorkflowRun, slow_jobs: &[JobAnalysis<'_>]) -> Self {
        Self {
            id: run.id,
            name: run.name.clone(),
            status: run.status.clone(),
            conclusion: run.conclusion.clone(),
            html_url: run.html_url.clone(),
            attempt: run.attempt,
            job_count: run.jobs.len(),
            logs_unavailable: run.logs_unavailable,
            slow_jobs: slow_jobs
                .iter()
                .map(JobReport::new)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WorkflowReport {
    /// Runs that were fetched and aggregated.
    pub run_count: usize,
    /// Runs whose logs had expired; their jobs carry no group data.
    pub runs_without_logs: usize,
    pub jobs: Vec<JobMetric>,
}
