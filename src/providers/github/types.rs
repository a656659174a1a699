use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// GitHub Actions workflow run as returned by the REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubWorkflowRun {
    /// Unique identifier for the workflow run
    pub id: u64,
    /// Name of the workflow
    #[serde(default)]
    pub name: Option<String>,
    /// Status of the run (queued, in_progress, completed)
    #[serde(default)]
    pub status: Option<String>,
    /// Conclusion of the run (success, failure, cancelled, ...)
    #[serde(default)]
    pub conclusion: Option<String>,
    /// Web URL of the run
    #[serde(default)]
    pub html_url: Option<String>,
    /// Attempt number, starting at 1
    #[serde(default)]
    pub run_attempt: Option<u32>,
    /// Head branch or tag name
    #[serde(default)]
    pub head_branch: Option<String>,
    /// Event that triggered the run
    #[serde(default)]
    pub event: Option<String>,
    /// When the run was created
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Job within a GitHub Actions workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubJob {
    /// Unique identifier for the job
    pub id: u64,
    /// Run this job belongs to
    #[serde(default)]
    pub run_id: Option<u64>,
    /// Name of the job, including the matrix suffix
    pub name: String,
    /// Status of the job
    pub status: String,
    /// Conclusion of the job
    #[serde(default)]
    pub conclusion: Option<String>,
    /// When the job started
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job completed
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Web URL of the job
    #[serde(default)]
    pub html_url: Option<String>,
    /// Steps in this job
    #[serde(default)]
    pub steps: Vec<GitHubStep>,
}

/// Step within a GitHub Actions job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubStep {
    /// Name of the step
    pub name: String,
    /// Status of the step
    #[serde(default)]
    pub status: Option<String>,
    /// Conclusion of the step
    #[serde(default)]
    pub conclusion: Option<String>,
    /// Step number
    #[serde(default)]
    pub number: u32,
    /// When the step started
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the step completed
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// One top-level file of a run attempt's log archive: the full log of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLogFile {
    /// Archive entry name, e.g. `0_build.txt`
    pub name: String,
    pub content: String,
}

/// Filters applied when listing the runs of a workflow.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowRunFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Date range in GitHub search syntax, e.g. `>=2025-01-01`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl WorkflowRunFilter {
    pub(super) fn query_pairs(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("actor", self.actor.as_deref()),
            ("branch", self.branch.as_deref()),
            ("event", self.event.as_deref()),
            ("created", self.created.as_deref()),
            ("status", self.status.as_deref()),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
    }
}

/// Response from GitHub API for workflow runs.
#[derive(Debug, Deserialize)]
pub(super) struct WorkflowRunsResponse {
    pub workflow_runs: Vec<GitHubWorkflowRun>,
}

/// Response from GitHub API for workflow jobs.
#[derive(Debug, Deserialize)]
pub(super) struct WorkflowJobsResponse {
    pub jobs: Vec<GitHubJob>,
}
