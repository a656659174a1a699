mod cache;
mod client;
mod job;
mod job_analysis;
pub mod log_parser;
mod provider;
mod run_aggregation;
mod run_metrics;
mod step;
mod types;


pub use cache::JobCache;
pub use job::{Job, WorkflowRun};
pub use job_analysis::{slow_groups, JobAnalysis, JobTimings, SlowStep};
pub use log_parser::{Group, ParsedLog};
pub use provider::GitHubProvider;
pub use run_aggregation::JobNameRules;
pub use run_metrics::{GroupMetric, JobMetric, JobRef, Metric, StepMetric};
pub use types::WorkflowRunFilter;

use crate::error::{GhaperfError, Result};

/// Splits `owner/repo` into its two parts.
pub fn split_repository(repository: &str) -> Result<(&str, &str)> {
    match repository.split_once('/') {
        Some((owner, repo))
            if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') =>
        {
            Ok((owner, repo))
        }
        _ => Err(GhaperfError::InvalidRepository(repository.to_string())),
    }
}
