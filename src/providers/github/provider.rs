use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, info, warn};

use crate::auth::Token;
use crate::error::{GhaperfError, Result};
use crate::insights::{JobReport, Report, RunReport, WorkflowReport};
use crate::output::PhaseProgress;

use super::cache::JobCache;
use super::client::GitHubClient;
use super::job::{Job, WorkflowRun};
use super::job_analysis::{analyze_slow_jobs, JobAnalysis};
use super::log_parser::{self, Group};
use super::run_aggregation::{aggregate_run, JobNameRules};
use super::run_metrics::RunMetrics;
use super::types::{GitHubJob, GitHubWorkflowRun, WorkflowRunFilter};

const STATUS_COMPLETED: &str = "completed";

/// Whether GitHub keeps a log for this job. Unfinished and skipped jobs have none.
fn has_log(job: &GitHubJob) -> bool {
    job.status == STATUS_COMPLETED && job.conclusion.as_deref() != Some("skipped")
}

/// Provider for analyzing GitHub Actions jobs, runs and workflows.
pub struct GitHubProvider {
    client: GitHubClient,
    cache: JobCache,
    repository: String,
}

impl GitHubProvider {
    /// Create a new GitHub Actions provider.
    ///
    /// # Arguments
    ///
    /// * `base_url` - GitHub API base URL
    /// * `repository` - Repository in format "owner/repo"
    /// * `token` - Optional GitHub access token
    /// * `cache` - Cache for completed jobs, runs and logs
    pub fn new(
        base_url: &str,
        repository: &str,
        token: Option<Token>,
        cache: JobCache,
    ) -> Result<Self> {
        let (owner, repo) = super::split_repository(repository)?;
        let client = GitHubClient::new(base_url, owner, repo, token)?;

        Ok(Self {
            client,
            cache,
            repository: repository.to_string(),
        })
    }

    #[cfg(test)]
    pub(super) fn with_client(client: GitHubClient, repository: &str) -> Self {
        Self {
            client,
            cache: JobCache::disabled(),
            repository: repository.to_string(),
        }
    }

    async fn fetch_job(&self, job_id: u64) -> Result<GitHubJob> {
        if let Some(job) = self.cache.get_job(job_id) {
            return Ok(job);
        }
        let job = self.client.get_job(job_id).await?;
        self.cache.save_job(&job);
        Ok(job)
    }

    /// Fetches and parses the log of a finished job. Jobs that did not run
    /// have no log and yield no groups.
    async fn fetch_groups(&self, job: &GitHubJob) -> Result<Vec<Group>> {
        if !has_log(job) {
            return Ok(Vec::new());
        }

        let log = match self.cache.get_job_log(job.id) {
            Some(log) => log,
            None => {
                let log = self.client.get_job_log(job.id).await?;
                self.cache.save_job_log(job.id, &log);
                log
            }
        };

        Ok(log_parser::parse(log.as_bytes())?.groups)
    }

    /// Fetches the log archive of a finished run attempt and parses it.
    ///
    /// # Returns
    ///
    /// Log groups keyed by the job name each log file reports, or `None`
    /// when the run has no archive yet.
    async fn fetch_run_logs(
        &self,
        run: &GitHubWorkflowRun,
    ) -> Result<Option<HashMap<String, Vec<Group>>>> {
        let (Some(STATUS_COMPLETED), Some(attempt)) = (run.status.as_deref(), run.run_attempt)
        else {
            return Ok(None);
        };

        let files = match self.cache.get_run_logs(run.id, attempt) {
            Some(files) => files,
            None => {
                let files = self.client.get_run_logs(run.id, attempt).await?;
                self.cache.save_run_logs(run, &files);
                files
            }
        };

        let mut logs = HashMap::new();
        for file in files {
            match log_parser::parse(file.content.as_bytes()) {
                Ok(log) => match log.job_name {
                    Some(job_name) => {
                        logs.entry(job_name).or_insert(log.groups);
                    }
                    None => debug!("Log file {} of run {} names no job", file.name, run.id),
                },
                Err(e) => warn!("Failed to parse log file {} of run {}: {e}", file.name, run.id),
            }
        }

        Ok(Some(logs))
    }

    async fn fetch_run(&self, run_id: u64, attempt: Option<u32>) -> Result<GitHubWorkflowRun> {
        if let Some(run) = attempt.and_then(|attempt| self.cache.get_run(run_id, attempt)) {
            return Ok(run);
        }
        let run = self.client.get_workflow_run(run_id, attempt).await?;
        self.cache.save_run(&run);
        Ok(run)
    }

    async fn fetch_run_jobs(&self, run: &GitHubWorkflowRun) -> Result<Vec<GitHubJob>> {
        let cached_ids = run
            .run_attempt
            .and_then(|attempt| self.cache.get_job_ids(run.id, attempt));

        if let Some(job_ids) = cached_ids {
            let jobs = join_all(job_ids.into_iter().map(|id| self.fetch_job(id))).await;
            return jobs.into_iter().collect();
        }

        let jobs = self.client.list_jobs(run.id, run.run_attempt).await?;
        for job in &jobs {
            self.cache.save_job(job);
        }
        if jobs.iter().all(|job| job.status == STATUS_COMPLETED) {
            let ids: Vec<u64> = jobs.iter().map(|job| job.id).collect();
            self.cache.save_job_ids(run, &ids);
        }
        Ok(jobs)
    }

    /// Loads every job of a run together with its log groups.
    ///
    /// Logs come from the run's archive, matched to jobs by name. Jobs missing
    /// from the archive, or every job when the archive cannot be downloaded,
    /// fall back to their own log. A log that cannot be fetched leaves the
    /// job without groups. Expired logs additionally mark the whole run via
    /// `logs_unavailable`.
    async fn load_run(&self, run: GitHubWorkflowRun) -> Result<WorkflowRun> {
        let api_jobs = self.fetch_run_jobs(&run).await?;

        let mut archived = match self.fetch_run_logs(&run).await {
            Ok(logs) => logs.unwrap_or_default(),
            Err(GhaperfError::LogGone) => {
                warn!("Logs of run {} are no longer available", run.id);
                let jobs = api_jobs
                    .into_iter()
                    .map(|job| {
                        if has_log(&job) {
                            Job::without_log(job)
                        } else {
                            Job::new(job, Vec::new())
                        }
                    })
                    .collect();
                return Ok(WorkflowRun::new(run, jobs, true));
            }
            Err(e) => {
                warn!(
                    "Failed to download the log archive of run {} ({e}), fetching job logs one by one",
                    run.id
                );
                HashMap::new()
            }
        };

        let results = join_all(api_jobs.into_iter().map(|job| {
            let archived_groups = archived.remove(&job.name);
            async move {
                let groups = match archived_groups {
                    Some(groups) => Ok(groups),
                    None => self.fetch_groups(&job).await,
                };
                (job, groups)
            }
        }))
        .await;

        let mut logs_unavailable = false;
        let jobs = results
            .into_iter()
            .map(|(job, groups)| match groups {
                Ok(groups) => Job::new(job, groups),
                Err(GhaperfError::LogGone) => {
                    logs_unavailable = true;
                    Job::without_log(job)
                }
                Err(e) => {
                    warn!("Failed to fetch log of job {} ({}): {e}", job.id, job.name);
                    Job::without_log(job)
                }
            })
            .collect();

        if logs_unavailable {
            warn!("Logs of run {} are no longer available", run.id);
        }

        Ok(WorkflowRun::new(run, jobs, logs_unavailable))
    }

    /// Analyzes a single job: timing breakdown and slow steps with their
    /// slow log groups.
    pub async fn job_report(&self, job_id: u64, threshold: Duration) -> Result<Report> {
        info!("Analyzing job {job_id} of {}", self.repository);

        let api_job = self.fetch_job(job_id).await?;
        let job = match self.fetch_groups(&api_job).await {
            Ok(groups) => Job::new(api_job, groups),
            Err(GhaperfError::LogGone) => {
                warn!("Log of job {job_id} is no longer available");
                Job::without_log(api_job)
            }
            Err(e) => {
                warn!("Failed to fetch log of job {job_id}: {e}");
                Job::without_log(api_job)
            }
        };
        let analysis = JobAnalysis::new(&job, threshold);

        Ok(Report::Job(JobReport::new(&analysis)))
    }

    /// Analyzes one run attempt: its jobs at or above the threshold.
    pub async fn run_report<R>(
        &self,
        run_id: u64,
        attempt: Option<u32>,
        rules: &R,
        threshold: Duration,
    ) -> Result<Report>
    where
        R: JobNameRules + ?Sized,
    {
        info!("Analyzing run {run_id} of {}", self.repository);

        let run = self.fetch_run(run_id, attempt).await?;
        let run = aggregate_run(self.load_run(run).await?, rules);
        let slow_jobs = analyze_slow_jobs(&run.jobs, threshold);

        Ok(Report::Run(RunReport::new(&run, &slow_jobs)))
    }

    /// Aggregates the most recent runs of a workflow into ranked job, step
    /// and group statistics.
    pub async fn workflow_report<R>(
        &self,
        workflow: &str,
        count: usize,
        filter: &WorkflowRunFilter,
        rules: &R,
        threshold: Duration,
    ) -> Result<Report>
    where
        R: JobNameRules + ?Sized,
    {
        info!(
            "Analyzing up to {count} runs of workflow {workflow} in {}",
            self.repository
        );

        let progress = PhaseProgress::start_phase_1();
        let api_runs = self
            .client
            .list_workflow_runs(workflow, count, filter)
            .await?;
        for run in &api_runs {
            self.cache.save_run(run);
        }

        let progress = progress.finish_phase_1_start_phase_2(api_runs.len());
        let loaded = join_all(api_runs.into_iter().map(|run| {
            let progress = &progress;
            async move {
                let run_id = run.id;
                let result = self.load_run(run).await;
                progress.inc();
                result.inspect_err(|e| warn!("Skipping run {run_id}: {e}"))
            }
        }))
        .await;

        let progress = progress.finish_phase_2_start_phase_3();
        let mut metrics = RunMetrics::new();
        let mut runs_without_logs = 0;
        for run in loaded.into_iter().flatten() {
            let run = aggregate_run(run, rules);
            if run.logs_unavailable {
                runs_without_logs += 1;
            }
            metrics.add_run(&run);
        }

        let run_count = metrics.run_count();
        let jobs = metrics.rank(threshold);
        progress.finish_phase_3();

        info!("Aggregated {run_count} runs into {} slow jobs", jobs.len());

        Ok(Report::Workflow(WorkflowReport {
            run_count,
            runs_without_logs,
            jobs,
        }))
    }
}
