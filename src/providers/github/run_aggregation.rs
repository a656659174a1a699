use log::debug;

use super::job::WorkflowRun;

/// Decides which jobs take part in an analysis and under which name.
pub trait JobNameRules {
    /// Whether a job with this (raw) name should be analyzed.
    fn include(&self, job_name: &str) -> bool;

    /// Canonical name used to aggregate instances of the same logical job,
    /// e.g. the legs of a matrix.
    fn normalize_job_name(&self, job_name: &str) -> String;
}

/// Drops excluded jobs from a run and assigns each remaining job its
/// normalized name. Job order is preserved.
pub fn aggregate_run<R>(mut run: WorkflowRun, rules: &R) -> WorkflowRun
where
    R: JobNameRules + ?Sized,
{
    let before = run.jobs.len();
    run.jobs.retain(|job| rules.include(&job.name));
    for job in &mut run.jobs {
        job.normalized_name = rules.normalize_job_name(&job.name);
    }

    if run.jobs.len() != before {
        debug!(
            "Run {}: excluded {} of {} jobs",
            run.id,
            before - run.jobs.len(),
            before
        );
    }

    run
}
