use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use log::debug;
use serde::Serialize;

use super::job::{Job, WorkflowRun};
use super::log_parser::Group;
use super::step::Step;
use crate::insights::serialize_secs;

/// Number of slowest job instances kept per normalized job name.
pub const SLOWEST_JOBS_CAPACITY: usize = 3;

/// Running sum, count and average of a set of durations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metric {
    #[serde(serialize_with = "serialize_secs")]
    pub sum: Duration,
    pub count: u32,
    #[serde(serialize_with = "serialize_secs")]
    pub avg: Duration,
}

impl Metric {
    pub fn add(&mut self, duration: Duration) {
        self.sum += duration;
        self.count += 1;
        self.avg = self.sum / self.count;
    }
}

/// Bounded set of the longest observations seen so far, longest first.
#[derive(Debug, Clone)]
pub struct Slowest<T> {
    capacity: usize,
    entries: Vec<(Duration, T)>,
}

impl<T> Slowest<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Keeps `item` if there is room, or if it is strictly longer than the
    /// shortest entry, which it then replaces.
    pub fn offer(&mut self, duration: Duration, item: T) {
        if self.entries.len() < self.capacity {
            self.entries.push((duration, item));
        } else {
            match self.entries.last_mut() {
                Some(shortest) if duration > shortest.0 => *shortest = (duration, item),
                _ => return,
            }
        }
        self.entries.sort_by(|a, b| b.0.cmp(&a.0));
    }

    #[cfg(test)]
    pub fn durations(&self) -> impl Iterator<Item = Duration> + '_ {
        self.entries.iter().map(|(duration, _)| *duration)
    }

    pub fn into_items(self) -> Vec<T> {
        self.entries.into_iter().map(|(_, item)| item).collect()
    }
}

/// Reference to one physical job execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRef {
    pub id: u64,
    pub name: String,
    pub html_url: Option<String>,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
}

impl From<&Job> for JobRef {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            name: job.name.clone(),
            html_url: job.html_url.clone(),
            duration: job.duration(),
        }
    }
}

/// Aggregated statistics for one normalized job name across runs.
#[derive(Debug, Clone, Serialize)]
pub struct JobMetric {
    pub name: String,
    #[serde(flatten)]
    pub metric: Metric,
    /// Slowest physical executions, longest first.
    pub slowest_jobs: Vec<JobRef>,
    /// Steps at or above the threshold, by total duration.
    pub steps: Vec<StepMetric>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepMetric {
    pub name: String,
    #[serde(flatten)]
    pub metric: Metric,
    /// Every group seen inside the step, by total duration. Not filtered by
    /// threshold.
    pub groups: Vec<GroupMetric>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupMetric {
    pub name: String,
    #[serde(flatten)]
    pub metric: Metric,
}

#[derive(Debug)]
struct JobAccumulator {
    metric: Metric,
    slowest: Slowest<JobRef>,
    steps: HashMap<String, StepAccumulator>,
}

impl JobAccumulator {
    fn new() -> Self {
        Self {
            metric: Metric::default(),
            slowest: Slowest::new(SLOWEST_JOBS_CAPACITY),
            steps: HashMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct StepAccumulator {
    metric: Metric,
    groups: HashMap<String, Metric>,
}

impl StepAccumulator {
    fn add(&mut self, step: &Step, groups: &[Group]) {
        self.metric.add(step.duration());

        for group in groups.iter().filter(|group| step.contains(group)) {
            self.groups
                .entry(group.name.clone())
                .or_default()
                .add(group.duration());
        }
    }
}

/// Folds workflow runs into per-job, per-step and per-group statistics.
///
/// Not meant to be shared between tasks: fetch concurrently, then feed the
/// finished runs through one `RunMetrics` in sequence.
#[derive(Debug, Default)]
pub struct RunMetrics {
    jobs: HashMap<String, JobAccumulator>,
    runs: usize,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one run. Each normalized job name contributes at most one
    /// observation per run: the duration of its slowest instance. Steps and
    /// groups are counted for every physical job.
    pub fn add_run(&mut self, run: &WorkflowRun) {
        self.runs += 1;
        let mut slowest_in_run: HashMap<&str, Duration> = HashMap::new();

        for job in run.jobs.iter().filter(|job| job.is_completed()) {
            let acc = self
                .jobs
                .entry(job.normalized_name.clone())
                .or_insert_with(JobAccumulator::new);

            let duration = job.duration();
            if duration > Duration::ZERO {
                acc.slowest.offer(duration, JobRef::from(job));

                let slowest = slowest_in_run
                    .entry(job.normalized_name.as_str())
                    .or_default();
                *slowest = (*slowest).max(duration);
            }

            for step in &job.steps {
                acc.steps
                    .entry(step.name.clone())
                    .or_default()
                    .add(step, &job.groups);
            }
        }

        for (name, duration) in slowest_in_run {
            if let Some(acc) = self.jobs.get_mut(name) {
                acc.metric.add(duration);
            }
        }
    }

    pub fn run_count(&self) -> usize {
        self.runs
    }

    /// Ranks the collected statistics.
    ///
    /// Jobs and steps whose average is below `threshold` are dropped. Jobs,
    /// steps and groups are ordered by total duration, longest first, with
    /// ties broken by name.
    pub fn rank(self, threshold: Duration) -> Vec<JobMetric> {
        let total = self.jobs.len();

        let mut jobs: Vec<JobMetric> = self
            .jobs
            .into_iter()
            .filter(|(_, acc)| acc.metric.avg >= threshold)
            .map(|(name, acc)| {
                let mut steps: Vec<StepMetric> = acc
                    .steps
                    .into_iter()
                    .filter(|(_, step)| step.metric.avg >= threshold)
                    .map(|(name, step)| {
                        let mut groups: Vec<GroupMetric> = step
                            .groups
                            .into_iter()
                            .map(|(name, metric)| GroupMetric { name, metric })
                            .collect();
                        groups.sort_by(|a, b| by_sum(&a.name, &a.metric, &b.name, &b.metric));

                        StepMetric {
                            name,
                            metric: step.metric,
                            groups,
                        }
                    })
                    .collect();
                steps.sort_by(|a, b| by_sum(&a.name, &a.metric, &b.name, &b.metric));

                JobMetric {
                    name,
                    metric: acc.metric,
                    slowest_jobs: acc.slowest.into_items(),
                    steps,
                }
            })
            .collect();
        jobs.sort_by(|a, b| by_sum(&a.name, &a.metric, &b.name, &b.metric));

        debug!("{} of {} job names at or above threshold", jobs.len(), total);

        jobs
    }
}

fn by_sum(a_name: &str, a: &Metric, b_name: &str, b: &Metric) -> Ordering {
    b.sum.cmp(&a.sum).then_with(|| a_name.cmp(b_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::github::job::test_support::*;

    const THRESHOLD: Duration = Duration::from_secs(30);

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_secs).collect()
    }

    fn named(mut job: Job, normalized: &str) -> Job {
        job.normalized_name = normalized.to_string();
        job
    }

    #[test]
    fn test_metric_average() {
        let mut metric = Metric::default();
        metric.add(Duration::from_secs(10));
        metric.add(Duration::from_secs(20));

        assert_eq!(metric.sum, Duration::from_secs(30));
        assert_eq!(metric.count, 2);
        assert_eq!(metric.avg, Duration::from_secs(15));
    }

    #[test]
    fn test_slowest_keeps_top_three() {
        let mut slowest = Slowest::new(3);
        for (i, d) in secs(&[10, 20, 5, 30, 15]).into_iter().enumerate() {
            slowest.offer(d, i);
        }

        assert_eq!(slowest.durations().collect::<Vec<_>>(), secs(&[30, 20, 15]));
        assert_eq!(slowest.into_items(), vec![3, 1, 4]);
    }

    #[test]
    fn test_slowest_ignores_equal_to_minimum() {
        let mut slowest = Slowest::new(2);
        slowest.offer(Duration::from_secs(20), "a");
        slowest.offer(Duration::from_secs(10), "b");
        slowest.offer(Duration::from_secs(10), "c");

        assert_eq!(slowest.into_items(), vec!["a", "b"]);
    }

    #[test]
    fn test_slowest_with_zero_capacity_stays_empty() {
        let mut slowest = Slowest::new(0);
        slowest.offer(Duration::from_secs(10), ());
        assert_eq!(slowest.durations().count(), 0);
    }

    #[test]
    fn test_matrix_jobs_count_once_per_run() {
        let run = run(
            1,
            vec![
                named(job(1, "test (ubuntu)", 40), "test"),
                named(job(2, "test (macos)", 25), "test"),
            ],
        );

        let mut metrics = RunMetrics::new();
        metrics.add_run(&run);
        let ranked = metrics.rank(THRESHOLD);

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].metric.count, 1);
        assert_eq!(ranked[0].metric.sum, Duration::from_secs(40));
        assert_eq!(ranked[0].slowest_jobs.len(), 2);
        assert_eq!(ranked[0].slowest_jobs[0].id, 1);
    }

    #[test]
    fn test_average_across_runs() {
        let mut metrics = RunMetrics::new();
        metrics.add_run(&run(1, vec![job(1, "build", 20)]));
        metrics.add_run(&run(2, vec![job(2, "build", 60)]));
        assert_eq!(metrics.run_count(), 2);

        let ranked = metrics.rank(THRESHOLD);
        assert_eq!(ranked[0].metric.avg, Duration::from_secs(40));
        assert_eq!(ranked[0].metric.count, 2);
    }

    #[test]
    fn test_jobs_below_threshold_average_are_dropped() {
        let mut metrics = RunMetrics::new();
        metrics.add_run(&run(1, vec![job(1, "lint", 10), job(2, "build", 90)]));

        let ranked = metrics.rank(THRESHOLD);
        let names: Vec<_> = ranked.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["build"]);
    }

    #[test]
    fn test_jobs_ranked_by_sum() {
        let mut metrics = RunMetrics::new();
        // "a" has the higher average, "b" the higher total.
        metrics.add_run(&run(1, vec![job(1, "a", 100), job(2, "b", 60)]));
        metrics.add_run(&run(2, vec![job(3, "b", 60)]));

        let ranked = metrics.rank(THRESHOLD);
        let names: Vec<_> = ranked.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_ties_broken_by_name() {
        let mut metrics = RunMetrics::new();
        metrics.add_run(&run(1, vec![job(1, "zeta", 60), job(2, "alpha", 60)]));

        let ranked = metrics.rank(THRESHOLD);
        let names: Vec<_> = ranked.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_skipped_and_incomplete_jobs_do_not_count() {
        let mut api = api_job(1, "deploy", 0, 60, vec![]);
        api.conclusion = Some("skipped".to_string());
        let skipped = Job::new(api, vec![]);
        let mut running = job(2, "deploy", 60);
        running.status = "in_progress".to_string();

        let mut metrics = RunMetrics::new();
        metrics.add_run(&run(1, vec![skipped, running]));

        let ranked = metrics.rank(Duration::ZERO);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].metric.count, 0);
        assert!(ranked[0].slowest_jobs.is_empty());
    }

    #[test]
    fn test_steps_and_groups_aggregate_every_job() {
        let build = |id, end| {
            Job::new(
                api_job(
                    id,
                    "build",
                    0,
                    end,
                    vec![api_step("Set up job", 0, 5), api_step("Compile", 5, end)],
                ),
                vec![
                    group("Run cargo fetch", 5, 15),
                    group("Run cargo build", 15, end - 1),
                ],
            )
        };

        let mut metrics = RunMetrics::new();
        metrics.add_run(&run(1, vec![named(build(1, 65), "build"), named(build(2, 45), "build")]));

        let ranked = metrics.rank(THRESHOLD);
        let job = &ranked[0];
        assert_eq!(job.metric.count, 1);

        let names: Vec<_> = job.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Compile"]);

        let compile = &job.steps[0];
        assert_eq!(compile.metric.count, 2);
        assert_eq!(compile.metric.sum, Duration::from_secs(100));

        // Groups below the threshold stay in the list.
        let groups: Vec<_> = compile.groups.iter().map(|g| (g.name.as_str(), g.metric.count)).collect();
        assert_eq!(groups, vec![("Run cargo build", 2), ("Run cargo fetch", 2)]);
    }

    #[test]
    fn test_groups_out_of_time_order_are_aggregated() {
        let job = Job::new(
            api_job(1, "build", 0, 100, vec![api_step("Compile", 0, 100)]),
            vec![group("late", 200, 240), group("Run cargo build", 10, 60)],
        );

        let mut metrics = RunMetrics::new();
        metrics.add_run(&run(1, vec![job]));

        let ranked = metrics.rank(THRESHOLD);
        let groups: Vec<_> = ranked[0].steps[0].groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(groups, vec!["Run cargo build"]);
    }
}
