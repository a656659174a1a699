use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use super::job::Job;
use super::log_parser::Group;
use super::step::Step;
use crate::insights::serialize_secs;

/// A step at or above the threshold with the slow groups that ran inside it.
#[derive(Debug, Clone)]
pub struct SlowStep<'a> {
    pub step: &'a Step,
    /// Slow groups contained in the step, longest first.
    pub groups: Vec<&'a Group>,
}

/// Where a job's wall-clock time went outside of its steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobTimings {
    /// Sum of all step durations.
    #[serde(serialize_with = "serialize_secs")]
    pub all_steps: Duration,
    /// From job start to the first step start.
    #[serde(serialize_with = "serialize_secs")]
    pub setup: Duration,
    /// From the last step completion to job completion.
    #[serde(serialize_with = "serialize_secs")]
    pub cleanup: Duration,
    /// Time between the first and last step not covered by any step.
    #[serde(serialize_with = "serialize_secs")]
    pub steps_overhead: Duration,
}

impl JobTimings {
    /// Computes the breakdown for a job. Every component is clamped at zero,
    /// and a job without steps reports zeros.
    pub fn of(job: &Job) -> Self {
        let (Some(first), Some(last)) = (job.steps.first(), job.steps.last()) else {
            return Self::default();
        };

        let all_steps: Duration = job.steps.iter().map(Step::duration).sum();
        let span = |from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>| match (from, to) {
            (Some(from), Some(to)) => (to - from).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        };
        let steps_span = span(first.started_at, last.completed_at);

        Self {
            all_steps,
            setup: span(job.started_at, first.started_at),
            cleanup: span(last.completed_at, job.completed_at),
            steps_overhead: steps_span.saturating_sub(all_steps),
        }
    }
}

/// A job at or above the threshold with its slow steps.
#[derive(Debug, Clone)]
pub struct JobAnalysis<'a> {
    pub job: &'a Job,
    pub timings: JobTimings,
    pub slow_steps: Vec<SlowStep<'a>>,
}

impl<'a> JobAnalysis<'a> {
    pub fn new(job: &'a Job, threshold: Duration) -> Self {
        Self {
            job,
            timings: JobTimings::of(job),
            slow_steps: analyze_job(&job.steps, &job.groups, threshold),
        }
    }
}

/// Groups lasting at least `threshold`, longest first.
pub fn slow_groups(groups: &[Group], threshold: Duration) -> Vec<&Group> {
    let mut slow: Vec<&Group> = groups
        .iter()
        .filter(|group| group.duration() >= threshold)
        .collect();
    slow.sort_by(|a, b| b.duration().cmp(&a.duration()));
    slow
}

/// Finds the slow steps of a job and attributes slow log groups to them.
///
/// `groups` need not be sorted: runner clocks can skew log timestamps. A
/// group may be attributed to more than one step when step windows overlap
/// within the containment tolerance.
///
/// # Returns
///
/// Steps lasting at least `threshold`, longest first. Equal durations keep
/// their step order.
pub fn analyze_job<'a>(
    steps: &'a [Step],
    groups: &'a [Group],
    threshold: Duration,
) -> Vec<SlowStep<'a>> {
    let candidates: Vec<&Group> = groups
        .iter()
        .filter(|group| group.duration() >= threshold)
        .collect();

    let mut slow_steps: Vec<SlowStep<'a>> = steps
        .iter()
        .filter(|step| step.duration() >= threshold)
        .map(|step| {
            let mut contained: Vec<&Group> = candidates
                .iter()
                .copied()
                .filter(|group| step.contains(group))
                .collect();
            contained.sort_by(|a, b| b.duration().cmp(&a.duration()));

            SlowStep {
                step,
                groups: contained,
            }
        })
        .collect();

    slow_steps.sort_by(|a, b| b.step.duration().cmp(&a.step.duration()));

    debug!(
        "Found {} slow steps out of {} ({} slow groups)",
        slow_steps.len(),
        steps.len(),
        candidates.len()
    );

    slow_steps
}

/// Analyzes the jobs of one run that took at least `threshold`, longest first.
pub fn analyze_slow_jobs(jobs: &[Job], threshold: Duration) -> Vec<JobAnalysis<'_>> {
    let mut slow: Vec<JobAnalysis<'_>> = jobs
        .iter()
        .filter(|job| job.duration() >= threshold)
        .map(|job| JobAnalysis::new(job, threshold))
        .collect();
    slow.sort_by(|a, b| b.job.duration().cmp(&a.job.duration()));
    slow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::github::job::test_support::*;

    const THRESHOLD: Duration = Duration::from_secs(30);

    fn step(name: &str, start: i64, end: i64) -> Step {
        Step::new(name, Some(at(start)), Some(at(end)))
    }

    #[test]
    fn test_single_slow_step_without_groups() {
        let steps = vec![step("Run tests", 0, 45)];

        let slow = analyze_job(&steps, &[], THRESHOLD);

        assert_eq!(slow.len(), 1);
        assert_eq!(slow[0].step.name, "Run tests");
        assert!(slow[0].groups.is_empty());
    }

    #[test]
    fn test_groups_out_of_time_order_are_attributed() {
        let steps = vec![step("Build", 0, 100)];
        let groups = vec![group("late", 200, 240), group("inside", 10, 60)];

        let slow = analyze_job(&steps, &groups, THRESHOLD);

        let names: Vec<_> = slow[0].groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["inside"]);
    }

    #[test]
    fn test_fast_steps_are_dropped() {
        let steps = vec![step("Checkout", 0, 5), step("Build", 5, 34)];
        assert!(analyze_job(&steps, &[], THRESHOLD).is_empty());
    }

    #[test]
    fn test_step_at_threshold_is_slow() {
        let steps = vec![step("Build", 0, 30)];
        assert_eq!(analyze_job(&steps, &[], THRESHOLD).len(), 1);
    }

    #[test]
    fn test_groups_attributed_and_sorted() {
        let steps = vec![step("Setup", 0, 10), step("Build", 10, 200)];
        let groups = vec![
            group("Run make deps", 10, 60),
            group("Run make", 60, 190),
            group("short", 190, 195),
        ];

        let slow = analyze_job(&steps, &groups, THRESHOLD);

        assert_eq!(slow.len(), 1);
        let names: Vec<_> = slow[0].groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Run make", "Run make deps"]);
    }

    #[test]
    fn test_steps_sorted_longest_first_with_stable_ties() {
        let steps = vec![
            step("a", 0, 40),
            step("b", 40, 140),
            step("c", 140, 180),
        ];

        let slow = analyze_job(&steps, &[], THRESHOLD);
        let names: Vec<_> = slow.iter().map(|s| s.step.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_group_in_overlapping_steps_is_attributed_to_both() {
        let steps = vec![step("first", 0, 60), step("second", 0, 60)];
        let groups = vec![group("shared", 10, 50)];

        let slow = analyze_job(&steps, &groups, THRESHOLD);

        assert_eq!(slow.len(), 2);
        assert!(slow.iter().all(|s| s.groups.len() == 1));
    }

    #[test]
    fn test_group_outside_every_step_is_unattributed() {
        let steps = vec![step("Build", 0, 40)];
        let groups = vec![group("Post job cleanup", 100, 140)];

        let slow = analyze_job(&steps, &groups, THRESHOLD);
        assert!(slow[0].groups.is_empty());
    }

    #[test]
    fn test_slow_groups_sorted() {
        let groups = vec![
            group("a", 0, 31),
            group("b", 31, 32),
            group("c", 32, 100),
        ];

        let slow = slow_groups(&groups, THRESHOLD);
        let names: Vec<_> = slow.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a"]);
    }

    #[test]
    fn test_job_timings() {
        let api = api_job(
            1,
            "build",
            0,
            100,
            vec![
                api_step("Set up job", 5, 10),
                api_step("Build", 12, 80),
                api_step("Complete job", 80, 90),
            ],
        );
        let job = Job::new(api, vec![]);

        let timings = JobTimings::of(&job);
        assert_eq!(timings.all_steps, Duration::from_secs(83));
        assert_eq!(timings.setup, Duration::from_secs(5));
        assert_eq!(timings.cleanup, Duration::from_secs(10));
        assert_eq!(timings.steps_overhead, Duration::from_secs(2));
    }

    #[test]
    fn test_job_timings_clamp_overlapping_steps() {
        let api = api_job(
            1,
            "build",
            10,
            50,
            vec![api_step("a", 0, 40), api_step("b", 0, 60)],
        );
        let job = Job::new(api, vec![]);

        let timings = JobTimings::of(&job);
        assert_eq!(timings.setup, Duration::ZERO);
        assert_eq!(timings.cleanup, Duration::ZERO);
        assert_eq!(timings.steps_overhead, Duration::ZERO);
    }

    #[test]
    fn test_job_timings_without_steps() {
        assert_eq!(JobTimings::of(&job(1, "build", 60)), JobTimings::default());
    }

    #[test]
    fn test_analyze_slow_jobs() {
        let jobs = vec![job(1, "lint", 10), job(2, "test", 300), job(3, "build", 120)];

        let slow = analyze_slow_jobs(&jobs, THRESHOLD);
        let ids: Vec<_> = slow.iter().map(|a| a.job.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
