use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use super::log_parser::Group;

/// Slack applied to both ends of a step window.
///
/// Step timestamps come from the API while group timestamps come from the
/// runner log, so the two clocks rarely agree to the millisecond.
const CONTAINMENT_TOLERANCE_MS: i64 = 500;

fn tolerance() -> TimeDelta {
    TimeDelta::milliseconds(CONTAINMENT_TOLERANCE_MS)
}

/// One phase of a job as reported by the job metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    duration: Duration,
}

impl Step {
    pub fn new(
        name: impl Into<String>,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        let duration = match (started_at, completed_at) {
            (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        };

        Self {
            name: name.into(),
            started_at,
            completed_at,
            duration,
        }
    }

    /// `completed_at - started_at`; zero when unset or inverted.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// True when the step finished more than the tolerance before `group` began.
    pub fn ends_before(&self, group: &Group) -> bool {
        match (self.completed_at, group.start_time) {
            (Some(end), Some(group_start)) => end + tolerance() < group_start,
            _ => false,
        }
    }

    /// Whether `group` ran inside this step's window, widened by the tolerance
    /// on both ends. Groups without a start time (the preamble) never match.
    pub fn contains(&self, group: &Group) -> bool {
        let (Some(start), Some(end)) = (self.started_at, self.completed_at) else {
            return false;
        };
        let Some(group_start) = group.start_time else {
            return false;
        };
        if self.ends_before(group) {
            return false;
        }
        let group_end = group.end_time.unwrap_or(group_start);

        start - tolerance() <= group_start && group_end <= end + tolerance()
    }
}
