use std::io::BufRead;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, warn};
use regex::Regex;

use crate::error::Result;

/// Opens a new log group. Everything after the marker is the group name.
const GROUP_MARKER: &str = "##[group]";
/// Printed once by the runner near the top of every job log.
const JOB_NAME_MARKER: &str = "Complete job name: ";
const BYTE_ORDER_MARK: char = '\u{feff}';
/// Runner timestamps carry seven fractional digits, e.g. `2025-10-25T13:48:59.4421674Z`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("ANSI escape regex is valid"));

/// One physical record of a job log.
///
/// Lines only exist while parsing: they are folded into the current [`Group`],
/// or merged into the previous line when they carry no timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// `None` for continuation text.
    pub timestamp: Option<DateTime<Utc>>,
    pub content: String,
    /// The line is a `##[group]` opener; `content` holds the group name.
    pub starts_group: bool,
    /// The line had no parseable timestamp and belongs to the previous line.
    pub continuation: bool,
    /// Set when the line is the runner's `Complete job name:` banner.
    pub job_name: Option<String>,
}

impl Line {
    /// Classifies a raw log line after stripping the BOM and ANSI escapes.
    pub fn parse(raw: &str) -> Self {
        let cleaned = ANSI_ESCAPE.replace_all(raw.trim_start_matches(BYTE_ORDER_MARK), "");

        let Some((candidate, rest)) = cleaned.split_once(' ') else {
            return Self::continuation(cleaned.into_owned());
        };

        let Some(timestamp) = parse_timestamp(candidate) else {
            return Self::continuation(cleaned.into_owned());
        };

        if let Some(name) = rest.strip_prefix(GROUP_MARKER) {
            return Self {
                timestamp: Some(timestamp),
                content: name.to_string(),
                starts_group: true,
                continuation: false,
                job_name: None,
            };
        }

        Self {
            timestamp: Some(timestamp),
            content: rest.to_string(),
            starts_group: false,
            continuation: false,
            job_name: rest.strip_prefix(JOB_NAME_MARKER).map(str::to_string),
        }
    }

    fn continuation(content: String) -> Self {
        Self {
            timestamp: None,
            content,
            starts_group: false,
            continuation: true,
            job_name: None,
        }
    }
}

fn parse_timestamp(candidate: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(candidate, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// A named, time-bounded segment of a job log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Empty for the preamble that precedes the first `##[group]` marker.
    pub name: String,
    /// `None` only for the preamble.
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub lines: Vec<Line>,
}

impl Group {
    fn preamble() -> Self {
        Self {
            name: String::new(),
            start_time: None,
            end_time: None,
            lines: Vec::new(),
        }
    }

    fn open(name: String, start_time: Option<DateTime<Utc>>) -> Self {
        Self {
            name,
            start_time,
            end_time: None,
            lines: Vec::new(),
        }
    }

    /// `end - start`, or zero when either bound is missing.
    pub fn duration(&self) -> Duration {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }

    pub fn is_preamble(&self) -> bool {
        self.start_time.is_none()
    }
}

/// Result of parsing one job log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLog {
    /// First `Complete job name:` value found in the log.
    pub job_name: Option<String>,
    /// Groups in the order they appear, i.e. non-decreasing start time.
    pub groups: Vec<Group>,
}

/// Line-by-line fold of a log into groups.
///
/// The parser starts in the preamble (a nameless group without a start time)
/// and switches to a real group on the first `##[group]` marker. Each further
/// marker closes the current group at the marker's timestamp.
struct LogParser {
    groups: Vec<Group>,
    current: Group,
    job_name: Option<String>,
}

impl LogParser {
    fn new() -> Self {
        Self {
            groups: Vec::new(),
            current: Group::preamble(),
            job_name: None,
        }
    }

    fn feed(&mut self, line_number: usize, raw: &str) {
        let line = Line::parse(raw);

        if line.continuation {
            match self.current.lines.last_mut() {
                Some(previous) => {
                    previous.content.push('\n');
                    previous.content.push_str(&line.content);
                }
                None => warn!(
                    "Skipping malformed log line {line_number}: no timestamp and nothing to continue: {raw:?}"
                ),
            }
            return;
        }

        if line.starts_group {
            let next = Group::open(line.content, line.timestamp);
            let mut closed = std::mem::replace(&mut self.current, next);
            closed.end_time = line.timestamp;
            self.push(closed);
            return;
        }

        if let Some(name) = &line.job_name {
            if self.job_name.is_none() {
                self.job_name = Some(name.clone());
            }
        }
        self.current.lines.push(line);
    }

    fn push(&mut self, group: Group) {
        // A preamble without content carries no information.
        if group.is_preamble() && group.lines.is_empty() {
            return;
        }
        self.groups.push(group);
    }

    fn finish(mut self) -> ParsedLog {
        let mut last = std::mem::replace(&mut self.current, Group::preamble());
        if last.end_time.is_none() {
            last.end_time = last.lines.last().and_then(|line| line.timestamp);
        }
        self.push(last);

        debug!("Parsed {} log groups", self.groups.len());

        ParsedLog {
            job_name: self.job_name,
            groups: self.groups,
        }
    }
}

/// Parses a raw job log into groups.
///
/// Malformed lines are skipped with a warning. Only a failure to read from
/// `reader` is returned as an error. Invalid UTF-8 is replaced lossily.
pub fn parse<R: BufRead>(mut reader: R) -> Result<ParsedLog> {
    let mut parser = LogParser::new();
    let mut buf = Vec::new();
    let mut line_number = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_number += 1;

        let raw = String::from_utf8_lossy(&buf);
        parser.feed(line_number, raw.trim_end_matches(['\n', '\r']));
    }

    Ok(parser.finish())
}
