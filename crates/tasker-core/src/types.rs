use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::CoreError;

/// Timestamp format used in log markers and CLI output.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Seed names for generated job names.
const JOB_NAME_SEEDS: [&str; 7] = [
    "Mimas",
    "Enceladus",
    "Tethys",
    "Dione",
    "Rhea",
    "Titan",
    "Iapetus",
];

/// Registry key of a submitted task. Assigned as `max(existing) + 1`, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub i64);

impl TaskId {
    /// The id handed out when the registry is empty.
    pub const FIRST: TaskId = TaskId(1);

    /// Accept only ids from [`TaskId::FIRST`] upwards.
    pub fn new(raw: i64) -> crate::error::Result<Self> {
        if raw < Self::FIRST.0 {
            return Err(CoreError::InvalidTaskId(raw));
        }
        Ok(Self(raw))
    }

    /// `None` once the id space is exhausted.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TaskId {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

/// Human-readable job label. Log files are named after it, so it must be a
/// single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobName(String);

impl JobName {
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let name = raw.trim();
        let reason = if name.is_empty() {
            Some("must not be empty")
        } else if name.contains('/') || name.contains('\\') {
            Some("must not contain path separators")
        } else if name == "." || name == ".." {
            Some("must not be a relative path component")
        } else if name.chars().any(char::is_control) {
            Some("must not contain control characters")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(CoreError::InvalidJobName {
                name: raw.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(Self(name.to_string())),
        }
    }

    /// Pick a seed name and add a short random suffix, e.g. `Titan-3f9a`.
    pub fn generate() -> Self {
        let id = Uuid::new_v4();
        let bytes = id.as_bytes();
        let seed = JOB_NAME_SEEDS[bytes[0] as usize % JOB_NAME_SEEDS.len()];
        Self(format!("{seed}-{:02x}{:02x}", bytes[1], bytes[2]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for JobName {
    type Error = CoreError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<JobName> for String {
    fn from(name: JobName) -> Self {
        name.0
    }
}

impl std::str::FromStr for JobName {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// One row of the `processes` registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub created: NaiveDateTime,
    /// OS pid of the worker process driving this task.
    pub process_id: u32,
    pub job_name: String,
    pub command: String,
    /// Derived on read from the execution log's mtime; never trusted from storage.
    pub last_update: Option<NaiveDateTime>,
    /// Derived on read from a liveness probe of `process_id`; never trusted from storage.
    pub running: Option<bool>,
}

/// One row of the `process_stats` ledger, keyed by `task_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRecord {
    pub task_name: String,
    /// Last command seen for this name.
    pub command: String,
    /// Seconds.
    pub average_duration: f64,
    pub executions: u64,
}
