use chrono::{NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use tasker_core::JobName;

use crate::error::ScheduleError;

/// Unit of an `Interval` recurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl TimeUnit {
    pub fn seconds(self) -> i64 {
        match self {
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 3_600,
            TimeUnit::Days => 86_400,
            TimeUnit::Weeks => 604_800,
        }
    }

    /// Largest accepted quantity for this unit.
    pub fn max_quantity(self) -> u32 {
        match self {
            TimeUnit::Minutes | TimeUnit::Hours => 59,
            TimeUnit::Days => 364,
            TimeUnit::Weeks => 51,
        }
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
            TimeUnit::Weeks => "weeks",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for TimeUnit {
    type Err = ScheduleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "m" | "min" | "minute" | "minutes" => Ok(TimeUnit::Minutes),
            "h" | "hour" | "hours" => Ok(TimeUnit::Hours),
            "d" | "day" | "days" => Ok(TimeUnit::Days),
            "w" | "week" | "weeks" => Ok(TimeUnit::Weeks),
            other => Err(ScheduleError::Malformed(format!("unknown time unit: {other}"))),
        }
    }
}

/// How often a task fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frequency {
    /// A single run.
    Once,
    /// Every `quantity` × `unit`.
    Interval { unit: TimeUnit, quantity: u32 },
    /// Once a day, on the listed weekdays only.
    Daily { weekdays: Vec<Weekday> },
}

/// Whether the first run happens at submission or at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Now,
    Scheduled,
}

/// Recurrence rule plus start condition, consumed once by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub frequency: Frequency,
    /// First intended fire time (local). Ignored in `Now` mode.
    pub start: NaiveDateTime,
    pub mode: ExecutionMode,
}

impl ScheduleSpec {
    pub fn now(frequency: Frequency, at: NaiveDateTime) -> Self {
        Self {
            frequency,
            start: at,
            mode: ExecutionMode::Now,
        }
    }

    pub fn scheduled(frequency: Frequency, start: NaiveDateTime) -> Self {
        Self {
            frequency,
            start,
            mode: ExecutionMode::Scheduled,
        }
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self.frequency, Frequency::Once)
    }
}

/// Everything a worker process needs to drive one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub job_name: JobName,
    pub command: String,
    pub schedule: ScheduleSpec,
}

impl ScheduledTask {
    pub fn to_json(&self) -> Result<String, ScheduleError> {
        serde_json::to_string(self).map_err(|e| ScheduleError::Malformed(e.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self, ScheduleError> {
        serde_json::from_str(raw).map_err(|e| ScheduleError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn unit_table() {
        assert_eq!(TimeUnit::Minutes.seconds(), 60);
        assert_eq!(TimeUnit::Weeks.seconds(), 604_800);
        assert_eq!(TimeUnit::Days.max_quantity(), 364);
        assert_eq!(TimeUnit::Weeks.max_quantity(), 51);
    }

    #[test]
    fn unit_parses_short_and_long_forms() {
        assert_eq!("h".parse::<TimeUnit>().unwrap(), TimeUnit::Hours);
        assert_eq!("Minutes".parse::<TimeUnit>().unwrap(), TimeUnit::Minutes);
        assert!("fortnight".parse::<TimeUnit>().is_err());
    }

    #[test]
    fn task_survives_json_transport() {
        let task = ScheduledTask {
            job_name: JobName::parse("Rhea-01ab").unwrap(),
            command: "echo hi".into(),
            schedule: ScheduleSpec::scheduled(
                Frequency::Daily {
                    weekdays: vec![Weekday::Mon, Weekday::Fri],
                },
                at(9),
            ),
        };
        let json = task.to_json().unwrap();
        assert!(json.contains("\"kind\":\"daily\""));
        assert_eq!(ScheduledTask::from_json(&json).unwrap(), task);
    }

    #[test]
    fn bad_job_name_in_json_is_rejected() {
        let json = r#"{"job_name":"../x","command":"true",
            "schedule":{"frequency":{"kind":"once"},"start":"2024-03-04T09:00:00","mode":"now"}}"#;
        assert!(ScheduledTask::from_json(json).is_err());
    }

    #[test]
    fn once_is_not_recurring() {
        assert!(!ScheduleSpec::now(Frequency::Once, at(1)).is_recurring());
        let every = Frequency::Interval {
            unit: TimeUnit::Hours,
            quantity: 2,
        };
        assert!(ScheduleSpec::now(every, at(1)).is_recurring());
    }
}
