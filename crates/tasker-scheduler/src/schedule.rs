//! Fire-time arithmetic. Pure functions only: no clock, no I/O.

use chrono::{Datelike, NaiveDateTime, NaiveTime, TimeDelta, Weekday};

use crate::error::{Result, ScheduleError};
use crate::types::{ExecutionMode, Frequency, ScheduleSpec};

/// Reject specs that can never fire.
pub fn validate(spec: &ScheduleSpec) -> Result<()> {
    compute_interval(spec).map(|_| ())
}

/// Time between fires. `None` for a one-shot task.
pub fn compute_interval(spec: &ScheduleSpec) -> Result<Option<TimeDelta>> {
    match &spec.frequency {
        Frequency::Once => Ok(None),
        Frequency::Interval { unit, quantity } => {
            let max = unit.max_quantity();
            if *quantity == 0 || *quantity > max {
                return Err(ScheduleError::QuantityOutOfRange {
                    unit: *unit,
                    quantity: *quantity,
                    max,
                });
            }
            let secs = unit.seconds() * i64::from(*quantity);
            TimeDelta::try_seconds(secs)
                .map(Some)
                .ok_or(ScheduleError::OutOfRange)
        }
        Frequency::Daily { weekdays } => {
            if weekdays.is_empty() {
                return Err(ScheduleError::NoWeekdays);
            }
            Ok(Some(TimeDelta::days(1)))
        }
    }
}

/// The first fire time of `spec`, given the submission instant `now`.
///
/// `Now` fires at `now`; `Scheduled` fires at `start`. A daily schedule is
/// moved forward a day at a time until it lands on one of its weekdays; in
/// `Now` mode a non-matching today moves to midnight of the next listed day.
pub fn compute_first_fire(spec: &ScheduleSpec, now: NaiveDateTime) -> Result<NaiveDateTime> {
    validate(spec)?;
    let candidate = match spec.mode {
        ExecutionMode::Now => now,
        ExecutionMode::Scheduled => spec.start,
    };
    match &spec.frequency {
        Frequency::Daily { weekdays } => {
            if weekdays.contains(&candidate.weekday()) {
                return Ok(candidate);
            }
            let base = match spec.mode {
                ExecutionMode::Now => candidate.date().and_time(NaiveTime::MIN),
                ExecutionMode::Scheduled => candidate,
            };
            next_matching_day(base, weekdays)
        }
        _ => Ok(candidate),
    }
}

/// The fire time after `slot`, or `None` when the task is finished.
///
/// Steps from `slot`, not from the current time, so a late worker catches up
/// one slot per run.
pub fn advance(spec: &ScheduleSpec, slot: NaiveDateTime) -> Result<Option<NaiveDateTime>> {
    let Some(interval) = compute_interval(spec)? else {
        return Ok(None);
    };
    let next = slot
        .checked_add_signed(interval)
        .ok_or(ScheduleError::OutOfRange)?;
    match &spec.frequency {
        Frequency::Daily { weekdays } if !weekdays.contains(&next.weekday()) => {
            next_matching_day(next, weekdays).map(Some)
        }
        _ => Ok(Some(next)),
    }
}

/// Whether a run armed for `next_fire` should start at `now`.
pub fn is_due(spec: &ScheduleSpec, next_fire: NaiveDateTime, now: NaiveDateTime) -> bool {
    let weekday_ok = match &spec.frequency {
        Frequency::Daily { weekdays } => weekdays.contains(&now.weekday()),
        _ => true,
    };
    weekday_ok && now >= next_fire
}

/// First day strictly after `from` (same time of day) whose weekday is listed.
fn next_matching_day(from: NaiveDateTime, weekdays: &[Weekday]) -> Result<NaiveDateTime> {
    let mut day = from;
    for _ in 0..7 {
        day = day
            .checked_add_signed(TimeDelta::days(1))
            .ok_or(ScheduleError::OutOfRange)?;
        if weekdays.contains(&day.weekday()) {
            return Ok(day);
        }
    }
    Err(ScheduleError::NoWeekdays)
}
