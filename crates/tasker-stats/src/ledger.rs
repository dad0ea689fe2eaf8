use serde::Serialize;
use tasker_core::StatsRecord;

/// Shown as the top command when nothing has run yet.
pub const NO_TASKS: &str = "No tasks scheduled";

/// Round a measured duration to hundredths of a second.
pub fn round_duration(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}

/// Fold one completed run into the ledger row for `task_name`.
///
/// A new name starts at one execution averaging `duration`. An existing row
/// keeps a running mean and takes the latest `command`.
pub fn apply_run(
    existing: Option<&StatsRecord>,
    task_name: &str,
    command: &str,
    duration: f64,
) -> StatsRecord {
    match existing {
        None => StatsRecord {
            task_name: task_name.to_string(),
            command: command.to_string(),
            average_duration: duration,
            executions: 1,
        },
        Some(row) => {
            let n = row.executions as f64;
            let executions = row.executions + 1;
            StatsRecord {
                task_name: task_name.to_string(),
                command: command.to_string(),
                average_duration: (row.average_duration * n + duration) / executions as f64,
                executions,
            }
        }
    }
}

/// Dashboard totals over the whole ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerSummary {
    /// Sum of executions across all names.
    pub total_runs: u64,
    /// Σ average × executions, in minutes, rounded to two decimals.
    pub total_minutes: f64,
    /// Command of the first row with the highest execution count.
    pub top_command: String,
}

impl LedgerSummary {
    pub fn from_records(rows: &[StatsRecord]) -> Self {
        let total_runs = rows.iter().map(|r| r.executions).sum();
        let total_secs: f64 = rows
            .iter()
            .map(|r| r.average_duration * r.executions as f64)
            .sum();

        let mut top: Option<&StatsRecord> = None;
        for row in rows {
            if top.map_or(true, |t| row.executions > t.executions) {
                top = Some(row);
            }
        }

        Self {
            total_runs,
            total_minutes: round_duration(total_secs / 60.0),
            top_command: top.map_or_else(|| NO_TASKS.to_string(), |r| r.command.clone()),
        }
    }
}

/// Most-executed first; ties keep their stored order.
pub fn sort_by_executions(rows: &mut [StatsRecord]) {
    rows.sort_by(|a, b| b.executions.cmp(&a.executions));
}
