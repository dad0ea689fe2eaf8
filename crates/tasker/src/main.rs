use std::path::PathBuf;

use chrono::{Local, NaiveDateTime, Weekday};
use clap::{Args, Parser, Subcommand};
use tracing::warn;

use tasker::{ServiceError, TaskService, WorkerArgs};
use tasker_core::{JobName, TaskId, TaskerConfig, DATE_FORMAT};
use tasker_scheduler::{ExecutionMode, Frequency, ScheduleSpec, TimeUnit};
use tasker_stats::LedgerSummary;

#[derive(Parser)]
#[command(name = "tasker", version, about = "Run shell commands on a schedule")]
struct Cli {
    /// Config file (default: $TASKER_CONFIG, then ~/.tasker/tasker.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Schedule a command.
    Submit(SubmitArgs),
    /// List submitted tasks.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Stop a registered task's worker process and everything it started.
    Kill { pid: u32 },
    /// Print a job's execution log.
    Log {
        job: String,
        /// Show the captured command output instead.
        #[arg(long)]
        output: bool,
    },
    /// Show run statistics per job name.
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Run a command once in the foreground and print its output.
    Try {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(Args)]
struct SubmitArgs {
    /// Job name; generated when omitted.
    #[arg(long)]
    name: Option<String>,

    /// Repeat every N units.
    #[arg(long, conflicts_with = "daily")]
    every: Option<u32>,

    /// Unit of `--every`: minutes, hours, days or weeks.
    #[arg(long, default_value = "minutes")]
    unit: TimeUnit,

    /// Run daily on these weekdays, e.g. `mon,wed,fri`.
    #[arg(long, value_delimiter = ',', value_parser = parse_weekday)]
    daily: Option<Vec<Weekday>>,

    /// First run at this local time (`YYYY-MM-DD HH:MM[:SS]`) instead of now.
    #[arg(long, value_parser = parse_start)]
    at: Option<NaiveDateTime>,

    /// Task id to register (1 or greater); defaults to the next free one.
    #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
    task_id: Option<i64>,

    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

impl SubmitArgs {
    fn schedule(&self) -> ScheduleSpec {
        let frequency = match (&self.daily, self.every) {
            (Some(days), _) => Frequency::Daily {
                weekdays: days.clone(),
            },
            (None, Some(quantity)) => Frequency::Interval {
                unit: self.unit,
                quantity,
            },
            (None, None) => Frequency::Once,
        };
        match self.at {
            Some(start) => ScheduleSpec {
                frequency,
                start,
                mode: ExecutionMode::Scheduled,
            },
            None => ScheduleSpec::now(frequency, Local::now().naive_local()),
        }
    }
}

fn parse_weekday(s: &str) -> Result<Weekday, String> {
    s.trim()
        .parse::<Weekday>()
        .map_err(|_| format!("not a weekday: {s}"))
}

fn parse_start(s: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s, DATE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"))
        .map_err(|e| format!("expected YYYY-MM-DD HH:MM[:SS]: {e}"))
}

fn init_tracing(ansi: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tasker=info".into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // workers log to a file, the CLI to the terminal
    init_tracing(!matches!(cli.command, Cmd::Worker(_)));

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<ServiceError>() {
            Some(se) => eprintln!("error[{}]: {se}", se.code()),
            None => eprintln!("error: {e:#}"),
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Cmd::Worker(args) = cli.command {
        tasker::worker::run(args).await?;
        return Ok(());
    }

    // explicit path > TASKER_CONFIG env > ~/.tasker/tasker.toml
    let config_path = cli
        .config
        .or_else(|| std::env::var_os("TASKER_CONFIG").map(PathBuf::from));
    let config = TaskerConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({e}), using defaults");
        TaskerConfig::default()
    });
    let service = TaskService::open(config)?;

    match cli.command {
        Cmd::Submit(args) => {
            let job_name = match &args.name {
                Some(name) => JobName::parse(name).map_err(ServiceError::from)?,
                None => JobName::generate(),
            };
            let task_id = match args.task_id {
                Some(id) => TaskId::new(id).map_err(ServiceError::from)?,
                None => service.next_task_id()?,
            };
            let command = args.command.join(" ");
            let record = service
                .submit(&command, job_name, args.schedule(), task_id)
                .await?;
            println!(
                "task {} submitted as {} (worker pid {})",
                record.task_id, record.job_name, record.process_id
            );
        }
        Cmd::List { json } => {
            let tasks = service.list_tasks()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else if tasks.is_empty() {
                println!("no tasks submitted");
            } else {
                println!(
                    "{:>4}  {:<19}  {:>7}  {:<20}  {:<19}  {:<7}  COMMAND",
                    "ID", "CREATED", "PID", "JOB", "LAST UPDATE", "RUNNING"
                );
                for t in tasks {
                    let last = t
                        .last_update
                        .map(|ts| ts.format(DATE_FORMAT).to_string())
                        .unwrap_or_else(|| "-".into());
                    println!(
                        "{:>4}  {:<19}  {:>7}  {:<20}  {:<19}  {:<7}  {}",
                        t.task_id.get(),
                        t.created.format(DATE_FORMAT),
                        t.process_id,
                        t.job_name,
                        last,
                        t.running.unwrap_or(false),
                        t.command
                    );
                }
            }
        }
        Cmd::Kill { pid } => match service.kill(pid).await? {
            Some(report) => println!(
                "terminated {pid} ({} descendants, {} force-killed)",
                report.descendants.len(),
                report.forced.len()
            ),
            None => println!("process {pid} is not running"),
        },
        Cmd::Log { job, output } => {
            let job = JobName::parse(&job).map_err(ServiceError::from)?;
            let lines = if output {
                service.read_output(&job)?
            } else {
                service.read_log(&job)?
            };
            match lines {
                Some(lines) => lines.iter().for_each(|l| println!("{l}")),
                None => println!("log for {job} not yet created"),
            }
        }
        Cmd::Stats { json } => {
            let ledger = service.stats().ledger().await?;
            let summary = LedgerSummary::from_records(&ledger);
            if json {
                let body = serde_json::json!({ "summary": summary, "ledger": ledger });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!("Tasks run:            {}", summary.total_runs);
                println!("Total duration (min): {:.2}", summary.total_minutes);
                println!("Top command:          {}", summary.top_command);
                if !ledger.is_empty() {
                    println!();
                    println!("{:<20}  {:>10}  {:>12}  COMMAND", "TASK", "EXECUTIONS", "AVG (s)");
                    for row in ledger {
                        println!(
                            "{:<20}  {:>10}  {:>12.2}  {}",
                            row.task_name, row.executions, row.average_duration, row.command
                        );
                    }
                }
            }
        }
        Cmd::Try { command } => {
            let trial = service.try_command(&command.join(" ")).await?;
            trial.output.iter().for_each(|l| println!("{l}"));
            match trial.exit_code {
                Some(code) => eprintln!("exit code {code}"),
                None => eprintln!("terminated by signal"),
            }
        }
        Cmd::Worker(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn submit_flags_build_schedules() {
        let cli = Cli::parse_from(["tasker", "submit", "--every", "5", "--unit", "hours", "ls", "-la"]);
        let Cmd::Submit(args) = cli.command else {
            panic!("expected submit");
        };
        assert_eq!(args.command, ["ls", "-la"]);
        assert_eq!(
            args.schedule().frequency,
            Frequency::Interval {
                unit: TimeUnit::Hours,
                quantity: 5
            }
        );

        let cli = Cli::parse_from([
            "tasker", "submit", "--daily", "mon,fri", "--at", "2024-03-04 09:30", "backup.sh",
        ]);
        let Cmd::Submit(args) = cli.command else {
            panic!("expected submit");
        };
        let spec = args.schedule();
        assert_eq!(spec.mode, ExecutionMode::Scheduled);
        assert_eq!(
            spec.frequency,
            Frequency::Daily {
                weekdays: vec![Weekday::Mon, Weekday::Fri]
            }
        );
        assert_eq!(spec.start.format(DATE_FORMAT).to_string(), "2024-03-04 09:30:00");
    }

    #[test]
    fn task_id_flag_rejects_non_positive_ids() {
        for bad in ["0", "-3"] {
            let parsed = Cli::try_parse_from(["tasker", "submit", "--task-id", bad, "true"]);
            assert!(parsed.is_err(), "--task-id {bad} should be rejected");
        }
        let cli = Cli::parse_from(["tasker", "submit", "--task-id", "9", "true"]);
        let Cmd::Submit(args) = cli.command else {
            panic!("expected submit");
        };
        assert_eq!(args.task_id, Some(9));
    }

    #[test]
    fn plain_submit_is_once_now() {
        let cli = Cli::parse_from(["tasker", "submit", "echo", "hi"]);
        let Cmd::Submit(args) = cli.command else {
            panic!("expected submit");
        };
        let spec = args.schedule();
        assert_eq!(spec.frequency, Frequency::Once);
        assert_eq!(spec.mode, ExecutionMode::Now);
    }
}
