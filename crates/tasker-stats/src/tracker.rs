use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use tasker_core::StatsRecord;
use tasker_store::{OrEmpty, Repository};

use crate::error::{Result, StatsError};
use crate::ledger::{apply_run, sort_by_executions, LedgerSummary};

const QUEUE_DEPTH: usize = 64;

enum Request {
    Record {
        task_name: String,
        command: String,
        duration: f64,
        reply: oneshot::Sender<Result<StatsRecord>>,
    },
    Ledger {
        reply: oneshot::Sender<Result<Vec<StatsRecord>>>,
    },
}

/// Handle to the single ledger writer. Cheap to clone; the writer stops when
/// the last handle is dropped.
#[derive(Clone)]
pub struct StatsTracker {
    tx: mpsc::Sender<Request>,
}

impl StatsTracker {
    /// Start the writer thread, which takes ownership of `repo`.
    ///
    /// Repository calls block on SQLite locks (up to the busy timeout), so the
    /// writer runs on its own OS thread rather than on the async runtime.
    pub fn spawn<R>(repo: R) -> Result<Self>
    where
        R: Repository + 'static,
    {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        std::thread::Builder::new()
            .name("stats-writer".into())
            .spawn(move || writer_loop(repo, rx))?;
        Ok(Self { tx })
    }

    /// Fold one completed run of `task_name` into the ledger and return the
    /// updated row.
    pub async fn record(&self, task_name: &str, command: &str, duration: f64) -> Result<StatsRecord> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Record {
            task_name: task_name.to_string(),
            command: command.to_string(),
            duration,
            reply,
        })
        .await?;
        rx.await.map_err(|_| StatsError::Closed)?
    }

    /// All ledger rows, most-executed first.
    pub async fn ledger(&self) -> Result<Vec<StatsRecord>> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Ledger { reply }).await?;
        rx.await.map_err(|_| StatsError::Closed)?
    }

    pub async fn summary(&self) -> Result<LedgerSummary> {
        Ok(LedgerSummary::from_records(&self.ledger().await?))
    }

    async fn send(&self, req: Request) -> Result<()> {
        self.tx.send(req).await.map_err(|_| StatsError::Closed)
    }
}

fn writer_loop<R: Repository>(repo: R, mut rx: mpsc::Receiver<Request>) {
    debug!("stats writer started");
    while let Some(req) = rx.blocking_recv() {
        match req {
            Request::Record {
                task_name,
                command,
                duration,
                reply,
            } => {
                let result = repo
                    .update_stats(&task_name, &|old| apply_run(old, &task_name, &command, duration))
                    .map_err(StatsError::from);
                match &result {
                    Ok(row) => info!(
                        task_name = %row.task_name,
                        executions = row.executions,
                        average = row.average_duration,
                        "run recorded"
                    ),
                    Err(e) => warn!(%task_name, "stats update dropped: {e}"),
                }
                let _ = reply.send(result);
            }
            Request::Ledger { reply } => {
                let result = repo.load_stats().or_empty().map_err(StatsError::from).map(|mut rows| {
                    sort_by_executions(&mut rows);
                    rows
                });
                let _ = reply.send(result);
            }
        }
    }
    debug!("stats writer stopped");
}
