use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use super::{TransferEngine, TransferError, TransferRequest, TransferSummary};

/// Spawns transfers as independent tasks. Callers get a handle back
/// immediately; the spawner keeps track of every task so the process can
/// wait for or cancel outstanding transfers on shutdown.
#[derive(Clone)]
pub struct TransferSpawner {
    engine: Arc<TransferEngine>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

/// Handle on one spawned transfer.
pub struct TransferHandle {
    job_id: String,
    cancel: CancellationToken,
    join: JoinHandle<Result<TransferSummary, TransferError>>,
}

impl TransferHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Ask the transfer to stop before its next component.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the transfer's own view of its outcome.
    pub async fn join(self) -> anyhow::Result<TransferSummary> {
        Ok(self.join.await??)
    }
}

impl TransferSpawner {
    pub fn new(engine: TransferEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn spawn(&self, request: TransferRequest) -> TransferHandle {
        let job_id = request.job_id.clone();
        let cancel = self.shutdown.child_token();

        let engine = self.engine.clone();
        let token = cancel.clone();
        let join = self
            .tracker
            .spawn(async move { engine.run(request, token).await });

        info!(job_id = %job_id, "Spawned transfer");
        TransferHandle {
            job_id,
            cancel,
            join,
        }
    }

    /// Number of transfers still running.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel every running transfer.
    pub fn cancel_all(&self) {
        self.shutdown.cancel();
    }

    /// Wait until every spawned transfer has finished.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
