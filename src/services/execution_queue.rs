//! Background execution of automated runs.
//!
//! A single dispatcher drains an mpsc queue and hands each job to its own
//! task, bounded by a semaphore. Every run is enqueued once, so exactly one
//! task executes it. Started tasks are never cancelled; the runner timeout
//! is their only bound.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::runner::ScriptExecutor;
use crate::services::test_runs::{CompletedRun, TestRunService};

/// Receives the final result of a queued run.
pub type CompletionSender = oneshot::Sender<AppResult<CompletedRun>>;

/// One automated run waiting for a worker.
pub struct ExecutionJob {
    pub run_id: Uuid,
    pub script_path: String,
    pub completion: Option<CompletionSender>,
}

/// Producer side of the execution queue.
#[derive(Clone)]
pub struct ExecutionQueue {
    sender: mpsc::Sender<ExecutionJob>,
}

impl ExecutionQueue {
    /// Create a queue holding up to `capacity` waiting jobs.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ExecutionJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Enqueue a job, waiting for room when the queue is full.
    pub async fn submit(&self, job: ExecutionJob) -> AppResult<()> {
        let run_id = job.run_id;
        self.sender.send(job).await.map_err(|_| {
            AppError::RunnerInfrastructure(format!(
                "execution queue is closed, run {} cannot be scheduled",
                run_id
            ))
        })
    }
}

/// Start the dispatcher with at most `workers` concurrent executions.
///
/// Stops once every `ExecutionQueue` handle has been dropped and the queue is drained.
pub fn start_execution_workers(
    mut receiver: mpsc::Receiver<ExecutionJob>,
    service: Arc<TestRunService>,
    executor: Arc<dyn ScriptExecutor>,
    workers: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // Every permit must be re-acquirable in one `acquire_many` at shutdown
        let workers = workers.clamp(1, Semaphore::MAX_PERMITS.min(u32::MAX as usize));
        info!("Starting execution workers (concurrency: {})", workers);

        let permits = Arc::new(Semaphore::new(workers));

        while let Some(job) = receiver.recv().await {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };

            let service = service.clone();
            let executor = executor.clone();

            tokio::spawn(async move {
                let _permit = permit;
                let result = service
                    .execute_run(job.run_id, &job.script_path, executor.as_ref())
                    .await;

                if let Err(e) = &result {
                    error!(run_id = %job.run_id, "Execution task failed: {}", e);
                }
                if let Some(completion) = job.completion {
                    // The requester may have stopped waiting
                    let _ = completion.send(result);
                }
            });
        }

        // Wait for in-flight executions before reporting shutdown
        let all = u32::try_from(workers).unwrap_or(u32::MAX);
        match permits.acquire_many(all).await {
            Ok(_) => info!("Execution queue closed, workers stopped"),
            Err(e) => error!("Execution workers stopped without draining: {}", e),
        }
    })
}
