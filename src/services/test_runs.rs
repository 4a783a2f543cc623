//! Test run lifecycle manager.
//!
//! Runs move `pending -> running -> {passed|failed|blocked|skipped}`.
//! Manual runs are inserted directly in their terminal status; automated
//! runs are inserted `running` and finished by an execution worker. Every
//! terminal transition is written once, together with the test case status
//! sync, and then handed to the escalation coordinator.

use tokio::sync::oneshot;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::{Action, Authorizer, ResourceKind};
use crate::db::test_runs::NewRunRecord;
use crate::db::{self, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::pipeline_event::TestRunCompletedPayload;
use crate::models::{
    Actor, CreateRunRequest, PipelineEvent, RunOutcome, RunStatus, RunTransition, TestRun,
};
use crate::services::escalation::{
    EscalationCoordinator, EscalationReport, StatusChange, sync_test_case_status,
};
use crate::services::event_broadcaster::EventBroadcaster;
use crate::services::execution_queue::{ExecutionJob, ExecutionQueue};
use crate::services::runner::ScriptExecutor;

/// A run in its terminal status together with the cascade it triggered.
#[derive(Debug)]
pub struct CompletedRun {
    pub run: TestRun,
    pub status_change: Option<StatusChange>,
    /// Secondary outcome; an error here never affects `run`.
    pub escalation: AppResult<EscalationReport>,
}

/// Result of `create_run`.
#[derive(Debug)]
pub struct CreatedRun {
    pub run: TestRun,
    /// Present when the run is already terminal.
    pub completed: Option<CompletedRun>,
    completion: Option<oneshot::Receiver<AppResult<CompletedRun>>>,
}

impl CreatedRun {
    fn finished(completed: CompletedRun) -> Self {
        Self {
            run: completed.run.clone(),
            completed: Some(completed),
            completion: None,
        }
    }

    /// Whether the run is still waiting for an execution worker.
    pub fn is_pending(&self) -> bool {
        self.completed.is_none()
    }

    /// Wait for the run to reach its terminal status.
    pub async fn wait(self) -> AppResult<CompletedRun> {
        if let Some(completed) = self.completed {
            return Ok(completed);
        }

        let run_id = self.run.id;
        let abandoned = || {
            AppError::RunnerInfrastructure(format!("execution of run {} was abandoned", run_id))
        };

        match self.completion {
            Some(receiver) => receiver.await.map_err(|_| abandoned())?,
            None => Err(abandoned()),
        }
    }
}

/// Creates runs and drives them to their single terminal write.
pub struct TestRunService {
    pool: DbPool,
    authorizer: Authorizer,
    coordinator: EscalationCoordinator,
    events: EventBroadcaster,
    queue: Option<ExecutionQueue>,
}

impl TestRunService {
    pub fn new(pool: DbPool, authorizer: Authorizer, events: EventBroadcaster) -> Self {
        Self {
            coordinator: EscalationCoordinator::new(pool.clone(), events.clone()),
            pool,
            authorizer,
            events,
            queue: None,
        }
    }

    /// Attach the queue automated runs are scheduled on.
    pub fn with_queue(mut self, queue: ExecutionQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn coordinator(&self) -> &EscalationCoordinator {
        &self.coordinator
    }

    /// Create a run for `actor`.
    ///
    /// Authorization is checked first, then the request is validated; nothing
    /// is written or executed unless both pass.
    pub async fn create_run(
        &self,
        actor: &Actor,
        request: CreateRunRequest,
    ) -> AppResult<CreatedRun> {
        self.authorizer.require(actor, ResourceKind::TestRun, Action::Create)?;

        let conn = self.pool.connection();

        if db::test_cases::find_by_id(conn, request.test_case_id)
            .await?
            .is_none()
        {
            return Err(AppError::validation(
                "test_case_id",
                format!("test case {} does not exist", request.test_case_id),
            ));
        }

        let Some(script_id) = request.automation_script_id else {
            let status = match request.status {
                Some(status) if status.is_terminal() => status,
                Some(status) => {
                    return Err(AppError::validation(
                        "status",
                        format!("manual runs must be recorded in a terminal status, got {}", status),
                    ));
                }
                None => {
                    return Err(AppError::validation(
                        "status",
                        "manual runs require a terminal status",
                    ));
                }
            };
            let completed = self.create_manual_run(actor, request, status).await?;
            return Ok(CreatedRun::finished(completed));
        };

        if request.status.is_some() {
            return Err(AppError::validation(
                "status",
                "automated runs get their status from the test tool",
            ));
        }

        let script = db::automation_scripts::find_by_id(conn, script_id)
            .await?
            .ok_or_else(|| {
                AppError::validation(
                    "automation_script_id",
                    format!("automation script {} does not exist", script_id),
                )
            })?;
        if script.test_case_id != request.test_case_id {
            return Err(AppError::validation(
                "automation_script_id",
                "automation script belongs to a different test case",
            ));
        }
        if !script.is_executable() {
            return Err(AppError::validation(
                "automation_script_id",
                format!("automation script is {}, only active scripts can run", script.status),
            ));
        }

        let Some(queue) = &self.queue else {
            return Err(AppError::RunnerInfrastructure(
                "no execution workers are configured".to_string(),
            ));
        };

        let run = db::test_runs::insert(
            conn,
            NewRunRecord {
                test_case_id: request.test_case_id,
                automation_script_id: Some(script.id),
                executed_by: actor.id,
                status: RunStatus::Running,
                notes: request.notes,
            },
        )
        .await?;

        info!(
            run_id = %run.id,
            test_case_id = %run.test_case_id,
            script_id = %script.id,
            actor_id = %actor.id,
            "Automated run created"
        );

        let (sender, receiver) = oneshot::channel();
        let job = ExecutionJob {
            run_id: run.id,
            script_path: script.script_path.clone(),
            completion: Some(sender),
        };

        if let Err(e) = queue.submit(job).await {
            // Fail closed: the run must not stay in `running`
            error!(target: "infra", run_id = %run.id, "Could not schedule run: {}", e);
            let outcome = RunOutcome::infrastructure_failure(&e.to_string(), Some(0));
            let completed = self.record_outcome(run.id, outcome).await?;
            return Ok(CreatedRun::finished(completed));
        }

        Ok(CreatedRun {
            run,
            completed: None,
            completion: Some(receiver),
        })
    }

    async fn create_manual_run(
        &self,
        actor: &Actor,
        request: CreateRunRequest,
        status: RunStatus,
    ) -> AppResult<CompletedRun> {
        check_transition(RunStatus::Pending, status)?;

        let txn = self.pool.begin().await?;
        let run = db::test_runs::insert(
            &txn,
            NewRunRecord {
                test_case_id: request.test_case_id,
                automation_script_id: None,
                executed_by: actor.id,
                status,
                notes: request.notes,
            },
        )
        .await?;

        let transition = RunTransition {
            run_id: run.id,
            from: RunStatus::Pending,
            to: status,
        };
        let status_change = sync_test_case_status(&txn, &run, transition).await?;
        txn.commit().await?;

        info!(
            run_id = %run.id,
            test_case_id = %run.test_case_id,
            actor_id = %actor.id,
            status = %status,
            "Manual run recorded"
        );

        Ok(self.after_terminal(run, transition, status_change).await)
    }

    /// Execute an automated run and record its outcome.
    ///
    /// A runner failure closes the run as `failed` with the infrastructure
    /// marker; it is never left `running`.
    pub async fn execute_run(
        &self,
        run_id: Uuid,
        script_path: &str,
        executor: &dyn ScriptExecutor,
    ) -> AppResult<CompletedRun> {
        let run = db::test_runs::find_by_id(self.pool.connection(), run_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Test run {}", run_id)))?;
        if run.status != RunStatus::Running {
            return Err(AppError::Conflict(format!(
                "Test run {} is {}, not running",
                run_id, run.status
            )));
        }

        let mut outcome = match executor.execute(script_path).await {
            Ok(result) => RunOutcome {
                status: result.status,
                duration_secs: Some(result.duration_secs),
                notes: (result.status == RunStatus::Failed && !result.output.trim().is_empty())
                    .then(|| result.output.trim_end().to_string()),
                screenshot_ref: result.screenshot_ref,
                video_ref: result.video_ref,
            },
            Err(e) => {
                error!(
                    target: "infra",
                    run_id = %run_id,
                    script = %script_path,
                    "Test tool unusable, closing run as failed: {}",
                    e
                );
                RunOutcome::infrastructure_failure(&e.to_string(), e.elapsed_secs())
            }
        };

        if let (Some(new), Some(existing)) = (outcome.notes.as_mut(), run.notes.as_deref()) {
            new.push_str("\n\n");
            new.push_str(existing);
        }

        self.record_outcome(run_id, outcome).await
    }

    /// Write the terminal outcome of a running run and apply its cascade.
    ///
    /// A second terminal write for the same run is a `Conflict`.
    pub async fn record_outcome(
        &self,
        run_id: Uuid,
        outcome: RunOutcome,
    ) -> AppResult<CompletedRun> {
        check_transition(RunStatus::Running, outcome.status)?;

        let txn = self.pool.begin().await?;

        if !db::test_runs::finish_run(&txn, run_id, &outcome).await? {
            let current = db::test_runs::find_by_id(&txn, run_id).await?;
            return Err(match current {
                Some(run) => AppError::Conflict(format!(
                    "Test run {} is already {}",
                    run_id, run.status
                )),
                None => AppError::NotFound(format!("Test run {}", run_id)),
            });
        }

        let run = db::test_runs::find_by_id(&txn, run_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Test run {}", run_id)))?;

        let transition = RunTransition {
            run_id,
            from: RunStatus::Running,
            to: outcome.status,
        };
        let status_change = sync_test_case_status(&txn, &run, transition).await?;
        txn.commit().await?;

        info!(
            run_id = %run.id,
            test_case_id = %run.test_case_id,
            status = %run.status,
            duration_secs = ?run.duration_secs,
            "Run finished"
        );

        Ok(self.after_terminal(run, transition, status_change).await)
    }

    /// Get a run.
    pub async fn get_run(&self, actor: &Actor, run_id: Uuid) -> AppResult<TestRun> {
        self.authorizer.require(actor, ResourceKind::TestRun, Action::Read)?;

        db::test_runs::find_by_id(self.pool.connection(), run_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Test run {}", run_id)))
    }

    /// Run history of a test case, newest first.
    pub async fn list_runs_for_case(
        &self,
        actor: &Actor,
        test_case_id: Uuid,
    ) -> AppResult<Vec<TestRun>> {
        self.authorizer.require(actor, ResourceKind::TestRun, Action::Read)?;

        let conn = self.pool.connection();
        if db::test_cases::find_by_id(conn, test_case_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Test case {}", test_case_id)));
        }

        db::test_runs::list_by_test_case(conn, test_case_id).await
    }

    /// Publish the committed transition and run the escalation step.
    async fn after_terminal(
        &self,
        run: TestRun,
        transition: RunTransition,
        status_change: Option<StatusChange>,
    ) -> CompletedRun {
        self.events
            .publish(PipelineEvent::TestRunCompleted(TestRunCompletedPayload {
                run_id: run.id,
                test_case_id: run.test_case_id,
                status: run.status,
                automated: run.is_automated(),
                duration_secs: run.duration_secs,
            }));
        if let Some(change) = &status_change {
            self.coordinator.publish_status_change(change);
        }

        let escalation = self.coordinator.escalate(transition).await;

        // Pick up escalated_at when the cascade went through
        let run = match &escalation {
            Ok(_) => db::test_runs::find_by_id(self.pool.connection(), run.id)
                .await
                .ok()
                .flatten()
                .unwrap_or(run),
            Err(_) => run,
        };

        CompletedRun {
            run,
            status_change,
            escalation,
        }
    }
}

/// Accept only a state-machine edge that ends in a terminal status.
fn check_transition(from: RunStatus, to: RunStatus) -> AppResult<()> {
    if from.can_transition_to(to) && to.is_terminal() {
        Ok(())
    } else {
        Err(AppError::InvalidInput(format!(
            "Test run cannot move from {} to {}",
            from, to
        )))
    }
}
