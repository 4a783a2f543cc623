//! Recovery sweep for work interrupted by a crash or restart.
//!
//! Runs left `running` past the runner timeout plus a grace period are closed
//! as infrastructure failures. Terminal runs whose escalation never completed
//! are re-delivered to the coordinator, which makes cascade delivery
//! at-least-once. Re-delivery waits until a run has been terminal for the
//! settle window, so it does not race the escalation its own worker is
//! about to apply, and skips runs that used up their escalation attempts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::{RunOutcome, RunStatus, RunTransition};
use crate::services::escalation::MAX_ESCALATION_ATTEMPTS;
use crate::services::test_runs::TestRunService;

/// Re-deliveries per sweep.
pub const REDELIVERY_BATCH_SIZE: u64 = 100;

/// Configuration for the recovery service.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Age after which a `running` run is considered abandoned
    pub stale_after: Duration,
    /// How long a run stays terminal before its escalation is re-delivered
    pub settle_after: Duration,
    /// How often to sweep
    pub interval: Duration,
}

impl RecoveryConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stale_after: config.runner.timeout + config.execution.stale_run_grace,
            settle_after: config.execution.stale_run_grace,
            interval: config.execution.recovery_interval,
        }
    }
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoverySummary {
    pub closed_runs: usize,
    pub redelivered: usize,
    pub failed_redeliveries: usize,
}

/// Close runs still `running` after `stale_after`.
pub async fn close_stale_runs(service: &TestRunService, stale_after: Duration) -> AppResult<usize> {
    let age = chrono::Duration::from_std(stale_after)
        .map_err(|e| AppError::InvalidInput(format!("Stale run age out of range: {}", e)))?;
    let cutoff = Utc::now() - age;

    let stale = db::test_runs::find_stale_running(service.pool().connection(), cutoff).await?;
    let mut closed = 0;

    for run in stale {
        warn!(
            target: "infra",
            run_id = %run.id,
            started_at = ?run.started_at,
            "Closing abandoned run"
        );
        let outcome = RunOutcome::infrastructure_failure(
            &format!(
                "run was still running after {}s; its execution was lost",
                stale_after.as_secs()
            ),
            None,
        );

        match service.record_outcome(run.id, outcome).await {
            Ok(_) => closed += 1,
            // Finished by its worker in the meantime
            Err(AppError::Conflict(_)) => {}
            Err(e) => error!(run_id = %run.id, "Failed to close abandoned run: {}", e),
        }
    }

    Ok(closed)
}

/// Re-deliver terminal transitions whose escalation was not recorded and
/// that finished at least `settle_after` ago.
///
/// Returns (re-delivered, failed).
pub async fn redeliver_escalations(
    service: &TestRunService,
    settle_after: Duration,
) -> AppResult<(usize, usize)> {
    let age = chrono::Duration::from_std(settle_after)
        .map_err(|e| AppError::InvalidInput(format!("Settle window out of range: {}", e)))?;

    let pending = db::test_runs::find_unescalated_terminal(
        service.pool().connection(),
        Utc::now() - age,
        MAX_ESCALATION_ATTEMPTS,
        REDELIVERY_BATCH_SIZE,
    )
    .await?;

    let mut redelivered = 0;
    let mut failed = 0;

    for run in pending {
        let transition = RunTransition {
            run_id: run.id,
            from: if run.is_automated() {
                RunStatus::Running
            } else {
                RunStatus::Pending
            },
            to: run.status,
        };

        match service.coordinator().escalate(transition).await {
            Ok(_) => redelivered += 1,
            Err(_) => failed += 1,
        }
    }

    Ok((redelivered, failed))
}

/// Run a single recovery cycle.
pub async fn run_recovery(
    service: &TestRunService,
    config: &RecoveryConfig,
) -> AppResult<RecoverySummary> {
    let closed_runs = close_stale_runs(service, config.stale_after).await?;
    let (redelivered, failed_redeliveries) = redeliver_escalations(service, config.settle_after).await?;

    let summary = RecoverySummary {
        closed_runs,
        redelivered,
        failed_redeliveries,
    };
    if summary != RecoverySummary::default() {
        info!(
            closed_runs,
            redelivered, failed_redeliveries, "Recovery sweep completed"
        );
    }

    Ok(summary)
}

/// Start the recovery background task.
pub fn start_recovery_task(service: Arc<TestRunService>, config: RecoveryConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting recovery service (stale after: {} seconds, settle after: {} seconds, interval: {} seconds)",
            config.stale_after.as_secs(),
            config.settle_after.as_secs(),
            config.interval.as_secs()
        );

        let mut ticker = interval(config.interval);

        loop {
            ticker.tick().await;

            if let Err(e) = run_recovery(&service, &config).await {
                error!("Recovery task error: {}", e);
            }
        }
    })
}
