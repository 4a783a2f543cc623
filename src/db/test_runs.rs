//! Database operations for test runs.
//!
//! Terminal writes are conditional on the run still being `running`, so a
//! run is finished at most once no matter how many workers race for it.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::*;
use uuid::Uuid;

use crate::entity::test_run::{self, Entity as TestRunEntity};
use crate::error::AppResult;
use crate::models::{RunOutcome, RunStatus, TestRun};

use super::parse_column;

/// Immutable fields of a run plus its initial status.
#[derive(Debug, Clone)]
pub struct NewRunRecord {
    pub test_case_id: Uuid,
    pub automation_script_id: Option<Uuid>,
    pub executed_by: Uuid,
    pub status: RunStatus,
    pub notes: Option<String>,
}

const TERMINAL: [RunStatus; 4] = [
    RunStatus::Passed,
    RunStatus::Failed,
    RunStatus::Blocked,
    RunStatus::Skipped,
];

/// Insert a run.
///
/// `running` rows get `started_at`; terminal rows (manual runs) get `completed_at`.
pub async fn insert<C: ConnectionTrait>(db: &C, record: NewRunRecord) -> AppResult<TestRun> {
    let now = Utc::now();

    let model = test_run::ActiveModel {
        id: Set(Uuid::now_v7()),
        test_case_id: Set(record.test_case_id),
        automation_script_id: Set(record.automation_script_id),
        executed_by: Set(record.executed_by),
        status: Set(record.status.as_str().to_string()),
        duration_secs: Set(None),
        notes: Set(record.notes),
        screenshot_ref: Set(None),
        video_ref: Set(None),
        started_at: Set((record.status == RunStatus::Running).then_some(now)),
        completed_at: Set(record.status.is_terminal().then_some(now)),
        escalated_at: Set(None),
        escalation_attempts: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let inserted = model.insert(db).await?;
    model_to_run(inserted)
}

/// Find a run by ID.
pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<Option<TestRun>> {
    let result = TestRunEntity::find_by_id(id).one(db).await?;
    result.map(model_to_run).transpose()
}

/// Run history of a test case, newest first.
pub async fn list_by_test_case<C: ConnectionTrait>(
    db: &C,
    test_case_id: Uuid,
) -> AppResult<Vec<TestRun>> {
    let result = TestRunEntity::find()
        .filter(test_run::Column::TestCaseId.eq(test_case_id))
        .order_by_desc(test_run::Column::Id) // UUIDv7 is time-ordered
        .all(db)
        .await?;

    result.into_iter().map(model_to_run).collect()
}

/// Write the terminal outcome of a running run.
///
/// Returns false when the run is no longer `running` (already finished or
/// unknown); nothing is written in that case. `notes` is only overwritten
/// when the outcome carries some.
pub async fn finish_run<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    outcome: &RunOutcome,
) -> AppResult<bool> {
    let now = Utc::now();

    let mut update = TestRunEntity::update_many()
        .col_expr(test_run::Column::Status, Expr::value(outcome.status.as_str()))
        .col_expr(test_run::Column::DurationSecs, Expr::value(outcome.duration_secs))
        .col_expr(
            test_run::Column::ScreenshotRef,
            Expr::value(outcome.screenshot_ref.clone()),
        )
        .col_expr(test_run::Column::VideoRef, Expr::value(outcome.video_ref.clone()))
        .col_expr(test_run::Column::CompletedAt, Expr::value(now))
        .col_expr(test_run::Column::UpdatedAt, Expr::value(now));

    if let Some(notes) = &outcome.notes {
        update = update.col_expr(test_run::Column::Notes, Expr::value(notes.clone()));
    }

    let result = update
        .filter(test_run::Column::Id.eq(id))
        .filter(test_run::Column::Status.eq(RunStatus::Running.as_str()))
        .exec(db)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Record that the escalation for a run's terminal transition was applied.
///
/// Returns false if it had already been recorded.
pub async fn mark_escalated<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<bool> {
    let now = Utc::now();

    let result = TestRunEntity::update_many()
        .col_expr(test_run::Column::EscalatedAt, Expr::value(now))
        .col_expr(test_run::Column::UpdatedAt, Expr::value(now))
        .filter(test_run::Column::Id.eq(id))
        .filter(test_run::Column::EscalatedAt.is_null())
        .exec(db)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Count a failed escalation attempt. Returns the new attempt count, or
/// `None` when the run is unknown or already escalated.
pub async fn record_escalation_failure<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> AppResult<Option<i32>> {
    let result = TestRunEntity::update_many()
        .col_expr(
            test_run::Column::EscalationAttempts,
            Expr::col(test_run::Column::EscalationAttempts).add(1),
        )
        .col_expr(test_run::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(test_run::Column::Id.eq(id))
        .filter(test_run::Column::EscalatedAt.is_null())
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Ok(None);
    }
    Ok(find_by_id(db, id).await?.map(|run| run.escalation_attempts))
}

/// Runs still `running` that started before `started_before`.
pub async fn find_stale_running<C: ConnectionTrait>(
    db: &C,
    started_before: DateTime<Utc>,
) -> AppResult<Vec<TestRun>> {
    let result = TestRunEntity::find()
        .filter(test_run::Column::Status.eq(RunStatus::Running.as_str()))
        .filter(test_run::Column::StartedAt.lt(started_before))
        .order_by_asc(test_run::Column::Id)
        .all(db)
        .await?;

    result.into_iter().map(model_to_run).collect()
}

/// Terminal runs completed at or before `completed_before` whose escalation
/// has not been recorded and has failed fewer than `max_attempts` times.
///
/// Fewest attempts first, then oldest, so repeatedly failing rows never
/// crowd out fresh ones.
pub async fn find_unescalated_terminal<C: ConnectionTrait>(
    db: &C,
    completed_before: DateTime<Utc>,
    max_attempts: i32,
    limit: u64,
) -> AppResult<Vec<TestRun>> {
    let result = TestRunEntity::find()
        .filter(test_run::Column::Status.is_in(TERMINAL.map(|s| s.as_str())))
        .filter(test_run::Column::EscalatedAt.is_null())
        .filter(test_run::Column::EscalationAttempts.lt(max_attempts))
        .filter(test_run::Column::CompletedAt.lte(completed_before))
        .order_by_asc(test_run::Column::EscalationAttempts)
        .order_by_asc(test_run::Column::Id)
        .limit(limit)
        .all(db)
        .await?;

    result.into_iter().map(model_to_run).collect()
}

fn model_to_run(m: test_run::Model) -> AppResult<TestRun> {
    Ok(TestRun {
        id: m.id,
        status: parse_column(&m.status, "test_runs.status", RunStatus::parse)?,
        test_case_id: m.test_case_id,
        automation_script_id: m.automation_script_id,
        executed_by: m.executed_by,
        duration_secs: m.duration_secs,
        notes: m.notes,
        screenshot_ref: m.screenshot_ref,
        video_ref: m.video_ref,
        started_at: m.started_at,
        completed_at: m.completed_at,
        escalated_at: m.escalated_at,
        escalation_attempts: m.escalation_attempts,
        created_at: m.created_at,
    })
}
