//! Recovery of runs and cascades interrupted by a restart.

use std::time::Duration;

use qa_pipeline::db::{self, test_runs::NewRunRecord};
use qa_pipeline::models::{INFRASTRUCTURE_ERROR_MARKER, RunStatus, ScriptStatus, TestCaseStatus};
use qa_pipeline::services::RecoverySummary;
use qa_pipeline::services::escalation::MAX_ESCALATION_ATTEMPTS;
use qa_pipeline::services::recovery::{self, REDELIVERY_BATCH_SIZE, RecoveryConfig};

use super::test_helpers::*;

#[tokio::test]
async fn test_abandoned_run_is_closed_as_infrastructure_failure() {
    let env = setup_without_workers().await;
    let case = create_case(&env, "Abandoned").await;
    let script = create_script(&env, case.id, "lost.cy.js", ScriptStatus::Active).await;

    let created = env
        .runs
        .create_run(&env.tester, automated(case.id, script.id))
        .await
        .unwrap();
    assert!(created.is_pending());
    assert_eq!(created.run.status, RunStatus::Running);

    // started_at must fall strictly before the cutoff
    tokio::time::sleep(Duration::from_millis(20)).await;
    let closed = recovery::close_stale_runs(&env.runs, Duration::ZERO).await.unwrap();
    assert_eq!(closed, 1);

    let run = env.runs.get_run(&env.tester, created.run.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.has_infrastructure_error());
    assert!(run.notes.as_deref().unwrap().starts_with(INFRASTRUCTURE_ERROR_MARKER));
    assert!(run.escalated_at.is_some());

    assert_eq!(case_status(&env, case.id).await, TestCaseStatus::Failed);
    assert_eq!(ticket_count(&env, case.id).await, 1);

    // Nothing left to close
    let closed = recovery::close_stale_runs(&env.runs, Duration::ZERO).await.unwrap();
    assert_eq!(closed, 0);
}

#[tokio::test]
async fn test_recent_running_runs_are_left_alone() {
    let env = setup_without_workers().await;
    let case = create_case(&env, "In flight").await;
    let script = create_script(&env, case.id, "slow.cy.js", ScriptStatus::Active).await;

    let created = env
        .runs
        .create_run(&env.tester, automated(case.id, script.id))
        .await
        .unwrap();

    let closed = recovery::close_stale_runs(&env.runs, Duration::from_secs(3600))
        .await
        .unwrap();
    assert_eq!(closed, 0);

    let run = env.runs.get_run(&env.tester, created.run.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(case_status(&env, case.id).await, TestCaseStatus::Draft);
}

#[tokio::test]
async fn test_recovery_cycle_reports_its_work() {
    let env = setup_without_workers().await;
    let case = create_case(&env, "Sweep").await;
    let script = create_script(&env, case.id, "sweep.cy.js", ScriptStatus::Active).await;

    env.runs
        .create_run(&env.tester, automated(case.id, script.id))
        .await
        .unwrap();

    // A passed manual run whose cascade never completed
    db::test_runs::insert(
        env.pool.connection(),
        NewRunRecord {
            test_case_id: case.id,
            automation_script_id: None,
            executed_by: env.tester.id,
            status: RunStatus::Passed,
            notes: None,
        },
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    let config = RecoveryConfig {
        stale_after: Duration::ZERO,
        settle_after: Duration::ZERO,
        interval: Duration::from_secs(60),
    };

    let summary = recovery::run_recovery(&env.runs, &config).await.unwrap();
    assert_eq!(
        summary,
        RecoverySummary {
            closed_runs: 1,
            redelivered: 1,
            failed_redeliveries: 0,
        }
    );
    assert_eq!(ticket_count(&env, case.id).await, 1);

    let summary = recovery::run_recovery(&env.runs, &config).await.unwrap();
    assert_eq!(summary, RecoverySummary::default());
}

#[tokio::test]
async fn test_recently_finished_runs_wait_for_settle_window() {
    let env = setup_without_workers().await;
    let case = create_case(&env, "Settling").await;
    let script = create_script(&env, case.id, "settle.cy.js", ScriptStatus::Active).await;
    insert_unescalated_failure(&env, case.id, script.id).await;

    // Its own worker may still be escalating it
    let (redelivered, failed) =
        recovery::redeliver_escalations(&env.runs, Duration::from_secs(3600))
            .await
            .unwrap();
    assert_eq!((redelivered, failed), (0, 0));
    assert_eq!(ticket_count(&env, case.id).await, 0);

    let (redelivered, failed) = recovery::redeliver_escalations(&env.runs, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!((redelivered, failed), (1, 0));
    assert_eq!(ticket_count(&env, case.id).await, 1);
}

#[tokio::test]
async fn test_exhausted_escalations_do_not_block_newer_runs() {
    let env = setup_without_workers().await;
    let case = create_case(&env, "Poisoned").await;
    let script = create_script(&env, case.id, "poisoned.cy.js", ScriptStatus::Active).await;

    let conn = env.pool.connection();
    for _ in 0..=REDELIVERY_BATCH_SIZE {
        let run = insert_unescalated_failure(&env, case.id, script.id).await;
        for _ in 0..MAX_ESCALATION_ATTEMPTS {
            db::test_runs::record_escalation_failure(conn, run.id)
                .await
                .unwrap();
        }
    }
    let fresh = insert_unescalated_failure(&env, case.id, script.id).await;

    let (redelivered, failed) = recovery::redeliver_escalations(&env.runs, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!((redelivered, failed), (1, 0));

    let ticket = db::tickets::find_by_test_run(conn, fresh.id).await.unwrap();
    assert!(ticket.is_some());
    assert_eq!(ticket_count(&env, case.id).await, 1);
}

#[tokio::test]
async fn test_retried_escalations_queue_behind_fresh_ones() {
    let env = setup_without_workers().await;
    let case = create_case(&env, "Backlog").await;
    let script = create_script(&env, case.id, "backlog.cy.js", ScriptStatus::Active).await;

    let conn = env.pool.connection();
    for _ in 0..=REDELIVERY_BATCH_SIZE {
        let run = insert_unescalated_failure(&env, case.id, script.id).await;
        let attempts = db::test_runs::record_escalation_failure(conn, run.id)
            .await
            .unwrap();
        assert_eq!(attempts, Some(1));
    }
    let fresh = insert_unescalated_failure(&env, case.id, script.id).await;

    let (redelivered, failed) = recovery::redeliver_escalations(&env.runs, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!((redelivered, failed), (REDELIVERY_BATCH_SIZE as usize, 0));
    let fresh = db::test_runs::find_by_id(conn, fresh.id).await.unwrap().unwrap();
    assert!(fresh.escalated_at.is_some());

    let (redelivered, failed) = recovery::redeliver_escalations(&env.runs, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!((redelivered, failed), (2, 0));
}
