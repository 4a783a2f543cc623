//! Escalation idempotence and secondary failures.

use std::time::Duration;

use uuid::Uuid;

use qa_pipeline::db::{self, test_runs::NewRunRecord};
use qa_pipeline::error::AppError;
use qa_pipeline::models::{
    NewTestCase, Priority, RunOutcome, RunStatus, RunTransition, ScriptStatus,
};
use qa_pipeline::models::ticket::MAX_TICKET_TITLE_LEN;
use qa_pipeline::services::escalation::TICKET_TITLE_PREFIX;
use qa_pipeline::services::recovery;
use qa_pipeline::services::test_cases::MAX_TEST_CASE_TITLE_LEN;

use super::test_helpers::*;

#[tokio::test]
async fn test_redelivered_transition_creates_no_second_ticket() {
    let executor = ScriptedExecutor::new();
    executor.script("orders.cy.js", Behavior::Fail("timeout waiting for #orders"));
    let env = setup(executor).await;

    let case = create_case(&env, "Orders list").await;
    let script = create_script(&env, case.id, "orders.cy.js", ScriptStatus::Active).await;

    let completed = env
        .runs
        .create_run(&env.tester, automated(case.id, script.id))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    let first = completed.escalation.unwrap();
    assert!(first.ticket.is_some());

    let transition = RunTransition {
        run_id: completed.run.id,
        from: RunStatus::Running,
        to: RunStatus::Failed,
    };
    for _ in 0..2 {
        let again = env.runs.coordinator().escalate(transition).await.unwrap();
        assert!(again.already_applied);
        assert!(again.ticket.is_none());
    }

    assert_eq!(ticket_count(&env, case.id).await, 1);
    let notifications = db::notifications::list_for_recipient(env.pool.connection(), env.tester.id)
        .await
        .unwrap();
    assert_eq!(notifications.len(), 1);
}

#[tokio::test]
async fn test_interrupted_cascade_is_applied_once_on_redelivery() {
    let env = setup_without_workers().await;
    let case = create_case(&env, "Invoices").await;
    let script = create_script(&env, case.id, "invoices.cy.js", ScriptStatus::Active).await;

    // Terminal write committed, escalation never ran
    let conn = env.pool.connection();
    let run = db::test_runs::insert(
        conn,
        NewRunRecord {
            test_case_id: case.id,
            automation_script_id: Some(script.id),
            executed_by: env.tester.id,
            status: RunStatus::Running,
            notes: None,
        },
    )
    .await
    .unwrap();
    let outcome = RunOutcome {
        status: RunStatus::Failed,
        duration_secs: Some(3),
        notes: Some("expected 3 invoices".to_string()),
        screenshot_ref: None,
        video_ref: None,
    };
    assert!(db::test_runs::finish_run(conn, run.id, &outcome).await.unwrap());
    assert_eq!(ticket_count(&env, case.id).await, 0);

    let (redelivered, failed) = recovery::redeliver_escalations(&env.runs, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!((redelivered, failed), (1, 0));

    let ticket = db::tickets::find_by_test_run(env.pool.connection(), run.id)
        .await
        .unwrap()
        .expect("ticket created on redelivery");
    assert!(ticket.description.contains("expected 3 invoices"));

    let (redelivered, failed) = recovery::redeliver_escalations(&env.runs, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!((redelivered, failed), (0, 0));
    assert_eq!(ticket_count(&env, case.id).await, 1);
}

#[tokio::test]
async fn test_long_case_title_still_gets_one_ticket() {
    let executor = ScriptedExecutor::new();
    executor.script("long.cy.js", Behavior::Fail("boom"));
    let env = setup(executor).await;

    // Longest accepted case title; the derived ticket title must be shortened
    let case = env
        .cases
        .create_test_case(
            &env.manager,
            NewTestCase {
                title: "x".repeat(MAX_TEST_CASE_TITLE_LEN),
                steps: Vec::new(),
                expected_result: None,
                priority: Priority::Low,
                assigned_to: None,
            },
        )
        .await
        .unwrap();
    let script = create_script(&env, case.id, "long.cy.js", ScriptStatus::Active).await;

    let completed = env
        .runs
        .create_run(&env.tester, automated(case.id, script.id))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    let ticket = completed.escalation.unwrap().ticket.expect("ticket created");
    assert_eq!(ticket.title.chars().count(), MAX_TICKET_TITLE_LEN);
    assert!(ticket.title.starts_with(TICKET_TITLE_PREFIX));
    assert!(ticket.title.ends_with('\u{2026}'));
    assert!(completed.run.escalated_at.is_some());
    assert_eq!(ticket_count(&env, case.id).await, 1);

    let (redelivered, failed) = recovery::redeliver_escalations(&env.runs, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!((redelivered, failed), (0, 0));
}

#[tokio::test]
async fn test_failed_escalation_keeps_run_status_and_counts_attempts() {
    let env = setup_without_workers().await;
    let case = create_case(&env, "Reports").await;
    let script = create_script(&env, case.id, "reports.cy.js", ScriptStatus::Active).await;
    let run = insert_unescalated_failure(&env, case.id, script.id).await;

    // A transition that never ends in a terminal status cannot be escalated
    let bogus = RunTransition {
        run_id: run.id,
        from: RunStatus::Pending,
        to: RunStatus::Running,
    };
    for attempt in 1..=2 {
        let err = env.runs.coordinator().escalate(bogus).await.unwrap_err();
        assert!(matches!(err, AppError::Escalation(_)));

        let stored = env.runs.get_run(&env.tester, run.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert!(stored.escalated_at.is_none());
        assert_eq!(stored.escalation_attempts, attempt);
    }
    assert_eq!(ticket_count(&env, case.id).await, 0);

    let err = env
        .runs
        .coordinator()
        .escalate(RunTransition {
            run_id: Uuid::now_v7(),
            from: RunStatus::Running,
            to: RunStatus::Failed,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Escalation(_)));

    // The genuine transition still goes through afterwards
    let (redelivered, failed) = recovery::redeliver_escalations(&env.runs, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!((redelivered, failed), (1, 0));
    assert_eq!(ticket_count(&env, case.id).await, 1);
}

#[tokio::test]
async fn test_manual_failure_is_never_escalated_on_redelivery() {
    let env = setup_without_workers().await;
    let case = create_case(&env, "Manual only").await;

    let run = db::test_runs::insert(
        env.pool.connection(),
        NewRunRecord {
            test_case_id: case.id,
            automation_script_id: None,
            executed_by: env.tester.id,
            status: RunStatus::Failed,
            notes: None,
        },
    )
    .await
    .unwrap();

    let report = env
        .runs
        .coordinator()
        .escalate(RunTransition {
            run_id: run.id,
            from: RunStatus::Pending,
            to: RunStatus::Failed,
        })
        .await
        .unwrap();

    assert!(report.ticket.is_none());
    assert!(!report.already_applied);
    assert_eq!(ticket_count(&env, case.id).await, 0);
}
