//! Automated runs: execution, fail-closed handling and the single terminal write.

use std::sync::Arc;
use std::time::Duration;

use qa_pipeline::config::RunnerConfig;
use qa_pipeline::error::AppError;
use qa_pipeline::models::{
    INFRASTRUCTURE_ERROR_MARKER, PipelineEvent, Priority, RunOutcome, RunStatus, ScriptStatus,
    Severity, TestCaseStatus,
};
use qa_pipeline::services::{
    ExecutionJob, ExecutionQueue, ProcessRunner, start_execution_workers,
};
use tokio::sync::oneshot;

use super::test_helpers::*;

/// Scenario A: a failing script fails the case and opens exactly one ticket.
#[tokio::test]
async fn test_failed_automated_run_escalates_to_one_ticket() {
    let executor = ScriptedExecutor::new();
    executor.script("login.cy.js", Behavior::Fail("AssertionError: expected 200"));
    let env = setup(executor.clone()).await;
    let mut events = env.events.subscribe();

    let case = create_case(&env, "Login succeeds").await;
    assert_eq!(case.status, TestCaseStatus::Draft);
    let script = create_script(&env, case.id, "login.cy.js", ScriptStatus::Active).await;

    let created = env
        .runs
        .create_run(&env.tester, automated(case.id, script.id))
        .await
        .unwrap();
    assert!(created.is_pending());
    assert_eq!(created.run.status, RunStatus::Running);

    let completed = created.wait().await.unwrap();
    assert_eq!(completed.run.status, RunStatus::Failed);
    assert_eq!(completed.run.duration_secs, Some(2));
    assert_eq!(
        completed.run.screenshot_ref.as_deref(),
        Some("screenshots/login.cy.js/failure.png")
    );
    assert!(
        completed
            .run
            .notes
            .as_deref()
            .is_some_and(|n| n.contains("AssertionError"))
    );
    assert!(!completed.run.has_infrastructure_error());
    assert!(completed.run.escalated_at.is_some());

    assert_eq!(case_status(&env, case.id).await, TestCaseStatus::Failed);

    let report = completed.escalation.unwrap();
    let ticket = report.ticket.expect("ticket opened");
    assert_eq!(ticket.priority, Priority::High);
    assert_eq!(ticket.severity, Severity::Major);
    assert_eq!(ticket.test_case_id, Some(case.id));
    assert_eq!(ticket.test_run_id, Some(completed.run.id));
    assert_eq!(ticket.created_by, env.tester.id);
    assert!(ticket.title.contains("Login succeeds"));
    assert_eq!(ticket_count(&env, case.id).await, 1);

    let notification = report.notification.expect("owner notified");
    assert_eq!(notification.recipient_id, env.tester.id);
    assert_eq!(notification.notifiable.id, ticket.id);

    let kinds: Vec<_> = drain(&mut events)
        .into_iter()
        .map(|m| match m.event {
            PipelineEvent::TestRunCompleted(_) => "run_completed",
            PipelineEvent::TestCaseStatusChanged(_) => "case_status_changed",
            PipelineEvent::TicketCreated(_) => "ticket_created",
            PipelineEvent::NotificationCreated(_) => "notification_created",
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "run_completed",
            "case_status_changed",
            "ticket_created",
            "notification_created"
        ]
    );

    assert_eq!(executor.calls(), vec!["login.cy.js".to_string()]);
}

/// Scenario B: a passing script passes the case and opens no ticket.
#[tokio::test]
async fn test_passed_automated_run_opens_no_ticket() {
    let executor = ScriptedExecutor::new();
    let env = setup(executor.clone()).await;

    let case = create_case(&env, "Logout works").await;
    let script = create_script(&env, case.id, "logout.cy.js", ScriptStatus::Active).await;

    let completed = env
        .runs
        .create_run(&env.tester, automated(case.id, script.id))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(completed.run.status, RunStatus::Passed);
    assert_eq!(completed.run.video_ref.as_deref(), Some("videos/logout.cy.js.mp4"));
    assert_eq!(case_status(&env, case.id).await, TestCaseStatus::Passed);
    assert!(completed.escalation.unwrap().ticket.is_none());
    assert_eq!(ticket_count(&env, case.id).await, 0);
}

/// Scenario E: the test tool cannot be started at all.
#[tokio::test]
async fn test_missing_test_tool_fails_closed_with_marker() {
    let runner = ProcessRunner::new(&RunnerConfig {
        program: "/nonexistent/bin/cypress".to_string(),
        args: vec!["run".to_string(), "--spec".to_string()],
        working_dir: None,
        artifacts_dir: std::env::temp_dir(),
        timeout: Duration::from_secs(5),
    });
    let env = setup(Arc::new(runner)).await;

    let case = create_case(&env, "Checkout").await;
    let script = create_script(&env, case.id, "checkout.cy.js", ScriptStatus::Active).await;

    let completed = env
        .runs
        .create_run(&env.tester, automated(case.id, script.id))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(completed.run.status, RunStatus::Failed);
    assert!(completed.run.has_infrastructure_error());
    let notes = completed.run.notes.as_deref().unwrap();
    assert!(notes.starts_with(INFRASTRUCTURE_ERROR_MARKER));
    assert!(notes.contains("failed to start test tool"));
    assert!(completed.run.completed_at.is_some());

    // One failure, one ticket
    assert_eq!(ticket_count(&env, case.id).await, 1);
    assert_eq!(case_status(&env, case.id).await, TestCaseStatus::Failed);
}

#[tokio::test]
async fn test_timeout_is_treated_as_infrastructure_failure() {
    let executor = ScriptedExecutor::new();
    executor.script("slow.cy.js", Behavior::Timeout);
    let env = setup(executor).await;

    let case = create_case(&env, "Report export").await;
    let script = create_script(&env, case.id, "slow.cy.js", ScriptStatus::Active).await;

    let completed = env
        .runs
        .create_run(&env.tester, automated(case.id, script.id))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(completed.run.status, RunStatus::Failed);
    assert!(completed.run.has_infrastructure_error());
    assert_eq!(completed.run.duration_secs, Some(900));
}

#[tokio::test]
async fn test_spawn_failure_keeps_caller_notes() {
    let executor = ScriptedExecutor::new();
    executor.script("search.cy.js", Behavior::SpawnFailure);
    let env = setup(executor).await;

    let case = create_case(&env, "Search").await;
    let script = create_script(&env, case.id, "search.cy.js", ScriptStatus::Active).await;

    let mut request = automated(case.id, script.id);
    request.notes = Some("nightly".to_string());
    let completed = env
        .runs
        .create_run(&env.tester, request)
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    let notes = completed.run.notes.unwrap();
    assert!(notes.starts_with(INFRASTRUCTURE_ERROR_MARKER));
    assert!(notes.ends_with("nightly"));
}

#[tokio::test]
async fn test_second_terminal_write_is_a_conflict() {
    let executor = ScriptedExecutor::new();
    executor.script("cart.cy.js", Behavior::Fail("boom"));
    let env = setup(executor.clone()).await;

    let case = create_case(&env, "Cart").await;
    let script = create_script(&env, case.id, "cart.cy.js", ScriptStatus::Active).await;

    let completed = env
        .runs
        .create_run(&env.tester, automated(case.id, script.id))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    let run_id = completed.run.id;

    let overwrite = RunOutcome {
        status: RunStatus::Passed,
        duration_secs: Some(1),
        notes: None,
        screenshot_ref: None,
        video_ref: None,
    };
    let err = env.runs.record_outcome(run_id, overwrite).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Re-executing a finished run is refused before the tool is invoked
    let err = env
        .runs
        .execute_run(run_id, "cart.cy.js", executor.as_ref())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(executor.calls().len(), 1);

    let run = env.runs.get_run(&env.tester, run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(case_status(&env, case.id).await, TestCaseStatus::Failed);
    assert_eq!(ticket_count(&env, case.id).await, 1);
}

#[tokio::test]
async fn test_latest_outcome_drives_case_status() {
    let executor = ScriptedExecutor::new();
    let env = setup(executor.clone()).await;

    let case = create_case(&env, "Profile").await;
    let script = create_script(&env, case.id, "profile.cy.js", ScriptStatus::Active).await;

    executor.script("profile.cy.js", Behavior::Fail("flaky"));
    env.runs
        .create_run(&env.tester, automated(case.id, script.id))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(case_status(&env, case.id).await, TestCaseStatus::Failed);

    executor.script("profile.cy.js", Behavior::Pass);
    let completed = env
        .runs
        .create_run(&env.tester, automated(case.id, script.id))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(case_status(&env, case.id).await, TestCaseStatus::Passed);

    let change = completed.status_change.unwrap();
    assert_eq!(change.previous, TestCaseStatus::Failed);
    assert_eq!(change.current, TestCaseStatus::Passed);

    let history = env
        .runs
        .list_runs_for_case(&env.developer, case.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, completed.run.id);
}

#[tokio::test]
async fn test_concurrent_runs_each_execute_once() {
    let executor = ScriptedExecutor::new();
    let env = setup(executor.clone()).await;

    let case = create_case(&env, "Parallel").await;
    let script = create_script(&env, case.id, "parallel.cy.js", ScriptStatus::Active).await;

    let mut pending = Vec::new();
    for _ in 0..5 {
        pending.push(
            env.runs
                .create_run(&env.tester, automated(case.id, script.id))
                .await
                .unwrap(),
        );
    }
    for created in pending {
        let completed = created.wait().await.unwrap();
        assert_eq!(completed.run.status, RunStatus::Passed);
    }

    assert_eq!(executor.calls().len(), 5);
}

#[tokio::test]
async fn test_non_terminal_outcome_is_rejected() {
    let env = setup_without_workers().await;
    let case = create_case(&env, "Guarded").await;
    let script = create_script(&env, case.id, "guarded.cy.js", ScriptStatus::Active).await;

    let created = env
        .runs
        .create_run(&env.tester, automated(case.id, script.id))
        .await
        .unwrap();

    for status in [RunStatus::Pending, RunStatus::Running] {
        let outcome = RunOutcome {
            status,
            duration_secs: None,
            notes: None,
            screenshot_ref: None,
            video_ref: None,
        };
        let err = env.runs.record_outcome(created.run.id, outcome).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    let run = env.runs.get_run(&env.tester, created.run.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Running);
    assert!(run.completed_at.is_none());
}

#[tokio::test]
async fn test_oversized_worker_pool_runs_and_drains() {
    let env = setup_without_workers().await;
    let case = create_case(&env, "Workers").await;
    let script = create_script(&env, case.id, "workers.cy.js", ScriptStatus::Active).await;

    let created = env
        .runs
        .create_run(&env.tester, automated(case.id, script.id))
        .await
        .unwrap();

    // A separate queue so dropping it closes the dispatcher
    let (queue, receiver) = ExecutionQueue::new(4);
    let handle = start_execution_workers(
        receiver,
        env.runs.clone(),
        ScriptedExecutor::new(),
        usize::MAX,
    );

    let (completion, done) = oneshot::channel();
    queue
        .submit(ExecutionJob {
            run_id: created.run.id,
            script_path: "workers.cy.js".to_string(),
            completion: Some(completion),
        })
        .await
        .unwrap();

    let completed = done.await.unwrap().unwrap();
    assert_eq!(completed.run.status, RunStatus::Passed);

    drop(queue);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("dispatcher stops once the queue is closed")
        .unwrap();
}
