//! Shared test helpers for pipeline integration tests.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use qa_pipeline::auth::Authorizer;
use qa_pipeline::db::{self, DbPool, test_runs::NewRunRecord};
use qa_pipeline::models::{
    Actor, AutomationScript, CreateRunRequest, EventMessage, NewAutomationScript, NewTestCase,
    Priority, Role, RunOutcome, RunStatus, ScriptStatus, TestCase, TestRun,
};
use qa_pipeline::services::{
    EventBroadcaster, ExecutionJob, ExecutionQueue, ExecutionResult, RunnerError,
    ScriptExecutor, TestCaseService, TestRunService, start_execution_workers,
};

/// How the scripted test tool behaves for one script path.
#[derive(Debug, Clone)]
pub enum Behavior {
    Pass,
    Fail(&'static str),
    SpawnFailure,
    Timeout,
}

/// Test tool double: returns configured results and records every call.
#[derive(Default)]
pub struct ScriptedExecutor {
    behaviors: Mutex<HashMap<String, Behavior>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, path: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(path.to_string(), behavior);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptExecutor for ScriptedExecutor {
    async fn execute(&self, script_path: &str) -> Result<ExecutionResult, RunnerError> {
        self.calls.lock().unwrap().push(script_path.to_string());
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(script_path)
            .cloned()
            .unwrap_or(Behavior::Pass);

        match behavior {
            Behavior::Pass => Ok(ExecutionResult {
                status: RunStatus::Passed,
                duration_secs: 1,
                exit_code: Some(0),
                output: "1 passing".to_string(),
                screenshot_ref: None,
                video_ref: Some(format!("videos/{}.mp4", script_path)),
            }),
            Behavior::Fail(output) => Ok(ExecutionResult {
                status: RunStatus::Failed,
                duration_secs: 2,
                exit_code: Some(1),
                output: output.to_string(),
                screenshot_ref: Some(format!("screenshots/{}/failure.png", script_path)),
                video_ref: None,
            }),
            Behavior::SpawnFailure => Err(RunnerError::Spawn {
                program: "cypress".to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
            }),
            Behavior::Timeout => Err(RunnerError::TimedOut(Duration::from_secs(900))),
        }
    }
}

/// Everything a pipeline test needs.
pub struct TestEnv {
    pub pool: DbPool,
    pub events: EventBroadcaster,
    pub authorizer: Authorizer,
    pub runs: Arc<TestRunService>,
    pub cases: TestCaseService,
    pub admin: Actor,
    pub manager: Actor,
    pub developer: Actor,
    pub tester: Actor,
    /// Keeps the queue open when no workers consume it
    _parked: Option<mpsc::Receiver<ExecutionJob>>,
}

/// Create a fresh migrated in-memory database.
pub async fn create_test_pool() -> DbPool {
    let pool = DbPool::connect("sqlite::memory:", 1)
        .await
        .expect("Failed to connect to database");
    pool.run_migrations()
        .await
        .expect("Failed to run migrations");
    pool
}

async fn create_actor(pool: &DbPool, username: &str, role: Role) -> Actor {
    db::users::insert(pool.connection(), username, None, role)
        .await
        .expect("Failed to create user")
        .actor()
}

async fn build_env(executor: Option<Arc<dyn ScriptExecutor>>) -> TestEnv {
    let pool = create_test_pool().await;
    let events = EventBroadcaster::new();
    let authorizer = Authorizer::default();

    let (queue, receiver) = ExecutionQueue::new(16);
    let runs = Arc::new(
        TestRunService::new(pool.clone(), authorizer, events.clone()).with_queue(queue),
    );

    let parked = match executor {
        Some(executor) => {
            start_execution_workers(receiver, runs.clone(), executor, 2);
            None
        }
        None => Some(receiver),
    };

    TestEnv {
        cases: TestCaseService::new(pool.clone(), authorizer),
        admin: create_actor(&pool, "admin", Role::Admin).await,
        manager: create_actor(&pool, "manager", Role::Manager).await,
        developer: create_actor(&pool, "developer", Role::Developer).await,
        tester: create_actor(&pool, "tester", Role::Tester).await,
        pool,
        events,
        authorizer,
        runs,
        _parked: parked,
    }
}

/// Environment whose automated runs are executed by `executor`.
pub async fn setup(executor: Arc<dyn ScriptExecutor>) -> TestEnv {
    build_env(Some(executor)).await
}

/// Environment whose queued runs are never picked up.
pub async fn setup_without_workers() -> TestEnv {
    build_env(None).await
}

pub async fn create_case(env: &TestEnv, title: &str) -> TestCase {
    env.cases
        .create_test_case(
            &env.manager,
            NewTestCase {
                title: title.to_string(),
                steps: vec!["Open the login page".to_string(), "Submit".to_string()],
                expected_result: Some("Dashboard is shown".to_string()),
                priority: Priority::High,
                assigned_to: Some(env.tester.id),
            },
        )
        .await
        .expect("Failed to create test case")
}

pub async fn create_script(
    env: &TestEnv,
    test_case_id: Uuid,
    script_path: &str,
    status: ScriptStatus,
) -> AutomationScript {
    env.cases
        .register_script(
            &env.tester,
            NewAutomationScript {
                test_case_id,
                name: format!("{} script", script_path),
                script_path: script_path.to_string(),
                status,
            },
        )
        .await
        .expect("Failed to register script")
}

pub fn automated(test_case_id: Uuid, script_id: Uuid) -> CreateRunRequest {
    CreateRunRequest {
        test_case_id,
        automation_script_id: Some(script_id),
        ..Default::default()
    }
}

pub fn manual(test_case_id: Uuid, status: RunStatus) -> CreateRunRequest {
    CreateRunRequest {
        test_case_id,
        status: Some(status),
        notes: Some("checked by hand".to_string()),
        ..Default::default()
    }
}

/// A failed automated run whose process died before its escalation ran.
pub async fn insert_unescalated_failure(
    env: &TestEnv,
    test_case_id: Uuid,
    script_id: Uuid,
) -> TestRun {
    let conn = env.pool.connection();
    let run = db::test_runs::insert(
        conn,
        NewRunRecord {
            test_case_id,
            automation_script_id: Some(script_id),
            executed_by: env.tester.id,
            status: RunStatus::Running,
            notes: None,
        },
    )
    .await
    .unwrap();

    let outcome = RunOutcome {
        status: RunStatus::Failed,
        duration_secs: Some(1),
        notes: Some("assertion failed".to_string()),
        screenshot_ref: None,
        video_ref: None,
    };
    assert!(db::test_runs::finish_run(conn, run.id, &outcome).await.unwrap());

    db::test_runs::find_by_id(conn, run.id)
        .await
        .unwrap()
        .expect("run exists")
}

pub async fn case_status(env: &TestEnv, id: Uuid) -> qa_pipeline::models::TestCaseStatus {
    db::test_cases::find_by_id(env.pool.connection(), id)
        .await
        .unwrap()
        .expect("test case exists")
        .status
}

pub async fn ticket_count(env: &TestEnv, test_case_id: Uuid) -> usize {
    db::tickets::list_by_test_case(env.pool.connection(), test_case_id)
        .await
        .unwrap()
        .len()
}

/// Drain every event broadcast so far.
pub fn drain(receiver: &mut tokio::sync::broadcast::Receiver<EventMessage>) -> Vec<EventMessage> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
