//! Test case, automation script and manual ticket administration.

use tracing::info;
use uuid::Uuid;

use crate::auth::{Action, Authorizer, ResourceKind};
use crate::db::{self, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::{
    Actor, AutomationScript, NewAutomationScript, NewTestCase, NewTicket, ScriptStatus, TestCase,
    TestCaseStatus, Ticket,
};

/// Longest test case title accepted.
pub const MAX_TEST_CASE_TITLE_LEN: usize = 255;

/// Authorized setup operations around test cases.
#[derive(Clone)]
pub struct TestCaseService {
    pool: DbPool,
    authorizer: Authorizer,
}

impl TestCaseService {
    pub fn new(pool: DbPool, authorizer: Authorizer) -> Self {
        Self { pool, authorizer }
    }

    /// Create a test case in `draft` status.
    pub async fn create_test_case(&self, actor: &Actor, new: NewTestCase) -> AppResult<TestCase> {
        self.authorizer.require(actor, ResourceKind::TestCase, Action::Create)?;

        let title = new.title.trim();
        if title.is_empty() {
            return Err(AppError::validation("title", "title must not be blank"));
        }
        if title.chars().count() > MAX_TEST_CASE_TITLE_LEN {
            return Err(AppError::validation(
                "title",
                format!("title exceeds {} characters", MAX_TEST_CASE_TITLE_LEN),
            ));
        }
        if new.steps.iter().any(|step| step.trim().is_empty()) {
            return Err(AppError::validation("steps", "steps must not be blank"));
        }

        let conn = self.pool.connection();
        if let Some(assignee) = new.assigned_to
            && db::users::find_by_id(conn, assignee).await?.is_none()
        {
            return Err(AppError::validation(
                "assigned_to",
                format!("user {} does not exist", assignee),
            ));
        }

        let new = NewTestCase {
            title: title.to_string(),
            ..new
        };
        let case = db::test_cases::insert(conn, actor.id, &new).await?;

        info!(test_case_id = %case.id, actor_id = %actor.id, "Test case created");
        Ok(case)
    }

    /// Get a test case.
    pub async fn get_test_case(&self, actor: &Actor, id: Uuid) -> AppResult<TestCase> {
        self.authorizer.require(actor, ResourceKind::TestCase, Action::Read)?;

        db::test_cases::find_by_id(self.pool.connection(), id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Test case {}", id)))
    }

    /// Set a test case status by hand.
    ///
    /// Rejected while the case has an active script: its status then follows
    /// the latest run outcome.
    pub async fn update_test_case_status(
        &self,
        actor: &Actor,
        id: Uuid,
        status: TestCaseStatus,
    ) -> AppResult<TestCase> {
        self.authorizer.require(actor, ResourceKind::TestCase, Action::Update)?;

        let conn = self.pool.connection();
        if db::test_cases::find_by_id(conn, id).await?.is_none() {
            return Err(AppError::NotFound(format!("Test case {}", id)));
        }
        if db::automation_scripts::has_active_for_test_case(conn, id).await? {
            return Err(AppError::validation(
                "status",
                "status is driven by automated runs while an active script exists",
            ));
        }

        db::test_cases::update_status(conn, id, status).await?;
        db::test_cases::find_by_id(conn, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Test case {}", id)))
    }

    /// Register an automation script against a test case, owned by `actor`.
    pub async fn register_script(
        &self,
        actor: &Actor,
        new: NewAutomationScript,
    ) -> AppResult<AutomationScript> {
        self.authorizer
            .require(actor, ResourceKind::AutomationScript, Action::Create)?;

        if new.name.trim().is_empty() {
            return Err(AppError::validation("name", "name must not be blank"));
        }
        if new.script_path.trim().is_empty() {
            return Err(AppError::validation("script_path", "script path must not be blank"));
        }

        let conn = self.pool.connection();
        if db::test_cases::find_by_id(conn, new.test_case_id).await?.is_none() {
            return Err(AppError::validation(
                "test_case_id",
                format!("test case {} does not exist", new.test_case_id),
            ));
        }

        let new = NewAutomationScript {
            name: new.name.trim().to_string(),
            script_path: new.script_path.trim().to_string(),
            ..new
        };
        let script = db::automation_scripts::insert(conn, actor.id, &new).await?;

        info!(
            script_id = %script.id,
            test_case_id = %script.test_case_id,
            status = %script.status,
            "Automation script registered"
        );
        Ok(script)
    }

    /// Activate, deactivate or return a script to draft.
    pub async fn set_script_status(
        &self,
        actor: &Actor,
        script_id: Uuid,
        status: ScriptStatus,
    ) -> AppResult<AutomationScript> {
        self.authorizer
            .require(actor, ResourceKind::AutomationScript, Action::Update)?;

        db::automation_scripts::update_status(self.pool.connection(), script_id, status).await
    }

    /// File a ticket by hand, owned by `actor`.
    pub async fn create_ticket(&self, actor: &Actor, new: NewTicket) -> AppResult<Ticket> {
        self.authorizer.require(actor, ResourceKind::Ticket, Action::Create)?;

        new.validate()
            .map_err(|(field, message)| AppError::validation(field, message))?;

        let conn = self.pool.connection();
        if let Some(case_id) = new.test_case_id
            && db::test_cases::find_by_id(conn, case_id).await?.is_none()
        {
            return Err(AppError::validation(
                "test_case_id",
                format!("test case {} does not exist", case_id),
            ));
        }
        if let Some(run_id) = new.test_run_id {
            if db::test_runs::find_by_id(conn, run_id).await?.is_none() {
                return Err(AppError::validation(
                    "test_run_id",
                    format!("test run {} does not exist", run_id),
                ));
            }
            if let Some(existing) = db::tickets::find_by_test_run(conn, run_id).await? {
                return Err(AppError::Conflict(format!(
                    "Ticket {} already tracks test run {}",
                    existing.id, run_id
                )));
            }
        }

        let ticket = db::tickets::insert(conn, actor.id, &new).await?;
        info!(ticket_id = %ticket.id, actor_id = %actor.id, "Ticket filed");
        Ok(ticket)
    }

    /// Tickets referencing a test case.
    pub async fn list_tickets_for_case(
        &self,
        actor: &Actor,
        test_case_id: Uuid,
    ) -> AppResult<Vec<Ticket>> {
        self.authorizer.require(actor, ResourceKind::Ticket, Action::Read)?;

        db::tickets::list_by_test_case(self.pool.connection(), test_case_id).await
    }
}
