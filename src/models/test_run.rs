//! Test run models and the run state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix on run notes when the run was closed because the test tool was unusable.
pub const INFRASTRUCTURE_ERROR_MARKER: &str = "[infrastructure-error]";

/// Run status: `pending -> running -> {passed|failed|blocked|skipped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Blocked,
    Skipped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            "blocked" => Some(Self::Blocked),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// No automatic transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Passed | Self::Failed | Self::Blocked | Self::Skipped
        )
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        match self {
            Self::Pending => next == Self::Running || next.is_terminal(),
            Self::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Test run stored in database.
#[derive(Debug, Clone, Serialize)]
pub struct TestRun {
    pub id: Uuid,
    pub test_case_id: Uuid,
    pub automation_script_id: Option<Uuid>,
    pub executed_by: Uuid,
    pub status: RunStatus,
    pub duration_secs: Option<i64>,
    pub notes: Option<String>,
    pub screenshot_ref: Option<String>,
    pub video_ref: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub escalation_attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl TestRun {
    /// Automated runs are bound to a script; manual runs are not.
    pub fn is_automated(&self) -> bool {
        self.automation_script_id.is_some()
    }

    /// Whether the run was force-closed because the test tool was unusable.
    pub fn has_infrastructure_error(&self) -> bool {
        self.notes
            .as_deref()
            .is_some_and(|n| n.starts_with(INFRASTRUCTURE_ERROR_MARKER))
    }
}

/// Inbound request to create a run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRunRequest {
    pub test_case_id: Uuid,
    #[serde(default)]
    pub automation_script_id: Option<Uuid>,
    /// Terminal status of a manual run; must be absent for automated runs.
    #[serde(default)]
    pub status: Option<RunStatus>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Fields written by the single terminal transition of a run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub duration_secs: Option<i64>,
    pub notes: Option<String>,
    pub screenshot_ref: Option<String>,
    pub video_ref: Option<String>,
}

impl RunOutcome {
    /// Outcome for a run whose execution never produced a test result.
    pub fn infrastructure_failure(detail: &str, duration_secs: Option<i64>) -> Self {
        Self {
            status: RunStatus::Failed,
            duration_secs,
            notes: Some(format!("{} {}", INFRASTRUCTURE_ERROR_MARKER, detail)),
            screenshot_ref: None,
            video_ref: None,
        }
    }
}

/// "Run moved to a new terminal status" event consumed by the escalation coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTransition {
    pub run_id: Uuid,
    pub from: RunStatus,
    pub to: RunStatus,
}
