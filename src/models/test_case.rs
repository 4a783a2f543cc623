//! Test case models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::test_run::RunStatus;

/// Test case lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCaseStatus {
    Draft,
    Active,
    InProgress,
    Passed,
    Failed,
    Archived,
}

impl TestCaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::InProgress => "in_progress",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "in_progress" => Some(Self::InProgress),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    /// The case status a run outcome dictates; `None` for inconclusive outcomes.
    pub fn mirrored_from(run_status: RunStatus) -> Option<Self> {
        match run_status {
            RunStatus::Passed => Some(Self::Passed),
            RunStatus::Failed => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TestCaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordered priority shared by test cases and tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Test case stored in database.
#[derive(Debug, Clone, Serialize)]
pub struct TestCase {
    pub id: Uuid,
    pub title: String,
    pub steps: Vec<String>,
    pub expected_result: Option<String>,
    pub priority: Priority,
    pub status: TestCaseStatus,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a test case.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTestCase {
    pub title: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub expected_result: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
}
