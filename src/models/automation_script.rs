//! Automation script models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Script status; only `Active` scripts are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScriptStatus {
    #[default]
    Draft,
    Active,
    Inactive,
}

impl ScriptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScriptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Automation script stored in database.
#[derive(Debug, Clone, Serialize)]
pub struct AutomationScript {
    pub id: Uuid,
    pub test_case_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub script_path: String,
    pub status: ScriptStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutomationScript {
    pub fn is_executable(&self) -> bool {
        self.status == ScriptStatus::Active
    }
}

/// Request to register a script against a test case.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAutomationScript {
    pub test_case_id: Uuid,
    pub name: String,
    pub script_path: String,
    #[serde(default)]
    pub status: ScriptStatus,
}
