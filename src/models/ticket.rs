//! Defect ticket models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::test_case::Priority;

/// Longest ticket title accepted by the store.
pub const MAX_TICKET_TITLE_LEN: usize = 255;

/// Ticket workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Defect severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Minor,
    Major,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minor => "minor",
            Self::Major => "major",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "minor" => Some(Self::Minor),
            "major" => Some(Self::Major),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Ticket stored in database.
#[derive(Debug, Clone, Serialize)]
pub struct Ticket {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: Priority,
    pub severity: Severity,
    pub test_case_id: Option<Uuid>,
    pub test_run_id: Option<Uuid>,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Ticket about to be inserted.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTicket {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub test_case_id: Option<Uuid>,
    #[serde(default)]
    pub test_run_id: Option<Uuid>,
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
}

impl NewTicket {
    /// Field-level checks shared by manual and automatic ticket creation.
    pub fn validate(&self) -> Result<(), (&'static str, String)> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(("title", "title must not be blank".to_string()));
        }
        if title.chars().count() > MAX_TICKET_TITLE_LEN {
            return Err((
                "title",
                format!("title exceeds {} characters", MAX_TICKET_TITLE_LEN),
            ));
        }
        Ok(())
    }
}
