//! Notifications addressed to a single user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Record kinds a notification can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifiableKind {
    Ticket,
    TestRun,
    TestCase,
}

impl NotifiableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ticket => "ticket",
            Self::TestRun => "test_run",
            Self::TestCase => "test_case",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ticket" => Some(Self::Ticket),
            "test_run" => Some(Self::TestRun),
            "test_case" => Some(Self::TestCase),
            _ => None,
        }
    }
}

/// Tagged reference resolved by the delivery layer, not by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notifiable {
    pub kind: NotifiableKind,
    pub id: Uuid,
}

/// Notification stored in database.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub notifiable: Notifiable,
    pub message: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
