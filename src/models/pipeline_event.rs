//! Outbound pipeline events for dashboards and the notification channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::notification::Notifiable;
use super::test_case::TestCaseStatus;
use super::test_run::RunStatus;

/// Event published by the core to excluded collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A run reached its terminal status.
    TestRunCompleted(TestRunCompletedPayload),
    /// A test case status changed because of a run outcome.
    TestCaseStatusChanged(TestCaseStatusChangedPayload),
    /// A defect ticket was opened automatically.
    TicketCreated(TicketCreatedPayload),
    /// A notification is ready for delivery to one user.
    NotificationCreated(NotificationCreatedPayload),
}

/// Payload for test_run_completed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRunCompletedPayload {
    pub run_id: Uuid,
    pub test_case_id: Uuid,
    pub status: RunStatus,
    pub automated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<i64>,
}

/// Payload for test_case_status_changed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseStatusChangedPayload {
    pub test_case_id: Uuid,
    pub run_id: Uuid,
    pub previous: TestCaseStatus,
    pub current: TestCaseStatus,
}

/// Payload for ticket_created event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketCreatedPayload {
    pub ticket_id: Uuid,
    pub owner_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_case_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_run_id: Option<Uuid>,
}

/// Payload for notification_created event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationCreatedPayload {
    pub notification_id: Uuid,
    pub recipient_id: Uuid,
    pub notifiable: Notifiable,
    pub message: String,
}

/// Wrapper that includes timestamp with every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    #[serde(flatten)]
    pub event: PipelineEvent,
    pub timestamp: DateTime<Utc>,
}

impl EventMessage {
    /// Create a new event message with the current timestamp.
    pub fn new(event: PipelineEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }
}

impl PipelineEvent {
    /// Recipient for events addressed to one user.
    pub fn recipient(&self) -> Option<Uuid> {
        match self {
            PipelineEvent::TicketCreated(p) => Some(p.owner_id),
            PipelineEvent::NotificationCreated(p) => Some(p.recipient_id),
            _ => None,
        }
    }
}
