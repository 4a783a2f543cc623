//! Escalation coordinator: reacts to a run reaching a terminal status.
//!
//! Two effects per transition:
//! 1. status sync, applied in the same transaction as the terminal write
//!    (see [`sync_test_case_status`]);
//! 2. auto-escalation of automated failures into a ticket plus a
//!    notification for the run's actor, applied in its own transaction by
//!    [`EscalationCoordinator::escalate`].
//!
//! `test_runs.escalated_at` records that step 2 ran, so re-delivering a
//! transition is a no-op. The unique `tickets.test_run_id` index backs it up.
//! Failed attempts are counted in `test_runs.escalation_attempts`; recovery
//! stops re-delivering after [`MAX_ESCALATION_ATTEMPTS`].

use sea_orm::ConnectionTrait;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::{self, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::pipeline_event::{
    NotificationCreatedPayload, TestCaseStatusChangedPayload, TicketCreatedPayload,
};
use crate::models::ticket::MAX_TICKET_TITLE_LEN;
use crate::models::{
    NewTicket, Notifiable, NotifiableKind, Notification, PipelineEvent, Priority, RunStatus,
    RunTransition, Severity, TestCase, TestCaseStatus, TestRun, Ticket,
};
use crate::services::event_broadcaster::EventBroadcaster;

/// Prefix of automatically derived ticket titles.
pub const TICKET_TITLE_PREFIX: &str = "Automated test failed: ";

/// Failed escalation attempts after which recovery gives up on a run.
pub const MAX_ESCALATION_ATTEMPTS: i32 = 5;

/// A test case status changed because of a run outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub test_case_id: Uuid,
    pub run_id: Uuid,
    pub previous: TestCaseStatus,
    pub current: TestCaseStatus,
}

/// What the auto-escalation step did for one transition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EscalationReport {
    pub ticket: Option<Ticket>,
    pub notification: Option<Notification>,
    /// The transition had already been escalated; nothing was written.
    pub already_applied: bool,
}

/// Mirror a dispositive run outcome onto the owning test case.
///
/// `blocked`/`skipped` leave the case untouched. Returns the change when the
/// stored value actually moved. Runs inside the caller's transaction.
pub async fn sync_test_case_status<C: ConnectionTrait>(
    db: &C,
    run: &TestRun,
    transition: RunTransition,
) -> AppResult<Option<StatusChange>> {
    let Some(mirrored) = TestCaseStatus::mirrored_from(transition.to) else {
        return Ok(None);
    };

    let case = db::test_cases::find_by_id(db, run.test_case_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Test case {}", run.test_case_id)))?;

    if case.status == mirrored {
        return Ok(None);
    }

    db::test_cases::update_status(db, case.id, mirrored).await?;

    Ok(Some(StatusChange {
        test_case_id: case.id,
        run_id: run.id,
        previous: case.status,
        current: mirrored,
    }))
}

/// Applies and publishes the cascade of terminal run transitions.
#[derive(Clone)]
pub struct EscalationCoordinator {
    pool: DbPool,
    events: EventBroadcaster,
}

impl EscalationCoordinator {
    pub fn new(pool: DbPool, events: EventBroadcaster) -> Self {
        Self { pool, events }
    }

    /// Publish a committed status sync for dashboards.
    pub fn publish_status_change(&self, change: &StatusChange) {
        self.events
            .publish(PipelineEvent::TestCaseStatusChanged(TestCaseStatusChangedPayload {
                test_case_id: change.test_case_id,
                run_id: change.run_id,
                previous: change.previous,
                current: change.current,
            }));
    }

    /// Apply auto-escalation for a transition, at most once per run.
    ///
    /// Any failure is reported as `AppError::Escalation`; the run's terminal
    /// status was committed earlier and is never touched here.
    pub async fn escalate(&self, transition: RunTransition) -> AppResult<EscalationReport> {
        match self.apply(transition).await {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!(
                    target: "infra",
                    run_id = %transition.run_id,
                    to = %transition.to,
                    "Escalation failed: {}",
                    e
                );
                self.record_failure(transition.run_id).await;
                Err(match e {
                    AppError::Escalation(_) => e,
                    other => AppError::Escalation(other.to_string()),
                })
            }
        }
    }

    async fn record_failure(&self, run_id: Uuid) {
        match db::test_runs::record_escalation_failure(self.pool.connection(), run_id).await {
            Ok(Some(attempts)) if attempts >= MAX_ESCALATION_ATTEMPTS => {
                error!(
                    target: "infra",
                    run_id = %run_id,
                    attempts,
                    "Giving up on escalation; the run needs manual follow-up"
                );
            }
            Ok(_) => {}
            Err(e) => {
                error!(run_id = %run_id, "Failed to record escalation attempt: {}", e);
            }
        }
    }

    async fn apply(&self, transition: RunTransition) -> AppResult<EscalationReport> {
        if !transition.to.is_terminal() {
            return Err(AppError::InvalidInput(format!(
                "Run {} moved to non-terminal status {}",
                transition.run_id, transition.to
            )));
        }

        let txn = self.pool.begin().await?;

        let run = db::test_runs::find_by_id(&txn, transition.run_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Test run {}", transition.run_id)))?;

        if run.escalated_at.is_some() {
            txn.rollback().await?;
            return Ok(EscalationReport {
                already_applied: true,
                ..Default::default()
            });
        }

        let mut report = EscalationReport::default();

        if run.status == RunStatus::Failed && run.is_automated() {
            let existing = db::tickets::find_by_test_run(&txn, run.id).await?;
            if existing.is_none() {
                let case = db::test_cases::find_by_id(&txn, run.test_case_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Test case {}", run.test_case_id)))?;

                let new_ticket = ticket_for_failed_run(&case, &run);
                new_ticket.validate().map_err(|(field, message)| {
                    AppError::Escalation(format!("derived ticket {} is invalid: {}", field, message))
                })?;

                let ticket = db::tickets::insert(&txn, run.executed_by, &new_ticket).await?;
                let notification = db::notifications::insert(
                    &txn,
                    run.executed_by,
                    Notifiable {
                        kind: NotifiableKind::Ticket,
                        id: ticket.id,
                    },
                    &format!("Ticket opened for failed automated run: {}", ticket.title),
                )
                .await?;

                report.ticket = Some(ticket);
                report.notification = Some(notification);
            }
        }

        db::test_runs::mark_escalated(&txn, run.id).await?;
        txn.commit().await?;

        if let Some(ticket) = &report.ticket {
            info!(
                run_id = %run.id,
                ticket_id = %ticket.id,
                owner_id = %ticket.created_by,
                "Opened ticket for failed automated run"
            );
            self.events
                .publish(PipelineEvent::TicketCreated(TicketCreatedPayload {
                    ticket_id: ticket.id,
                    owner_id: ticket.created_by,
                    test_case_id: ticket.test_case_id,
                    test_run_id: ticket.test_run_id,
                }));
        }
        if let Some(notification) = &report.notification {
            self.events
                .publish(PipelineEvent::NotificationCreated(NotificationCreatedPayload {
                    notification_id: notification.id,
                    recipient_id: notification.recipient_id,
                    notifiable: notification.notifiable,
                    message: notification.message.clone(),
                }));
        }

        Ok(report)
    }
}

fn ticket_for_failed_run(case: &TestCase, run: &TestRun) -> NewTicket {
    let mut description = format!(
        "Automated run {} of test case \"{}\" failed.",
        run.id,
        case.title.trim()
    );
    if let Some(expected) = case.expected_result.as_deref() {
        description.push_str(&format!("\n\nExpected: {}", expected));
    }
    if let Some(notes) = run.notes.as_deref() {
        description.push_str(&format!("\n\nRun notes:\n{}", notes));
    }
    for (label, evidence) in [("Screenshot", &run.screenshot_ref), ("Video", &run.video_ref)] {
        if let Some(key) = evidence {
            description.push_str(&format!("\n{}: {}", label, key));
        }
    }

    NewTicket {
        title: derived_ticket_title(&case.title),
        description,
        priority: Priority::High,
        severity: Severity::Major,
        test_case_id: Some(case.id),
        test_run_id: Some(run.id),
        assigned_to: None,
    }
}

/// Ticket title for a failed run of the case titled `case_title`, shortened
/// with an ellipsis to fit the ticket title limit.
pub fn derived_ticket_title(case_title: &str) -> String {
    let case_title = case_title.trim();
    let room = MAX_TICKET_TITLE_LEN - TICKET_TITLE_PREFIX.chars().count();

    if case_title.chars().count() <= room {
        return format!("{}{}", TICKET_TITLE_PREFIX, case_title);
    }

    let kept: String = case_title.chars().take(room - 1).collect();
    format!("{}{}\u{2026}", TICKET_TITLE_PREFIX, kept.trim_end())
}
