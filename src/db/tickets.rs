//! Database operations for tickets.

use chrono::Utc;
use sea_orm::*;
use uuid::Uuid;

use crate::entity::ticket::{self, Entity as TicketEntity};
use crate::error::AppResult;
use crate::models::{NewTicket, Priority, Severity, Ticket, TicketStatus};

use super::parse_column;

/// Insert an `open` ticket.
pub async fn insert<C: ConnectionTrait>(
    db: &C,
    created_by: Uuid,
    new: &NewTicket,
) -> AppResult<Ticket> {
    let now = Utc::now();

    let model = ticket::ActiveModel {
        id: Set(Uuid::now_v7()),
        title: Set(new.title.trim().to_string()),
        description: Set(new.description.clone()),
        status: Set(TicketStatus::Open.as_str().to_string()),
        priority: Set(new.priority.as_str().to_string()),
        severity: Set(new.severity.as_str().to_string()),
        test_case_id: Set(new.test_case_id),
        test_run_id: Set(new.test_run_id),
        created_by: Set(created_by),
        assigned_to: Set(new.assigned_to),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let inserted = model.insert(db).await?;
    model_to_ticket(inserted)
}

/// Find a ticket by ID.
pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<Option<Ticket>> {
    let result = TicketEntity::find_by_id(id).one(db).await?;
    result.map(model_to_ticket).transpose()
}

/// The ticket opened for a run, if any. At most one exists per run.
pub async fn find_by_test_run<C: ConnectionTrait>(
    db: &C,
    test_run_id: Uuid,
) -> AppResult<Option<Ticket>> {
    let result = TicketEntity::find()
        .filter(ticket::Column::TestRunId.eq(test_run_id))
        .one(db)
        .await?;

    result.map(model_to_ticket).transpose()
}

/// Tickets referencing a test case, oldest first.
pub async fn list_by_test_case<C: ConnectionTrait>(
    db: &C,
    test_case_id: Uuid,
) -> AppResult<Vec<Ticket>> {
    let result = TicketEntity::find()
        .filter(ticket::Column::TestCaseId.eq(test_case_id))
        .order_by_asc(ticket::Column::Id)
        .all(db)
        .await?;

    result.into_iter().map(model_to_ticket).collect()
}

fn model_to_ticket(m: ticket::Model) -> AppResult<Ticket> {
    Ok(Ticket {
        id: m.id,
        status: parse_column(&m.status, "tickets.status", TicketStatus::parse)?,
        priority: parse_column(&m.priority, "tickets.priority", Priority::parse)?,
        severity: parse_column(&m.severity, "tickets.severity", Severity::parse)?,
        title: m.title,
        description: m.description,
        test_case_id: m.test_case_id,
        test_run_id: m.test_run_id,
        created_by: m.created_by,
        assigned_to: m.assigned_to,
        created_at: m.created_at,
    })
}
