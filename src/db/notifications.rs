//! Database operations for notifications.

use chrono::Utc;
use sea_orm::*;
use uuid::Uuid;

use crate::entity::notification::{self, Entity as NotificationEntity};
use crate::error::AppResult;
use crate::models::{Notifiable, NotifiableKind, Notification};

use super::parse_column;

/// Store a notification for one recipient.
pub async fn insert<C: ConnectionTrait>(
    db: &C,
    recipient_id: Uuid,
    notifiable: Notifiable,
    message: &str,
) -> AppResult<Notification> {
    let model = notification::ActiveModel {
        id: Set(Uuid::now_v7()),
        recipient_id: Set(recipient_id),
        notifiable_kind: Set(notifiable.kind.as_str().to_string()),
        notifiable_id: Set(notifiable.id),
        message: Set(message.to_string()),
        read_at: Set(None),
        created_at: Set(Utc::now()),
    };

    let inserted = model.insert(db).await?;
    model_to_notification(inserted)
}

/// Notifications for a recipient, newest first.
pub async fn list_for_recipient<C: ConnectionTrait>(
    db: &C,
    recipient_id: Uuid,
) -> AppResult<Vec<Notification>> {
    let result = NotificationEntity::find()
        .filter(notification::Column::RecipientId.eq(recipient_id))
        .order_by_desc(notification::Column::Id)
        .all(db)
        .await?;

    result.into_iter().map(model_to_notification).collect()
}

fn model_to_notification(m: notification::Model) -> AppResult<Notification> {
    let kind = parse_column(
        &m.notifiable_kind,
        "notifications.notifiable_kind",
        NotifiableKind::parse,
    )?;

    Ok(Notification {
        id: m.id,
        recipient_id: m.recipient_id,
        notifiable: Notifiable {
            kind,
            id: m.notifiable_id,
        },
        message: m.message,
        read_at: m.read_at,
        created_at: m.created_at,
    })
}
