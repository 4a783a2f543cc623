//! Database operations for users.

use chrono::Utc;
use sea_orm::*;
use uuid::Uuid;

use crate::entity::user::{self, Entity as UserEntity};
use crate::error::{AppError, AppResult};
use crate::models::{Role, User};

use super::parse_column;

/// Create a user.
pub async fn insert<C: ConnectionTrait>(
    db: &C,
    username: &str,
    email: Option<&str>,
    role: Role,
) -> AppResult<User> {
    let now = Utc::now();

    let model = user::ActiveModel {
        id: Set(Uuid::now_v7()),
        username: Set(username.to_string()),
        email: Set(email.map(|s| s.to_string())),
        role: Set(role.as_str().to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        deleted_at: Set(None),
    };

    let inserted = model.insert(db).await?;
    model_to_user(inserted)
}

/// Find a user by ID.
pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<Option<User>> {
    let result = UserEntity::find_by_id(id)
        .filter(user::Column::DeletedAt.is_null())
        .one(db)
        .await?;

    result.map(model_to_user).transpose()
}

/// Change a user's role. Takes effect on the user's next request.
pub async fn update_role<C: ConnectionTrait>(db: &C, id: Uuid, role: Role) -> AppResult<User> {
    let existing = UserEntity::find_by_id(id)
        .filter(user::Column::DeletedAt.is_null())
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", id)))?;

    let mut active: user::ActiveModel = existing.into();
    active.role = Set(role.as_str().to_string());
    active.updated_at = Set(Utc::now());
    let updated = active.update(db).await?;

    model_to_user(updated)
}

fn model_to_user(m: user::Model) -> AppResult<User> {
    Ok(User {
        id: m.id,
        role: parse_column(&m.role, "users.role", Role::parse)?,
        username: m.username,
        email: m.email,
        created_at: m.created_at,
    })
}
