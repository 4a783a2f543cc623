//! Actor resolution for callers that only carry a user id.
//!
//! The role is read from the store on every call, so a role change applies
//! to the very next request.

use tracing::info;
use uuid::Uuid;

use crate::auth::{Action, Authorizer, ResourceKind};
use crate::db::{self, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::{Actor, Role, User};

/// Load the current actor identity of a user.
pub async fn resolve_actor(pool: &DbPool, user_id: Uuid) -> AppResult<Actor> {
    db::users::find_by_id(pool.connection(), user_id)
        .await?
        .map(|user| user.actor())
        .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))
}

/// Change the role of `user_id`. Only roles allowed to update users may do this.
pub async fn change_role(
    pool: &DbPool,
    authorizer: &Authorizer,
    actor: &Actor,
    user_id: Uuid,
    role: Role,
) -> AppResult<User> {
    authorizer.require(actor, ResourceKind::User, Action::Update)?;

    let user = db::users::update_role(pool.connection(), user_id, role).await?;
    info!(
        user_id = %user.id,
        role = %user.role,
        changed_by = %actor.id,
        "User role changed"
    );
    Ok(user)
}
