//! Database operations for automation scripts.

use chrono::Utc;
use sea_orm::*;
use uuid::Uuid;

use crate::entity::automation_script::{self, Entity as ScriptEntity};
use crate::error::{AppError, AppResult};
use crate::models::{AutomationScript, NewAutomationScript, ScriptStatus};

use super::parse_column;

/// Register a script against its test case.
pub async fn insert<C: ConnectionTrait>(
    db: &C,
    owner_id: Uuid,
    new: &NewAutomationScript,
) -> AppResult<AutomationScript> {
    let now = Utc::now();

    let model = automation_script::ActiveModel {
        id: Set(Uuid::now_v7()),
        test_case_id: Set(new.test_case_id),
        owner_id: Set(owner_id),
        name: Set(new.name.clone()),
        script_path: Set(new.script_path.clone()),
        status: Set(new.status.as_str().to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let inserted = model.insert(db).await?;
    model_to_script(inserted)
}

/// Find a script by ID.
pub async fn find_by_id<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> AppResult<Option<AutomationScript>> {
    let result = ScriptEntity::find_by_id(id).one(db).await?;
    result.map(model_to_script).transpose()
}

/// All scripts bound to a test case, oldest first.
pub async fn list_by_test_case<C: ConnectionTrait>(
    db: &C,
    test_case_id: Uuid,
) -> AppResult<Vec<AutomationScript>> {
    let result = ScriptEntity::find()
        .filter(automation_script::Column::TestCaseId.eq(test_case_id))
        .order_by_asc(automation_script::Column::Id) // UUIDv7 is time-ordered
        .all(db)
        .await?;

    result.into_iter().map(model_to_script).collect()
}

/// Whether the test case has at least one active script.
pub async fn has_active_for_test_case<C: ConnectionTrait>(
    db: &C,
    test_case_id: Uuid,
) -> AppResult<bool> {
    let count = ScriptEntity::find()
        .filter(automation_script::Column::TestCaseId.eq(test_case_id))
        .filter(automation_script::Column::Status.eq(ScriptStatus::Active.as_str()))
        .count(db)
        .await?;

    Ok(count > 0)
}

/// Change a script's status.
pub async fn update_status<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    status: ScriptStatus,
) -> AppResult<AutomationScript> {
    let existing = ScriptEntity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Automation script {}", id)))?;

    let mut active: automation_script::ActiveModel = existing.into();
    active.status = Set(status.as_str().to_string());
    active.updated_at = Set(Utc::now());
    let updated = active.update(db).await?;

    model_to_script(updated)
}

fn model_to_script(m: automation_script::Model) -> AppResult<AutomationScript> {
    Ok(AutomationScript {
        id: m.id,
        status: parse_column(&m.status, "automation_scripts.status", ScriptStatus::parse)?,
        test_case_id: m.test_case_id,
        owner_id: m.owner_id,
        name: m.name,
        script_path: m.script_path,
        created_at: m.created_at,
        updated_at: m.updated_at,
    })
}
