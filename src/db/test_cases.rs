//! Database operations for test cases.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use uuid::Uuid;

use crate::entity::test_case::{self, Entity as TestCaseEntity};
use crate::error::AppResult;
use crate::models::{NewTestCase, Priority, TestCase, TestCaseStatus};

use super::parse_column;

/// Insert a test case in `draft` status.
pub async fn insert<C: ConnectionTrait>(
    db: &C,
    created_by: Uuid,
    new: &NewTestCase,
) -> AppResult<TestCase> {
    let now = Utc::now();

    let model = test_case::ActiveModel {
        id: Set(Uuid::now_v7()),
        title: Set(new.title.clone()),
        steps: Set(serde_json::to_value(&new.steps)?),
        expected_result: Set(new.expected_result.clone()),
        priority: Set(new.priority.as_str().to_string()),
        status: Set(TestCaseStatus::Draft.as_str().to_string()),
        created_by: Set(created_by),
        assigned_to: Set(new.assigned_to),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let inserted = model.insert(db).await?;
    model_to_test_case(inserted)
}

/// Find a test case by ID.
pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<Option<TestCase>> {
    let result = TestCaseEntity::find_by_id(id).one(db).await?;
    result.map(model_to_test_case).transpose()
}

/// Set the status of a test case. Returns false if the case does not exist.
pub async fn update_status<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    status: TestCaseStatus,
) -> AppResult<bool> {
    let result = TestCaseEntity::update_many()
        .col_expr(test_case::Column::Status, Expr::value(status.as_str()))
        .col_expr(test_case::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(test_case::Column::Id.eq(id))
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

fn model_to_test_case(m: test_case::Model) -> AppResult<TestCase> {
    Ok(TestCase {
        id: m.id,
        steps: serde_json::from_value(m.steps)?,
        priority: parse_column(&m.priority, "test_cases.priority", Priority::parse)?,
        status: parse_column(&m.status, "test_cases.status", TestCaseStatus::parse)?,
        title: m.title,
        expected_result: m.expected_result,
        created_by: m.created_by,
        assigned_to: m.assigned_to,
        created_at: m.created_at,
        updated_at: m.updated_at,
    })
}
