//! TestCase entity for SeaORM.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "test_cases")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub title: String,
    /// Ordered steps as a JSON array of strings
    #[sea_orm(column_type = "JsonBinary")]
    pub steps: JsonValue,
    pub expected_result: Option<String>,
    pub priority: String,
    pub status: String,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::automation_script::Entity")]
    AutomationScripts,
    #[sea_orm(has_many = "super::test_run::Entity")]
    TestRuns,
}

impl Related<super::automation_script::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AutomationScripts.def()
    }
}

impl Related<super::test_run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TestRuns.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
