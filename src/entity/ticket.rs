//! Ticket entity for SeaORM.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tickets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub status: String,
    pub priority: String,
    pub severity: String,
    pub test_case_id: Option<Uuid>,
    /// Unique when present: at most one ticket per run
    pub test_run_id: Option<Uuid>,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::test_case::Entity",
        from = "Column::TestCaseId",
        to = "super::test_case::Column::Id",
        on_delete = "SetNull"
    )]
    TestCase,
    #[sea_orm(
        belongs_to = "super::test_run::Entity",
        from = "Column::TestRunId",
        to = "super::test_run::Column::Id",
        on_delete = "SetNull"
    )]
    TestRun,
}

impl Related<super::test_case::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TestCase.def()
    }
}

impl Related<super::test_run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TestRun.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
