//! TestRun entity for SeaORM.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "test_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub test_case_id: Uuid,
    /// NULL for manual runs
    pub automation_script_id: Option<Uuid>,
    pub executed_by: Uuid,
    pub status: String,
    pub duration_secs: Option<i64>,
    pub notes: Option<String>,
    /// Opaque blob-storage key of the failure screenshot
    pub screenshot_ref: Option<String>,
    /// Opaque blob-storage key of the run video
    pub video_ref: Option<String>,
    pub started_at: Option<DateTimeUtc>,
    pub completed_at: Option<DateTimeUtc>,
    /// Set once the escalation for the terminal transition has been applied
    pub escalated_at: Option<DateTimeUtc>,
    /// Failed escalation attempts for the terminal transition
    pub escalation_attempts: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::test_case::Entity",
        from = "Column::TestCaseId",
        to = "super::test_case::Column::Id",
        on_delete = "Cascade"
    )]
    TestCase,
    #[sea_orm(
        belongs_to = "super::automation_script::Entity",
        from = "Column::AutomationScriptId",
        to = "super::automation_script::Column::Id",
        on_delete = "SetNull"
    )]
    AutomationScript,
}

impl Related<super::test_case::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TestCase.def()
    }
}

impl Related<super::automation_script::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AutomationScript.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
