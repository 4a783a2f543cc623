//! Migration: Create automation_scripts table.
//!
//! Each script is bound to exactly one test case and one owner.

use sea_orm_migration::prelude::*;

use super::m20261001_000001_create_users::Users;
use super::m20261001_000002_create_test_cases::TestCases;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AutomationScripts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AutomationScripts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AutomationScripts::TestCaseId).uuid().not_null())
                    .col(ColumnDef::new(AutomationScripts::OwnerId).uuid().not_null())
                    .col(
                        ColumnDef::new(AutomationScripts::Name)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AutomationScripts::ScriptPath)
                            .string_len(500)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AutomationScripts::Status)
                            .string_len(20)
                            .not_null()
                            .default("draft"),
                    )
                    .col(
                        ColumnDef::new(AutomationScripts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AutomationScripts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_automation_scripts_test_case")
                            .from(AutomationScripts::Table, AutomationScripts::TestCaseId)
                            .to(TestCases::Table, TestCases::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_automation_scripts_owner")
                            .from(AutomationScripts::Table, AutomationScripts::OwnerId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_automation_scripts_test_case_id")
                    .table(AutomationScripts::Table)
                    .col(AutomationScripts::TestCaseId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AutomationScripts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum AutomationScripts {
    Table,
    Id,
    TestCaseId,
    OwnerId,
    Name,
    ScriptPath,
    Status,
    CreatedAt,
    UpdatedAt,
}
