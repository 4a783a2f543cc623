//! Migration: Create test_runs table.
//!
//! Runs move pending -> running -> {passed, failed, blocked, skipped}.
//! `escalated_at` records that the terminal-transition cascade was applied;
//! `escalation_attempts` counts failed attempts so recovery can give up.

use sea_orm_migration::prelude::*;

use super::m20261001_000001_create_users::Users;
use super::m20261001_000002_create_test_cases::TestCases;
use super::m20261001_000003_create_automation_scripts::AutomationScripts;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TestRuns::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(TestRuns::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(TestRuns::TestCaseId).uuid().not_null())
                    .col(ColumnDef::new(TestRuns::AutomationScriptId).uuid())
                    .col(ColumnDef::new(TestRuns::ExecutedBy).uuid().not_null())
                    .col(
                        ColumnDef::new(TestRuns::Status)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(TestRuns::DurationSecs).big_integer())
                    .col(ColumnDef::new(TestRuns::Notes).text())
                    .col(ColumnDef::new(TestRuns::ScreenshotRef).string_len(500))
                    .col(ColumnDef::new(TestRuns::VideoRef).string_len(500))
                    .col(ColumnDef::new(TestRuns::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(TestRuns::CompletedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(TestRuns::EscalatedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(TestRuns::EscalationAttempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(TestRuns::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TestRuns::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_test_runs_test_case")
                            .from(TestRuns::Table, TestRuns::TestCaseId)
                            .to(TestCases::Table, TestCases::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_test_runs_automation_script")
                            .from(TestRuns::Table, TestRuns::AutomationScriptId)
                            .to(AutomationScripts::Table, AutomationScripts::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_test_runs_executed_by")
                            .from(TestRuns::Table, TestRuns::ExecutedBy)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Test case history lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_test_runs_test_case_id")
                    .table(TestRuns::Table)
                    .col(TestRuns::TestCaseId)
                    .to_owned(),
            )
            .await?;

        // Recovery sweep: stale running runs and undelivered escalations
        manager
            .create_index(
                Index::create()
                    .name("idx_test_runs_status")
                    .table(TestRuns::Table)
                    .col(TestRuns::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TestRuns::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum TestRuns {
    Table,
    Id,
    TestCaseId,
    AutomationScriptId,
    ExecutedBy,
    Status,
    DurationSecs,
    Notes,
    ScreenshotRef,
    VideoRef,
    StartedAt,
    CompletedAt,
    EscalatedAt,
    EscalationAttempts,
    CreatedAt,
    UpdatedAt,
}
