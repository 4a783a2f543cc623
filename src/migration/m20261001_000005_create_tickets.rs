//! Migration: Create tickets table.
//!
//! The unique index on test_run_id keeps escalation at one ticket per run.

use sea_orm_migration::prelude::*;

use super::m20261001_000001_create_users::Users;
use super::m20261001_000002_create_test_cases::TestCases;
use super::m20261001_000004_create_test_runs::TestRuns;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tickets::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Tickets::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Tickets::Title).string_len(255).not_null())
                    .col(ColumnDef::new(Tickets::Description).text().not_null())
                    .col(
                        ColumnDef::new(Tickets::Status)
                            .string_len(20)
                            .not_null()
                            .default("open"),
                    )
                    .col(ColumnDef::new(Tickets::Priority).string_len(20).not_null())
                    .col(ColumnDef::new(Tickets::Severity).string_len(20).not_null())
                    .col(ColumnDef::new(Tickets::TestCaseId).uuid())
                    .col(ColumnDef::new(Tickets::TestRunId).uuid())
                    .col(ColumnDef::new(Tickets::CreatedBy).uuid().not_null())
                    .col(ColumnDef::new(Tickets::AssignedTo).uuid())
                    .col(
                        ColumnDef::new(Tickets::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Tickets::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tickets_test_case")
                            .from(Tickets::Table, Tickets::TestCaseId)
                            .to(TestCases::Table, TestCases::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tickets_test_run")
                            .from(Tickets::Table, Tickets::TestRunId)
                            .to(TestRuns::Table, TestRuns::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tickets_created_by")
                            .from(Tickets::Table, Tickets::CreatedBy)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tickets_test_run_id")
                    .table(Tickets::Table)
                    .col(Tickets::TestRunId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tickets::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Tickets {
    Table,
    Id,
    Title,
    Description,
    Status,
    Priority,
    Severity,
    TestCaseId,
    TestRunId,
    CreatedBy,
    AssignedTo,
    CreatedAt,
    UpdatedAt,
}
