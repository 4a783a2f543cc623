//! Migration: Create test_cases table.

use sea_orm_migration::prelude::*;

use super::m20261001_000001_create_users::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TestCases::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(TestCases::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(TestCases::Title).string_len(255).not_null())
                    .col(ColumnDef::new(TestCases::Steps).json_binary().not_null())
                    .col(ColumnDef::new(TestCases::ExpectedResult).text())
                    .col(
                        ColumnDef::new(TestCases::Priority)
                            .string_len(20)
                            .not_null()
                            .default("medium"),
                    )
                    .col(
                        ColumnDef::new(TestCases::Status)
                            .string_len(20)
                            .not_null()
                            .default("draft"),
                    )
                    .col(ColumnDef::new(TestCases::CreatedBy).uuid().not_null())
                    .col(ColumnDef::new(TestCases::AssignedTo).uuid())
                    .col(
                        ColumnDef::new(TestCases::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TestCases::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_test_cases_created_by")
                            .from(TestCases::Table, TestCases::CreatedBy)
                            .to(Users::Table, Users::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_test_cases_assigned_to")
                            .from(TestCases::Table, TestCases::AssignedTo)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_test_cases_status")
                    .table(TestCases::Table)
                    .col(TestCases::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TestCases::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum TestCases {
    Table,
    Id,
    Title,
    Steps,
    ExpectedResult,
    Priority,
    Status,
    CreatedBy,
    AssignedTo,
    CreatedAt,
    UpdatedAt,
}
