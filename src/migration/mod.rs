//! SeaORM database migrations.

pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_users;
mod m20261001_000002_create_test_cases;
mod m20261001_000003_create_automation_scripts;
mod m20261001_000004_create_test_runs;
mod m20261001_000005_create_tickets;
mod m20261001_000006_create_notifications;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_users::Migration),
            Box::new(m20261001_000002_create_test_cases::Migration),
            Box::new(m20261001_000003_create_automation_scripts::Migration),
            Box::new(m20261001_000004_create_test_runs::Migration),
            Box::new(m20261001_000005_create_tickets::Migration),
            Box::new(m20261001_000006_create_notifications::Migration),
        ]
    }
}
