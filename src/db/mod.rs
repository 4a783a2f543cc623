//! Database module providing connection management, migrations, and queries.
//!
//! Query functions are free functions generic over `ConnectionTrait` so the
//! same code runs against the pool or inside a transaction.

pub mod automation_scripts;
pub mod notifications;
pub mod test_cases;
pub mod test_runs;
pub mod tickets;
pub mod users;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DatabaseTransaction, TransactionTrait};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};
use crate::migration::Migrator;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration.
    pub async fn new(config: &DatabaseConfig) -> AppResult<Self> {
        Self::connect(&config.url, config.max_connections).await
    }

    /// Connect to `url` with at most `max_connections` pooled connections.
    ///
    /// In-memory SQLite databases are per connection, so they are pinned to one.
    pub async fn connect(url: &str, max_connections: u32) -> AppResult<Self> {
        let max_connections = if url.contains(":memory:") {
            1
        } else {
            max_connections.max(1)
        };

        let mut options = ConnectOptions::new(url.to_string());
        options.max_connections(max_connections).sqlx_logging(false);

        let conn = Database::connect(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to database: {}", e)))?;

        Ok(DbPool { conn })
    }

    /// Get access to the connection for executing queries.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Start a transaction.
    ///
    /// Callers must not touch `connection()` until the transaction is
    /// committed or dropped; a single-connection pool would deadlock.
    pub async fn begin(&self) -> AppResult<DatabaseTransaction> {
        self.conn
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))
    }

    /// Apply all pending schema migrations.
    pub async fn run_migrations(&self) -> AppResult<()> {
        let pending = Migrator::get_pending_migrations(&self.conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to read migration state: {}", e)))?;

        if pending.is_empty() {
            info!("No pending migrations");
            return Ok(());
        }

        info!("{} migration(s) pending", pending.len());
        Migrator::up(&self.conn, None)
            .await
            .map_err(|e| AppError::Database(format!("Migration failed: {}", e)))?;
        info!("Migrations applied successfully");

        Ok(())
    }
}

/// Parse an enum stored as text, reporting the column on corruption.
pub(crate) fn parse_column<T>(
    value: &str,
    column: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> AppResult<T> {
    parse(value).ok_or_else(|| {
        AppError::Database(format!("Unexpected value '{}' in column {}", value, column))
    })
}
