//! SQLite adapters for the orchestrator's domain ports.

pub mod card_repository;
pub mod connection;
pub mod execution_repository;
pub mod goal_repository;
pub mod migrations;
pub mod orchestrator_log_repository;
pub mod short_term_memory;

pub use card_repository::SqliteCardRepository;
pub use connection::{create_pool, create_test_pool, verify_connection, ConnectionError, PoolConfig};
pub use execution_repository::SqliteExecutionRepository;
pub use goal_repository::SqliteGoalRepository;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use orchestrator_log_repository::SqliteOrchestratorLogRepository;
pub use short_term_memory::SqliteShortTermMemory;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};

/// Parse a UUID string from a SQLite row field.
pub fn parse_uuid(s: &str) -> OrchestratorResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| OrchestratorError::Internal(anyhow::anyhow!(e)))
}

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> OrchestratorResult<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| OrchestratorError::Internal(anyhow::anyhow!(e)))
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
}

pub async fn initialize_database(database_url: &str) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(database_url, None).await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}

/// Create an in-memory test pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}
