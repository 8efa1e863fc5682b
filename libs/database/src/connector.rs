use sea_orm::{Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use crate::config::PostgresConfig;
use crate::error::{DatabaseError, DatabaseResult};
use crate::retry::{retry_with_backoff, RetryConfig};

/// Open a pool with the configured limits.
pub async fn connect(config: &PostgresConfig) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(config.connect_options()).await?;
    info!(url = %config.redacted_url(), "Connected to PostgreSQL");
    Ok(db)
}

/// [`connect`] with exponential backoff, for startup ordering against a
/// database that may still be coming up.
pub async fn connect_with_retry(
    config: PostgresConfig,
    retry: RetryConfig,
) -> DatabaseResult<DatabaseConnection> {
    let attempts = retry.max_retries + 1;
    retry_with_backoff(|| connect(&config), retry)
        .await
        .map_err(|source| DatabaseError::ConnectionFailed { attempts, source })
}

/// Apply pending migrations from `M`.
pub async fn run_migrations<M: MigratorTrait>(
    db: &DatabaseConnection,
    app_name: &str,
) -> DatabaseResult<()> {
    info!(app = app_name, "Running database migrations");
    M::up(db, None)
        .await
        .map_err(|e| DatabaseError::MigrationError(e.to_string()))?;
    info!(app = app_name, "Migrations complete");
    Ok(())
}
