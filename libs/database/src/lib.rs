//! PostgreSQL connection management for the ingestion services.
//!
//! ```ignore
//! use database::{connect_with_retry, run_migrations, PostgresConfig, RetryConfig};
//! use core_config::FromEnv;
//!
//! let db = connect_with_retry(PostgresConfig::from_env()?, RetryConfig::from_env()?).await?;
//! run_migrations::<migration::Migrator>(&db, "ussd_ingest_worker").await?;
//! ```

mod config;
mod connector;
mod error;
mod health;
mod retry;

pub use config::PostgresConfig;
pub use connector::{connect, connect_with_retry, run_migrations};
pub use error::{DatabaseError, DatabaseResult};
pub use health::check_health;
pub use retry::{retry_with_backoff, RetryConfig};

pub use sea_orm::DatabaseConnection;
