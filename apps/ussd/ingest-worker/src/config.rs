//! Configuration for the ingest worker

use amqp_worker::BrokerConfig;
use core_config::server::HealthServerConfig;
use core_config::{env_or_default, env_parse, ConfigError, FromEnv};
use database::{PostgresConfig, RetryConfig};

pub const DEFAULT_TENANT_SLUG: &str = "default";

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Every ingested record belongs to this tenant
    pub tenant_slug: String,
    pub run_migrations: bool,
    pub health: HealthServerConfig,
    pub broker: BrokerConfig,
    pub database: PostgresConfig,
    pub database_retry: RetryConfig,
}

/// `TENANT_SLUG` (default `default`), `RUN_MIGRATIONS` (default true), plus
/// the health, broker and database variables.
impl FromEnv for IngestConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            tenant_slug: env_or_default("TENANT_SLUG", DEFAULT_TENANT_SLUG),
            run_migrations: env_parse("RUN_MIGRATIONS", true)?,
            health: HealthServerConfig::from_env()?,
            broker: BrokerConfig::from_env()?,
            database: PostgresConfig::from_env()?,
            database_retry: RetryConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_need_only_a_database() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgres://app:pw@localhost/ussd")),
                ("TENANT_SLUG", None),
                ("RUN_MIGRATIONS", None),
                ("HEALTH_PORT", None),
                ("QUEUE_NAME", None),
            ],
            || {
                let config = IngestConfig::from_env().unwrap();
                assert_eq!(config.tenant_slug, "default");
                assert!(config.run_migrations);
                assert_eq!(config.health.port, 8081);
                assert_eq!(config.broker.topology.queue, "ussd_loan_applications");
            },
        );
    }

    #[test]
    fn test_overrides() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgres://app:pw@localhost/ussd")),
                ("TENANT_SLUG", Some("zm-lusaka")),
                ("RUN_MIGRATIONS", Some("false")),
                ("HEALTH_PORT", Some("9100")),
            ],
            || {
                let config = IngestConfig::from_env().unwrap();
                assert_eq!(config.tenant_slug, "zm-lusaka");
                assert!(!config.run_migrations);
                assert_eq!(config.health.port, 9100);
            },
        );
    }

    #[test]
    fn test_malformed_flag_is_an_error() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgres://app:pw@localhost/ussd")),
                ("RUN_MIGRATIONS", Some("sometimes")),
            ],
            || {
                let err = IngestConfig::from_env().unwrap_err();
                assert!(err.to_string().contains("RUN_MIGRATIONS"));
            },
        );
    }
}
