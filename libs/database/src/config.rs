use core_config::{env_or_default, env_parse, env_required, ConfigError, FromEnv};
use sea_orm::ConnectOptions;
use std::time::Duration;
use tracing::log::LevelFilter;

/// PostgreSQL pool settings
///
/// Environment variables:
/// - `DATABASE_URL`, or `DB_HOST`/`DB_PORT`/`DB_USER`/`DB_PASSWORD`/`DB_NAME`
/// - `DB_MAX_CONNECTIONS` (default 10), `DB_MIN_CONNECTIONS` (default 1)
/// - `DB_CONNECT_TIMEOUT_SECS`, `DB_ACQUIRE_TIMEOUT_SECS` (default 8)
/// - `DB_SQLX_LOGGING` (default false)
#[derive(Clone, Debug)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub acquire_timeout: Duration,
    pub sqlx_logging: bool,
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(8),
            acquire_timeout: Duration::from_secs(8),
            sqlx_logging: false,
        }
    }

    pub fn with_pool_size(mut self, max_connections: u32, min_connections: u32) -> Self {
        self.max_connections = max_connections;
        self.min_connections = min_connections.min(max_connections);
        self
    }

    pub fn connect_options(&self) -> ConnectOptions {
        let mut options = ConnectOptions::new(&self.url);
        options
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect_timeout(self.connect_timeout)
            .acquire_timeout(self.acquire_timeout)
            .sqlx_logging(self.sqlx_logging)
            .sqlx_logging_level(LevelFilter::Debug);
        options
    }

    /// URL with the password masked, for logs
    pub fn redacted_url(&self) -> String {
        match (self.url.find("://"), self.url.rfind('@')) {
            (Some(scheme), Some(at)) if at > scheme => {
                let credentials = &self.url[scheme + 3..at];
                let user = credentials.split(':').next().unwrap_or_default();
                format!("{}{}:***{}", &self.url[..scheme + 3], user, &self.url[at..])
            }
            _ => self.url.clone(),
        }
    }
}

fn url_from_parts() -> Result<String, ConfigError> {
    let host = env_or_default("DB_HOST", "localhost");
    let port: u16 = env_parse("DB_PORT", 5432)?;
    let user = env_required("DB_USER")?;
    let password = env_required("DB_PASSWORD")?;
    let name = env_or_default("DB_NAME", "ussd");
    Ok(format!("postgres://{user}:{password}@{host}:{port}/{name}"))
}

impl FromEnv for PostgresConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let url = match env_required("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => url_from_parts().map_err(|_| ConfigError::MissingEnvVar(
                "DATABASE_URL (or DB_USER and DB_PASSWORD)".to_string(),
            ))?,
        };

        let max_connections: u32 = env_parse("DB_MAX_CONNECTIONS", 10)?;
        let min_connections: u32 = env_parse("DB_MIN_CONNECTIONS", 1)?;

        Ok(Self {
            url,
            max_connections,
            min_connections: min_connections.min(max_connections),
            connect_timeout: Duration::from_secs(env_parse("DB_CONNECT_TIMEOUT_SECS", 8)?),
            acquire_timeout: Duration::from_secs(env_parse("DB_ACQUIRE_TIMEOUT_SECS", 8)?),
            sqlx_logging: env_parse("DB_SQLX_LOGGING", false)?,
        })
    }
}
