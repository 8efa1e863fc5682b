//! Shared test utilities for the ingestion pipeline
//!
//! - `TestDatabase`: PostgreSQL container with the workspace migrations applied (feature: "postgres")
//! - `TestRabbitMq`: RabbitMQ container (feature: "rabbitmq")
//! - `TestDataBuilder`: Deterministic test identifiers (always available)
//!
//! # Features
//!
//! - `postgres` (default): Enables PostgreSQL test infrastructure
//! - `rabbitmq`: Enables RabbitMQ test infrastructure
//! - `all`: Enables everything
//!
//! # Usage
//!
//! ```rust,no_run
//! use test_utils::{TestDatabase, TestDataBuilder};
//!
//! #[tokio::test]
//! async fn my_postgres_test() {
//!     let db = TestDatabase::new().await;
//!     let builder = TestDataBuilder::from_test_name("my_test");
//!
//!     let tenant_id = db.create_test_tenant("north").await;
//!     let message_id = builder.message_id("first");
//! }
//! ```
//!
//! Broker tests add `features = ["rabbitmq"]` to their dev-dependencies:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { workspace = true, features = ["rabbitmq"] }
//! ```

// Conditionally compile infrastructure modules based on features
#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "rabbitmq")]
mod rabbitmq;

#[cfg(feature = "postgres")]
pub use postgres::TestDatabase;

#[cfg(feature = "rabbitmq")]
pub use rabbitmq::TestRabbitMq;

/// Builder for test data with deterministic randomization
///
/// This ensures tests are reproducible by using seeded random data.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed (for deterministic tests)
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// This is the recommended way to create a builder for consistent test data.
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_ingest_is_idempotent");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Broker message id, e.g. `msg-12345-first`
    pub fn message_id(&self, suffix: &str) -> String {
        format!("msg-{}-{}", self.seed, suffix)
    }

    /// Human-facing application reference, e.g. `REF-12345-first`
    pub fn reference_number(&self, suffix: &str) -> String {
        format!("REF-{}-{}", self.seed, suffix)
    }

    /// Externally assigned USSD application id; `offset` distinguishes
    /// several applications within one test
    pub fn ussd_id(&self, offset: u32) -> i64 {
        // Keep it positive and clear of i64 overflow.
        ((self.seed % 1_000_000_000) as i64) * 1_000 + i64::from(offset)
    }

    /// Generic unique name, e.g. `test-queue-12345-main`
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_builder_deterministic() {
        let builder1 = TestDataBuilder::new(42);
        let builder2 = TestDataBuilder::new(42);

        assert_eq!(builder1.message_id("a"), builder2.message_id("a"));
        assert_eq!(builder1.ussd_id(1), builder2.ussd_id(1));
    }

    #[test]
    fn test_data_builder_from_name() {
        let builder1 = TestDataBuilder::from_test_name("my_test");
        let builder2 = TestDataBuilder::from_test_name("my_test");

        assert_eq!(builder1.reference_number("a"), builder2.reference_number("a"));
    }

    #[test]
    fn test_data_builder_different_names() {
        let builder1 = TestDataBuilder::from_test_name("test1");
        let builder2 = TestDataBuilder::from_test_name("test2");

        // Different test names should generate different data
        assert_ne!(builder1.message_id("a"), builder2.message_id("a"));
        assert_ne!(builder1.name("queue", "main"), builder2.name("queue", "main"));
    }
}
