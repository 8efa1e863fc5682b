//! Loan Applications Domain
//!
//! Durable, deduplicated storage of loan applications submitted over USSD,
//! and the message processor that ingests them from the broker.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ IngestionHandler │  ← Processor<InboundMessage>: tenant + error category
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │     Service      │  ← Dedup, insert-race recovery, status progression
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │      Store       │  ← ApplicationStore / TenantResolver (Postgres, memory)
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │      Models      │  ← Wire message, records, status, payout method
//! └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_loan_applications::{
//!     ApplicationService, IngestionHandler, PgApplicationStore, PgTenantResolver,
//! };
//! use sea_orm::Database;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::connect("postgres://...").await?;
//!
//! let service = ApplicationService::new(PgApplicationStore::new(db.clone()));
//! let handler = IngestionHandler::new(service, Arc::new(PgTenantResolver::new(db)), "default");
//! # Ok(())
//! # }
//! ```

pub mod entity;
pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod processor;
pub mod repository;
pub mod service;

pub use error::{ApplicationError, ApplicationResult};
pub use memory::{InMemoryApplicationStore, InMemoryTenantResolver};
pub use models::{
    ApplicationFilter, ApplicationRecord, ApplicationStatus, DedupKeys, InboundMessage,
    IngestOutcome, NewApplication, PayoutFields, PayoutMethod, SchemaError, StatusUpdate, Tenant,
};
pub use postgres::{PgApplicationStore, PgTenantResolver};
pub use processor::IngestionHandler;
pub use repository::{ApplicationStore, TenantResolver};
pub use service::ApplicationService;
