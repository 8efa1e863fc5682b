use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ApplicationResult;
use crate::models::{
    ApplicationFilter, ApplicationRecord, ApplicationStatus, DedupKeys, NewApplication,
    StatusUpdate, Tenant,
};

/// Persistence for loan applications.
///
/// Implementations must enforce per-tenant uniqueness of each dedup key at
/// write time and report a violation as `ApplicationError::Duplicate`;
/// several consumers may insert the same application concurrently.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Record in `tenant_id` matching any one of the keys
    async fn find_by_dedup_keys(
        &self,
        tenant_id: Uuid,
        keys: &DedupKeys,
    ) -> ApplicationResult<Option<ApplicationRecord>>;

    async fn create(&self, input: NewApplication) -> ApplicationResult<ApplicationRecord>;

    async fn get(&self, id: Uuid) -> ApplicationResult<Option<ApplicationRecord>>;

    async fn count(&self, tenant_id: Uuid) -> ApplicationResult<u64>;

    /// Newest first
    async fn list(
        &self,
        tenant_id: Uuid,
        filter: ApplicationFilter,
    ) -> ApplicationResult<Vec<ApplicationRecord>>;

    /// Apply `update` only if the record is still in `expected` status.
    async fn update_status(
        &self,
        id: Uuid,
        expected: ApplicationStatus,
        update: StatusUpdate,
    ) -> ApplicationResult<ApplicationRecord>;
}

/// Tenant lookup by slug
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TenantResolver: Send + Sync {
    async fn get_tenant_by_slug(&self, slug: &str) -> ApplicationResult<Option<Tenant>>;
}
