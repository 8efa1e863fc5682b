//! In-memory stores with the same uniqueness rules as the Postgres schema.
//! Used by handler tests and local runs without a database.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ApplicationError, ApplicationResult};
use crate::models::{
    ApplicationFilter, ApplicationRecord, ApplicationStatus, DedupKeys, NewApplication,
    StatusUpdate, Tenant,
};
use crate::repository::{ApplicationStore, TenantResolver};

#[derive(Default)]
pub struct InMemoryApplicationStore {
    records: RwLock<Vec<ApplicationRecord>>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApplicationStore for InMemoryApplicationStore {
    async fn find_by_dedup_keys(
        &self,
        tenant_id: Uuid,
        keys: &DedupKeys,
    ) -> ApplicationResult<Option<ApplicationRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.matches(tenant_id, keys)).cloned())
    }

    async fn create(&self, input: NewApplication) -> ApplicationResult<ApplicationRecord> {
        let mut records = self.records.write().await;

        let keys = DedupKeys::from(&input.message);
        if let Some(existing) = records.iter().find(|r| r.matches(input.tenant_id, &keys)) {
            return Err(ApplicationError::Duplicate(format!(
                "dedup keys collide with application {}",
                existing.id
            )));
        }

        let record = input.into_record(Uuid::now_v7(), Utc::now());
        records.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> ApplicationResult<Option<ApplicationRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn count(&self, tenant_id: Uuid) -> ApplicationResult<u64> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| r.tenant_id == tenant_id).count() as u64)
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        filter: ApplicationFilter,
    ) -> ApplicationResult<Vec<ApplicationRecord>> {
        let records = self.records.read().await;

        // Insertion order is creation order
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.tenant_id == tenant_id)
            .filter(|r| filter.status.is_none_or(|status| r.status == status))
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: ApplicationStatus,
        update: StatusUpdate,
    ) -> ApplicationResult<ApplicationRecord> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(ApplicationError::NotFound(id))?;

        if record.status != expected {
            return Err(ApplicationError::InvalidTransition {
                from: record.status,
                to: update.status,
            });
        }

        let now = Utc::now();
        record.processed_at = update.processed_at(record.processed_at, now);
        record.status = update.status;
        if let Some(payment_status) = update.payment_status {
            record.payment_status = Some(payment_status);
        }
        if let Some(notes) = update.processing_notes {
            record.processing_notes = Some(notes);
        }
        record.updated_at = now;

        Ok(record.clone())
    }
}

#[derive(Default)]
pub struct InMemoryTenantResolver {
    tenants: RwLock<HashMap<String, Tenant>>,
}

impl InMemoryTenantResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an active tenant and return it
    pub async fn add_tenant(&self, slug: &str) -> Tenant {
        let tenant = Tenant {
            id: Uuid::now_v7(),
            slug: slug.to_string(),
            name: format!("Tenant {slug}"),
            is_active: true,
        };
        self.insert(tenant.clone()).await;
        tenant
    }

    pub async fn insert(&self, tenant: Tenant) {
        self.tenants.write().await.insert(tenant.slug.clone(), tenant);
    }
}

#[async_trait]
impl TenantResolver for InMemoryTenantResolver {
    async fn get_tenant_by_slug(&self, slug: &str) -> ApplicationResult<Option<Tenant>> {
        Ok(self.tenants.read().await.get(slug).cloned())
    }
}
