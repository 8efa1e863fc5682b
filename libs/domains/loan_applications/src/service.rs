use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApplicationError, ApplicationResult};
use crate::models::{
    ApplicationFilter, ApplicationRecord, DedupKeys, InboundMessage, IngestOutcome,
    NewApplication, StatusUpdate,
};
use crate::repository::ApplicationStore;

const MAX_PAGE_SIZE: u64 = 500;

/// Service layer for loan application business logic
pub struct ApplicationService<S: ApplicationStore> {
    store: Arc<S>,
}

impl<S: ApplicationStore> Clone for ApplicationService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: ApplicationStore> ApplicationService<S> {
    pub fn new(store: S) -> Self {
        Self::from_arc(Arc::new(store))
    }

    pub fn from_arc(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Persist `message` for `tenant_id` unless a record with any of its
    /// dedup keys already exists.
    ///
    /// Losing an insert race to another consumer surfaces as a unique
    /// violation; the winner's record is then returned as a duplicate.
    #[instrument(
        skip(self, message),
        fields(message_id = %message.message_id, reference_number = %message.reference_number)
    )]
    pub async fn ingest(
        &self,
        tenant_id: Uuid,
        message: &InboundMessage,
    ) -> ApplicationResult<IngestOutcome> {
        let keys = DedupKeys::from(message);

        if let Some(existing) = self.store.find_by_dedup_keys(tenant_id, &keys).await? {
            return Ok(IngestOutcome::Duplicate(existing));
        }

        let input = NewApplication::from_message(tenant_id, message.clone(), Utc::now());
        match self.store.create(input).await {
            Ok(record) => Ok(IngestOutcome::Created(record)),
            Err(ApplicationError::Duplicate(detail)) => {
                warn!(detail = %detail, "Concurrent insert won the race");
                self.store
                    .find_by_dedup_keys(tenant_id, &keys)
                    .await?
                    .map(IngestOutcome::Duplicate)
                    .ok_or(ApplicationError::Duplicate(detail))
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(application_id = %id))]
    pub async fn get(&self, id: Uuid) -> ApplicationResult<ApplicationRecord> {
        self.store
            .get(id)
            .await?
            .ok_or(ApplicationError::NotFound(id))
    }

    pub async fn count(&self, tenant_id: Uuid) -> ApplicationResult<u64> {
        self.store.count(tenant_id).await
    }

    /// List a tenant's applications, newest first
    pub async fn list(
        &self,
        tenant_id: Uuid,
        mut filter: ApplicationFilter,
    ) -> ApplicationResult<Vec<ApplicationRecord>> {
        if filter.limit == 0 {
            return Err(ApplicationError::Validation(
                "limit must be at least 1".to_string(),
            ));
        }
        filter.limit = filter.limit.min(MAX_PAGE_SIZE);

        self.store.list(tenant_id, filter).await
    }

    /// Move an application forward in its lifecycle
    #[instrument(skip(self, update), fields(application_id = %id, to = %update.status))]
    pub async fn update_status(
        &self,
        id: Uuid,
        update: StatusUpdate,
    ) -> ApplicationResult<ApplicationRecord> {
        update.validate()?;

        let current = self.get(id).await?;
        if !current.status.can_transition_to(update.status) {
            return Err(ApplicationError::InvalidTransition {
                from: current.status,
                to: update.status,
            });
        }

        let record = self.store.update_status(id, current.status, update).await?;
        info!(status = %record.status, "Loan application status changed");
        Ok(record)
    }
}
