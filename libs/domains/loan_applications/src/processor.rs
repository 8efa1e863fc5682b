use async_trait::async_trait;
use messaging::{ProcessingError, Processor};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::ApplicationError;
use crate::models::{InboundMessage, IngestOutcome, Tenant};
use crate::repository::{ApplicationStore, TenantResolver};
use crate::service::ApplicationService;

/// Turns each consumed [`InboundMessage`] into at most one stored record.
///
/// Redelivery is safe: a message whose dedup keys are already stored is a
/// successful no-op. Every record is attached to the tenant configured for
/// this consumer.
pub struct IngestionHandler<S: ApplicationStore, T: TenantResolver> {
    service: ApplicationService<S>,
    tenants: Arc<T>,
    tenant_slug: String,
}

impl<S: ApplicationStore, T: TenantResolver> IngestionHandler<S, T> {
    pub fn new(
        service: ApplicationService<S>,
        tenants: Arc<T>,
        tenant_slug: impl Into<String>,
    ) -> Self {
        Self {
            service,
            tenants,
            tenant_slug: tenant_slug.into(),
        }
    }

    pub fn tenant_slug(&self) -> &str {
        &self.tenant_slug
    }

    async fn resolve_tenant(&self) -> Result<Tenant, ApplicationError> {
        self.tenants
            .get_tenant_by_slug(&self.tenant_slug)
            .await?
            .filter(|tenant| tenant.is_active)
            .ok_or_else(|| ApplicationError::TenantNotFound(self.tenant_slug.clone()))
    }
}

impl From<ApplicationError> for ProcessingError {
    fn from(err: ApplicationError) -> Self {
        match err {
            // The store is unavailable or another writer got in between;
            // a redelivery will either succeed or find the record.
            ApplicationError::Database(_) | ApplicationError::Duplicate(_) => {
                ProcessingError::transient_with_source("loan application store failed", err)
            }
            ApplicationError::TenantNotFound(_)
            | ApplicationError::Validation(_)
            | ApplicationError::NotFound(_)
            | ApplicationError::InvalidTransition { .. } => {
                ProcessingError::permanent_with_source("loan application rejected", err)
            }
        }
    }
}

#[async_trait]
impl<S, T> Processor<InboundMessage> for IngestionHandler<S, T>
where
    S: ApplicationStore + 'static,
    T: TenantResolver + 'static,
{
    #[instrument(
        skip(self, message),
        fields(
            message_id = %message.message_id,
            reference_number = %message.reference_number,
            tenant = %self.tenant_slug,
        )
    )]
    async fn process(&self, message: &InboundMessage) -> Result<(), ProcessingError> {
        let tenant = self.resolve_tenant().await.inspect_err(|e| {
            warn!(error = %e, "Tenant resolution failed");
        })?;

        match self.service.ingest(tenant.id, message).await? {
            IngestOutcome::Created(record) => {
                info!(
                    application_id = %record.id,
                    tenant_id = %tenant.id,
                    status = %record.status,
                    "Loan application ingested"
                );
            }
            IngestOutcome::Duplicate(record) => {
                info!(
                    application_id = %record.id,
                    tenant_id = %tenant.id,
                    "Loan application already ingested, skipping"
                );
            }
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "loan_application_ingestion"
    }

    async fn health_check(&self) -> Result<bool, ProcessingError> {
        Ok(self.resolve_tenant().await.is_ok())
    }
}
