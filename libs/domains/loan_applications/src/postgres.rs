use async_trait::async_trait;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    entity::{loan_application, tenant},
    error::{ApplicationError, ApplicationResult},
    models::{
        ApplicationFilter, ApplicationRecord, ApplicationStatus, DedupKeys, NewApplication,
        StatusUpdate, Tenant,
    },
    repository::{ApplicationStore, TenantResolver},
};

pub struct PgApplicationStore {
    db: DatabaseConnection,
}

impl PgApplicationStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ApplicationStore for PgApplicationStore {
    async fn find_by_dedup_keys(
        &self,
        tenant_id: Uuid,
        keys: &DedupKeys,
    ) -> ApplicationResult<Option<ApplicationRecord>> {
        let model = loan_application::Entity::find()
            .filter(loan_application::Column::TenantId.eq(tenant_id))
            .filter(
                Condition::any()
                    .add(loan_application::Column::MessageId.eq(keys.message_id.as_str()))
                    .add(
                        loan_application::Column::ReferenceNumber
                            .eq(keys.reference_number.as_str()),
                    )
                    .add(
                        loan_application::Column::LoanApplicationUssdId
                            .eq(keys.loan_application_ussd_id),
                    ),
            )
            .order_by_asc(loan_application::Column::CreatedAt)
            .one(&self.db)
            .await?;

        model.map(TryInto::try_into).transpose()
    }

    async fn create(&self, input: NewApplication) -> ApplicationResult<ApplicationRecord> {
        let active_model: loan_application::ActiveModel = input.into();
        let model = active_model.insert(&self.db).await?;

        tracing::info!(
            application_id = %model.id,
            tenant_id = %model.tenant_id,
            message_id = %model.message_id,
            "Created loan application"
        );
        model.try_into()
    }

    async fn get(&self, id: Uuid) -> ApplicationResult<Option<ApplicationRecord>> {
        let model = loan_application::Entity::find_by_id(id)
            .one(&self.db)
            .await?;

        model.map(TryInto::try_into).transpose()
    }

    async fn count(&self, tenant_id: Uuid) -> ApplicationResult<u64> {
        let count = loan_application::Entity::find()
            .filter(loan_application::Column::TenantId.eq(tenant_id))
            .count(&self.db)
            .await?;

        Ok(count)
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        filter: ApplicationFilter,
    ) -> ApplicationResult<Vec<ApplicationRecord>> {
        let mut query = loan_application::Entity::find()
            .filter(loan_application::Column::TenantId.eq(tenant_id));

        if let Some(status) = filter.status {
            query = query.filter(loan_application::Column::Status.eq(status));
        }

        let models = query
            .order_by_desc(loan_application::Column::CreatedAt)
            .order_by_desc(loan_application::Column::Id)
            .limit(filter.limit)
            .offset(filter.offset)
            .all(&self.db)
            .await?;

        models.into_iter().map(TryInto::try_into).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: ApplicationStatus,
        update: StatusUpdate,
    ) -> ApplicationResult<ApplicationRecord> {
        let txn = self.db.begin().await?;

        // Row lock serializes concurrent transitions of the same record
        let model = loan_application::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(ApplicationError::NotFound(id))?;

        if model.status != expected {
            return Err(ApplicationError::InvalidTransition {
                from: model.status,
                to: update.status,
            });
        }

        let now = chrono::Utc::now();
        let processed_at = update.processed_at(model.processed_at.map(Into::into), now);

        let mut active_model: loan_application::ActiveModel = model.into();
        active_model.status = Set(update.status);
        if let Some(payment_status) = update.payment_status {
            active_model.payment_status = Set(Some(payment_status));
        }
        if let Some(notes) = update.processing_notes {
            active_model.processing_notes = Set(Some(notes));
        }
        active_model.processed_at = Set(processed_at.map(Into::into));
        active_model.updated_at = Set(now.into());

        let updated = active_model.update(&txn).await?;
        txn.commit().await?;

        tracing::info!(
            application_id = %id,
            from = %expected,
            to = %updated.status,
            "Updated loan application status"
        );
        updated.try_into()
    }
}

pub struct PgTenantResolver {
    db: DatabaseConnection,
}

impl PgTenantResolver {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TenantResolver for PgTenantResolver {
    async fn get_tenant_by_slug(&self, slug: &str) -> ApplicationResult<Option<Tenant>> {
        let model = tenant::Entity::find()
            .filter(tenant::Column::Slug.eq(slug))
            .one(&self.db)
            .await?;

        Ok(model.map(Into::into))
    }
}
