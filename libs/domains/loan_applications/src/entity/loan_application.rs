use crate::error::ApplicationError;
use crate::models::{ApplicationRecord, ApplicationStatus, NewApplication, PayoutFields, PayoutMethod};
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;

/// Sea-ORM Entity for the loan_applications table
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "loan_applications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub message_id: String,
    pub reference_number: String,
    pub loan_application_ussd_id: i64,
    pub full_name: String,
    pub national_id: String,
    pub phone_number: String,
    pub loan_product_id: String,
    pub loan_product_name: String,
    #[sea_orm(column_type = "Double")]
    pub principal_amount: f64,
    pub loan_term_months: i32,
    pub payout_method: i16,
    pub mobile_money_provider: Option<String>,
    pub mobile_money_number: Option<String>,
    pub branch_name: Option<String>,
    pub office_id: Option<String>,
    pub bank_name: Option<String>,
    pub bank_branch: Option<String>,
    pub bank_account_number: Option<String>,
    pub status: ApplicationStatus,
    pub payment_status: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub processing_notes: Option<String>,
    pub source: String,
    pub channel: String,
    pub queued_at: DateTimeWithTimeZone,
    pub processed_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id"
    )]
    Tenant,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

// Payout columns are only consistent if written through `PayoutMethod`
impl TryFrom<Model> for ApplicationRecord {
    type Error = ApplicationError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let payout = PayoutMethod::from_fields(
            model.payout_method,
            PayoutFields {
                mobile_money_provider: model.mobile_money_provider,
                mobile_money_number: model.mobile_money_number,
                branch_name: model.branch_name,
                office_id: model.office_id,
                bank_name: model.bank_name,
                bank_branch: model.bank_branch,
                bank_account_number: model.bank_account_number,
            },
        )
        .map_err(|e| {
            ApplicationError::Database(format!("loan application {} is corrupt: {e}", model.id))
        })?;

        Ok(Self {
            id: model.id,
            tenant_id: model.tenant_id,
            message_id: model.message_id,
            reference_number: model.reference_number,
            loan_application_ussd_id: model.loan_application_ussd_id,
            full_name: model.full_name,
            national_id: model.national_id,
            phone_number: model.phone_number,
            loan_product_id: model.loan_product_id,
            loan_product_name: model.loan_product_name,
            principal_amount: model.principal_amount,
            loan_term_months: model.loan_term_months,
            payout,
            status: model.status,
            payment_status: model.payment_status,
            processing_notes: model.processing_notes,
            source: model.source,
            channel: model.channel,
            queued_at: model.queued_at.into(),
            processed_at: model.processed_at.map(Into::into),
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        })
    }
}

impl From<NewApplication> for ActiveModel {
    fn from(input: NewApplication) -> Self {
        let now = chrono::Utc::now();
        let message = input.message;
        let payout = message.payout.fields();

        ActiveModel {
            id: Set(Uuid::now_v7()),
            tenant_id: Set(input.tenant_id),
            message_id: Set(message.message_id),
            reference_number: Set(message.reference_number),
            loan_application_ussd_id: Set(message.loan_application_ussd_id),
            full_name: Set(message.full_name),
            national_id: Set(message.national_id),
            phone_number: Set(message.phone_number),
            loan_product_id: Set(message.loan_product_id),
            loan_product_name: Set(message.loan_product_name),
            principal_amount: Set(message.principal_amount),
            loan_term_months: Set(message.loan_term_months),
            payout_method: Set(message.payout.code()),
            mobile_money_provider: Set(payout.mobile_money_provider),
            mobile_money_number: Set(payout.mobile_money_number),
            branch_name: Set(payout.branch_name),
            office_id: Set(payout.office_id),
            bank_name: Set(payout.bank_name),
            bank_branch: Set(payout.bank_branch),
            bank_account_number: Set(payout.bank_account_number),
            status: Set(input.status),
            payment_status: Set(None),
            processing_notes: Set(None),
            source: Set(message.source),
            channel: Set(message.channel),
            queued_at: Set(message.queued_at.into()),
            processed_at: Set(Some(input.processed_at.into())),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
    }
}
