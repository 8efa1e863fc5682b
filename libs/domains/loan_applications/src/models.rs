use chrono::{DateTime, Utc};
use messaging::Message;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

/// Loan application lifecycle status
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    Default,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(
    rs_type = "String",
    db_type = "Enum",
    enum_name = "loan_application_status"
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    #[default]
    #[sea_orm(string_value = "CREATED")]
    Created,
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "UNDER_REVIEW")]
    UnderReview,
    #[sea_orm(string_value = "APPROVED")]
    Approved,
    #[sea_orm(string_value = "DISBURSED")]
    Disbursed,
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
    #[sea_orm(string_value = "EXPIRED")]
    Expired,
}

impl ApplicationStatus {
    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Disbursed | Self::Rejected | Self::Cancelled | Self::Expired
        )
    }

    /// Position on the main progression; `None` for the exits.
    fn step(&self) -> Option<u8> {
        match self {
            Self::Created => Some(0),
            Self::Pending => Some(1),
            Self::UnderReview => Some(2),
            Self::Approved => Some(3),
            Self::Disbursed => Some(4),
            Self::Rejected | Self::Cancelled | Self::Expired => None,
        }
    }

    /// Forward along `CREATED → PENDING → UNDER_REVIEW → APPROVED → DISBURSED`
    /// (skipping allowed), or to `REJECTED`/`CANCELLED`/`EXPIRED` from any
    /// non-terminal status.
    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.step(), next.step()) {
            (Some(current), Some(target)) => target > current,
            (_, None) => true,
            (None, Some(_)) => false,
        }
    }
}

/// How the approved principal is paid out, selected by the wire
/// discriminator `payoutMethod` (1, 2 or 3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayoutMethod {
    MobileMoney {
        provider: String,
        number: String,
    },
    CashPickup {
        office_id: String,
        branch_name: Option<String>,
    },
    BankTransfer {
        bank_name: String,
        account_number: String,
        bank_branch: Option<String>,
    },
}

impl PayoutMethod {
    pub const MOBILE_MONEY: i16 = 1;
    pub const CASH_PICKUP: i16 = 2;
    pub const BANK_TRANSFER: i16 = 3;

    pub fn code(&self) -> i16 {
        match self {
            Self::MobileMoney { .. } => Self::MOBILE_MONEY,
            Self::CashPickup { .. } => Self::CASH_PICKUP,
            Self::BankTransfer { .. } => Self::BANK_TRANSFER,
        }
    }

    /// Rebuild the variant from its flattened column form.
    pub fn from_fields(code: i16, fields: PayoutFields) -> Result<Self, SchemaError> {
        let required = |value: Option<String>, field: &'static str| {
            value
                .filter(|v| !v.trim().is_empty())
                .ok_or(SchemaError::MissingPayoutField { code, field })
        };

        match code {
            Self::MOBILE_MONEY => Ok(Self::MobileMoney {
                provider: required(fields.mobile_money_provider, "mobileMoneyProvider")?,
                number: required(fields.mobile_money_number, "mobileMoneyNumber")?,
            }),
            Self::CASH_PICKUP => Ok(Self::CashPickup {
                office_id: required(fields.office_id, "officeId")?,
                branch_name: fields.branch_name,
            }),
            Self::BANK_TRANSFER => Ok(Self::BankTransfer {
                bank_name: required(fields.bank_name, "bankName")?,
                account_number: required(fields.bank_account_number, "bankAccountNumber")?,
                bank_branch: fields.bank_branch,
            }),
            other => Err(SchemaError::UnknownPayoutMethod(other)),
        }
    }

    /// Flatten into the optional per-method fields used on the wire and in
    /// storage.
    pub fn fields(&self) -> PayoutFields {
        match self.clone() {
            Self::MobileMoney { provider, number } => PayoutFields {
                mobile_money_provider: Some(provider),
                mobile_money_number: Some(number),
                ..Default::default()
            },
            Self::CashPickup {
                office_id,
                branch_name,
            } => PayoutFields {
                office_id: Some(office_id),
                branch_name,
                ..Default::default()
            },
            Self::BankTransfer {
                bank_name,
                account_number,
                bank_branch,
            } => PayoutFields {
                bank_name: Some(bank_name),
                bank_account_number: Some(account_number),
                bank_branch,
                ..Default::default()
            },
        }
    }
}

/// Method-specific payout fields, all optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_money_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_money_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub office_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_account_number: Option<String>,
}

/// Why a wire payload is not a valid [`InboundMessage`].
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unknown payoutMethod {0}, expected 1, 2 or 3")]
    UnknownPayoutMethod(i16),

    #[error("payoutMethod {code} requires `{field}`")]
    MissingPayoutField { code: i16, field: &'static str },

    #[error("invalid message: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// Product ids arrive as either JSON strings or numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ProductId {
    Text(String),
    Number(i64),
}

impl From<ProductId> for String {
    fn from(id: ProductId) -> Self {
        match id {
            ProductId::Text(text) => text,
            ProductId::Number(number) => number.to_string(),
        }
    }
}

/// Wire shape of a loan application event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInboundMessage {
    message_id: String,
    reference_number: String,
    loan_application_ussd_id: i64,
    full_name: String,
    national_id: String,
    phone_number: String,
    loan_product_id: ProductId,
    loan_product_name: String,
    principal_amount: f64,
    loan_term_months: i32,
    payout_method: i16,
    #[serde(flatten)]
    payout: PayoutFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<ApplicationStatus>,
    #[serde(default = "default_provenance")]
    source: String,
    #[serde(default = "default_provenance")]
    channel: String,
    queued_at: DateTime<Utc>,
}

fn default_provenance() -> String {
    "USSD".to_string()
}

/// A loan application event as produced by the USSD channel.
///
/// Decoding validates the payload: mandatory fields must be present and
/// non-empty, and the payout discriminator must carry the fields its method
/// needs. Anything else fails to deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(try_from = "RawInboundMessage", into = "RawInboundMessage")]
pub struct InboundMessage {
    #[validate(length(min = 1, max = 255))]
    pub message_id: String,
    #[validate(length(min = 1, max = 255))]
    pub reference_number: String,
    #[validate(range(min = 1))]
    pub loan_application_ussd_id: i64,
    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
    #[validate(length(min = 1, max = 64))]
    pub national_id: String,
    #[validate(length(min = 1, max = 32))]
    pub phone_number: String,
    #[validate(length(min = 1, max = 64))]
    pub loan_product_id: String,
    #[validate(length(min = 1, max = 255))]
    pub loan_product_name: String,
    #[validate(range(exclusive_min = 0.0))]
    pub principal_amount: f64,
    #[validate(range(min = 1, max = 600))]
    pub loan_term_months: i32,
    pub payout: PayoutMethod,
    pub status: Option<ApplicationStatus>,
    pub source: String,
    pub channel: String,
    pub queued_at: DateTime<Utc>,
}

impl TryFrom<RawInboundMessage> for InboundMessage {
    type Error = SchemaError;

    fn try_from(raw: RawInboundMessage) -> Result<Self, Self::Error> {
        let message = Self {
            payout: PayoutMethod::from_fields(raw.payout_method, raw.payout)?,
            message_id: raw.message_id,
            reference_number: raw.reference_number,
            loan_application_ussd_id: raw.loan_application_ussd_id,
            full_name: raw.full_name,
            national_id: raw.national_id,
            phone_number: raw.phone_number,
            loan_product_id: raw.loan_product_id.into(),
            loan_product_name: raw.loan_product_name,
            principal_amount: raw.principal_amount,
            loan_term_months: raw.loan_term_months,
            status: raw.status,
            source: raw.source,
            channel: raw.channel,
            queued_at: raw.queued_at,
        };
        message.validate()?;
        Ok(message)
    }
}

impl From<InboundMessage> for RawInboundMessage {
    fn from(message: InboundMessage) -> Self {
        Self {
            payout_method: message.payout.code(),
            payout: message.payout.fields(),
            message_id: message.message_id,
            reference_number: message.reference_number,
            loan_application_ussd_id: message.loan_application_ussd_id,
            full_name: message.full_name,
            national_id: message.national_id,
            phone_number: message.phone_number,
            loan_product_id: ProductId::Text(message.loan_product_id),
            loan_product_name: message.loan_product_name,
            principal_amount: message.principal_amount,
            loan_term_months: message.loan_term_months,
            status: message.status,
            source: message.source,
            channel: message.channel,
            queued_at: message.queued_at,
        }
    }
}

impl Message for InboundMessage {
    fn message_id(&self) -> String {
        self.message_id.clone()
    }

    fn message_type(&self) -> &'static str {
        "loan.application"
    }
}

/// The three values that identify one logical application within a tenant.
/// A stored record matching any one of them is the same application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupKeys {
    pub message_id: String,
    pub reference_number: String,
    pub loan_application_ussd_id: i64,
}

impl From<&InboundMessage> for DedupKeys {
    fn from(message: &InboundMessage) -> Self {
        Self {
            message_id: message.message_id.clone(),
            reference_number: message.reference_number.clone(),
            loan_application_ussd_id: message.loan_application_ussd_id,
        }
    }
}

/// Persisted loan application
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRecord {
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
    pub principal_amount: f64,
    pub loan_term_months: i32,
    pub payout: PayoutMethod,
    pub status: ApplicationStatus,
    pub payment_status: Option<String>,
    pub processing_notes: Option<String>,
    pub source: String,
    pub channel: String,
    pub queued_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationRecord {
    pub fn matches(&self, tenant_id: Uuid, keys: &DedupKeys) -> bool {
        self.tenant_id == tenant_id
            && (self.message_id == keys.message_id
                || self.reference_number == keys.reference_number
                || self.loan_application_ussd_id == keys.loan_application_ussd_id)
    }
}

/// Input for creating a record at ingestion time
#[derive(Debug, Clone, PartialEq)]
pub struct NewApplication {
    pub tenant_id: Uuid,
    pub message: InboundMessage,
    pub status: ApplicationStatus,
    pub processed_at: DateTime<Utc>,
}

impl NewApplication {
    /// Status comes from the message, `CREATED` when absent.
    pub fn from_message(tenant_id: Uuid, message: InboundMessage, now: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            status: message.status.unwrap_or_default(),
            message,
            processed_at: now,
        }
    }

    pub fn into_record(self, id: Uuid, now: DateTime<Utc>) -> ApplicationRecord {
        let message = self.message;
        ApplicationRecord {
            id,
            tenant_id: self.tenant_id,
            message_id: message.message_id,
            reference_number: message.reference_number,
            loan_application_ussd_id: message.loan_application_ussd_id,
            full_name: message.full_name,
            national_id: message.national_id,
            phone_number: message.phone_number,
            loan_product_id: message.loan_product_id,
            loan_product_name: message.loan_product_name,
            principal_amount: message.principal_amount,
            loan_term_months: message.loan_term_months,
            payout: message.payout,
            status: self.status,
            payment_status: None,
            processing_notes: None,
            source: message.source,
            channel: message.channel,
            queued_at: message.queued_at,
            processed_at: Some(self.processed_at),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Explicit status change
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: ApplicationStatus,
    /// Left unchanged when `None`
    #[validate(length(min = 1, max = 64))]
    pub payment_status: Option<String>,
    /// Left unchanged when `None`
    #[validate(length(max = 2000))]
    pub processing_notes: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: ApplicationStatus) -> Self {
        Self {
            status,
            payment_status: None,
            processing_notes: None,
        }
    }

    pub fn with_payment_status(mut self, payment_status: impl Into<String>) -> Self {
        self.payment_status = Some(payment_status.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.processing_notes = Some(notes.into());
        self
    }

    /// `processedAt` after this update: stamped on the first move away from
    /// `CREATED`, otherwise kept.
    pub fn processed_at(
        &self,
        current: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match current {
            Some(at) => Some(at),
            None if self.status != ApplicationStatus::Created => Some(now),
            None => None,
        }
    }
}

/// Query filters for listing applications
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationFilter {
    pub status: Option<ApplicationStatus>,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

impl Default for ApplicationFilter {
    fn default() -> Self {
        Self {
            status: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

fn default_limit() -> u64 {
    50
}

/// Owner of ingested records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub is_active: bool,
}

/// Result of ingesting one message
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Created(ApplicationRecord),
    /// Already ingested; the existing record is returned untouched.
    Duplicate(ApplicationRecord),
}

impl IngestOutcome {
    pub fn record(&self) -> &ApplicationRecord {
        match self {
            Self::Created(record) | Self::Duplicate(record) => record,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire() -> serde_json::Value {
        json!({
            "messageId": "m1",
            "referenceNumber": "r1",
            "loanApplicationUssdId": 42,
            "fullName": "Jane Doe",
            "nationalId": "ID-123",
            "phoneNumber": "+260970000000",
            "loanProductId": 7,
            "loanProductName": "Salary Advance",
            "principalAmount": 1000.0,
            "loanTermMonths": 6,
            "payoutMethod": 1,
            "mobileMoneyProvider": "MTN",
            "mobileMoneyNumber": "0970000000",
            "status": "CREATED",
            "source": "USSD",
            "channel": "*123#",
            "queuedAt": "2026-01-01T10:00:00Z"
        })
    }

    fn decode(value: serde_json::Value) -> Result<InboundMessage, serde_json::Error> {
        serde_json::from_value(value)
    }

    #[test]
    fn test_decode_mobile_money() {
        let message = decode(wire()).unwrap();

        assert_eq!(message.message_id, "m1");
        assert_eq!(message.loan_application_ussd_id, 42);
        assert_eq!(message.loan_product_id, "7");
        assert_eq!(message.status, Some(ApplicationStatus::Created));
        assert_eq!(
            message.payout,
            PayoutMethod::MobileMoney {
                provider: "MTN".to_string(),
                number: "0970000000".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_cash_pickup_and_bank_transfer() {
        let mut cash = wire();
        cash["payoutMethod"] = json!(2);
        cash["officeId"] = json!("12");
        let message = decode(cash).unwrap();
        assert_eq!(
            message.payout,
            PayoutMethod::CashPickup {
                office_id: "12".to_string(),
                branch_name: None,
            }
        );

        let mut bank = wire();
        bank["payoutMethod"] = json!(3);
        bank["bankName"] = json!("Zanaco");
        bank["bankAccountNumber"] = json!("0011223344");
        bank["bankBranch"] = json!("Cairo Road");
        let message = decode(bank).unwrap();
        assert_eq!(message.payout.code(), PayoutMethod::BANK_TRANSFER);
    }

    #[test]
    fn test_missing_payout_field_is_rejected() {
        let mut value = wire();
        value["payoutMethod"] = json!(3);
        value["bankName"] = json!("Zanaco");

        let err = decode(value).unwrap_err();
        assert!(err.to_string().contains("bankAccountNumber"));
    }

    #[test]
    fn test_unknown_payout_method_is_rejected() {
        let mut value = wire();
        value["payoutMethod"] = json!(9);

        assert!(decode(value).is_err());
    }

    #[test]
    fn test_missing_mandatory_field_is_rejected() {
        let mut value = wire();
        value.as_object_mut().unwrap().remove("referenceNumber");

        let err = decode(value).unwrap_err();
        assert!(err.to_string().contains("referenceNumber"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut empty_id = wire();
        empty_id["messageId"] = json!("");
        assert!(decode(empty_id).is_err());

        let mut zero_principal = wire();
        zero_principal["principalAmount"] = json!(0);
        assert!(decode(zero_principal).is_err());
    }

    #[test]
    fn test_optional_provenance_defaults() {
        let mut value = wire();
        let object = value.as_object_mut().unwrap();
        object.remove("status");
        object.remove("source");
        object.remove("channel");

        let message = decode(value).unwrap();
        assert_eq!(message.status, None);
        assert_eq!(message.source, "USSD");
        assert_eq!(message.channel, "USSD");
    }

    #[test]
    fn test_encode_uses_wire_field_names() {
        let message = decode(wire()).unwrap();
        let encoded = serde_json::to_value(&message).unwrap();

        assert_eq!(encoded["payoutMethod"], json!(1));
        assert_eq!(encoded["mobileMoneyProvider"], json!("MTN"));
        assert_eq!(encoded["loanApplicationUssdId"], json!(42));
        assert!(encoded.get("bankName").is_none());
    }

    #[test]
    fn test_status_progression() {
        use ApplicationStatus::*;

        assert!(Created.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Approved));
        assert!(Approved.can_transition_to(Disbursed));
        assert!(UnderReview.can_transition_to(Rejected));
        assert!(Created.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Created));
        assert!(!Approved.can_transition_to(Approved));
        assert!(!Disbursed.can_transition_to(Rejected));
        assert!(!Expired.can_transition_to(Pending));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(ApplicationStatus::UnderReview.to_string(), "UNDER_REVIEW");
        assert_eq!(
            "UNDER_REVIEW".parse::<ApplicationStatus>().unwrap(),
            ApplicationStatus::UnderReview
        );
    }

    #[test]
    fn test_processed_at_is_stamped_once() {
        let first = Utc::now();
        let later = first + chrono::Duration::minutes(5);

        let pending = StatusUpdate::new(ApplicationStatus::Pending);
        assert_eq!(pending.processed_at(None, first), Some(first));
        assert_eq!(pending.processed_at(Some(first), later), Some(first));

        let created = StatusUpdate::new(ApplicationStatus::Created);
        assert_eq!(created.processed_at(None, first), None);
    }

    #[test]
    fn test_new_application_defaults_status() {
        let mut message = decode(wire()).unwrap();
        message.status = None;
        let now = Utc::now();

        let new = NewApplication::from_message(Uuid::now_v7(), message, now);
        assert_eq!(new.status, ApplicationStatus::Created);

        let record = new.into_record(Uuid::now_v7(), now);
        assert_eq!(record.processed_at, Some(now));
        assert_eq!(record.payment_status, None);
    }
}

#[cfg(test)]
impl InboundMessage {
    /// A valid mobile-money application with the given dedup keys
    pub(crate) fn sample(message_id: &str, reference_number: &str, ussd_id: i64) -> Self {
        Self {
            message_id: message_id.to_string(),
            reference_number: reference_number.to_string(),
            loan_application_ussd_id: ussd_id,
            full_name: "Jane Doe".to_string(),
            national_id: "ID-123".to_string(),
            phone_number: "+260970000000".to_string(),
            loan_product_id: "7".to_string(),
            loan_product_name: "Salary Advance".to_string(),
            principal_amount: 1000.0,
            loan_term_months: 6,
            payout: PayoutMethod::MobileMoney {
                provider: "MTN".to_string(),
                number: "0970000000".to_string(),
            },
            status: Some(ApplicationStatus::Created),
            source: "USSD".to_string(),
            channel: "USSD".to_string(),
            queued_at: Utc::now(),
        }
    }
}
