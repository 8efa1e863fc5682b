use sea_orm_migration::sea_query::extension::postgres::Type;
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

const STATUS_VALUES: [LoanApplicationStatus; 8] = [
    LoanApplicationStatus::Created,
    LoanApplicationStatus::Pending,
    LoanApplicationStatus::UnderReview,
    LoanApplicationStatus::Approved,
    LoanApplicationStatus::Disbursed,
    LoanApplicationStatus::Rejected,
    LoanApplicationStatus::Cancelled,
    LoanApplicationStatus::Expired,
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(LoanApplicationStatus::Enum)
                    .values(STATUS_VALUES)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(LoanApplications::Table)
                    .if_not_exists()
                    .col(pk_uuid(LoanApplications::Id))
                    .col(uuid(LoanApplications::TenantId))
                    .col(string(LoanApplications::MessageId))
                    .col(string(LoanApplications::ReferenceNumber))
                    .col(big_integer(LoanApplications::LoanApplicationUssdId))
                    .col(string(LoanApplications::FullName))
                    .col(string(LoanApplications::NationalId))
                    .col(string(LoanApplications::PhoneNumber))
                    .col(string(LoanApplications::LoanProductId))
                    .col(string(LoanApplications::LoanProductName))
                    .col(double(LoanApplications::PrincipalAmount))
                    .col(integer(LoanApplications::LoanTermMonths))
                    .col(small_integer(LoanApplications::PayoutMethod))
                    .col(string_null(LoanApplications::MobileMoneyProvider))
                    .col(string_null(LoanApplications::MobileMoneyNumber))
                    .col(string_null(LoanApplications::BranchName))
                    .col(string_null(LoanApplications::OfficeId))
                    .col(string_null(LoanApplications::BankName))
                    .col(string_null(LoanApplications::BankBranch))
                    .col(string_null(LoanApplications::BankAccountNumber))
                    .col(
                        ColumnDef::new(LoanApplications::Status)
                            .enumeration(LoanApplicationStatus::Enum, STATUS_VALUES)
                            .not_null()
                            .default("CREATED"),
                    )
                    .col(string_null(LoanApplications::PaymentStatus))
                    .col(text_null(LoanApplications::ProcessingNotes))
                    .col(string(LoanApplications::Source))
                    .col(string(LoanApplications::Channel))
                    .col(timestamp_with_time_zone(LoanApplications::QueuedAt))
                    .col(timestamp_with_time_zone_null(LoanApplications::ProcessedAt))
                    .col(
                        timestamp_with_time_zone(LoanApplications::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(LoanApplications::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_loan_applications_tenant_id")
                            .from(LoanApplications::Table, LoanApplications::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Dedup keys are unique per tenant; concurrent consumers race on these
        for (name, column) in [
            (
                "uq_loan_applications_tenant_message_id",
                LoanApplications::MessageId,
            ),
            (
                "uq_loan_applications_tenant_reference_number",
                LoanApplications::ReferenceNumber,
            ),
            (
                "uq_loan_applications_tenant_ussd_id",
                LoanApplications::LoanApplicationUssdId,
            ),
        ] {
            manager
                .create_index(
                    Index::create()
                        .name(name)
                        .table(LoanApplications::Table)
                        .col(LoanApplications::TenantId)
                        .col(column)
                        .unique()
                        .to_owned(),
                )
                .await?;
        }

        manager
            .create_index(
                Index::create()
                    .name("idx_loan_applications_tenant_created_at")
                    .table(LoanApplications::Table)
                    .col(LoanApplications::TenantId)
                    .col(LoanApplications::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_loan_applications_status")
                    .table(LoanApplications::Table)
                    .col(LoanApplications::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TRIGGER loan_applications_touch_updated_at
                    BEFORE UPDATE ON loan_applications
                    FOR EACH ROW
                    EXECUTE FUNCTION util.touch_updated_at()
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                "DROP TRIGGER IF EXISTS loan_applications_touch_updated_at ON loan_applications",
            )
            .await?;

        manager
            .drop_table(Table::drop().table(LoanApplications::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(LoanApplicationStatus::Enum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum LoanApplications {
    Table,
    Id,
    TenantId,
    MessageId,
    ReferenceNumber,
    LoanApplicationUssdId,
    FullName,
    NationalId,
    PhoneNumber,
    LoanProductId,
    LoanProductName,
    PrincipalAmount,
    LoanTermMonths,
    PayoutMethod,
    MobileMoneyProvider,
    MobileMoneyNumber,
    BranchName,
    OfficeId,
    BankName,
    BankBranch,
    BankAccountNumber,
    Status,
    PaymentStatus,
    ProcessingNotes,
    Source,
    Channel,
    QueuedAt,
    ProcessedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}

#[derive(DeriveIden, Clone, Copy)]
enum LoanApplicationStatus {
    #[sea_orm(iden = "loan_application_status")]
    Enum,
    #[sea_orm(iden = "CREATED")]
    Created,
    #[sea_orm(iden = "PENDING")]
    Pending,
    #[sea_orm(iden = "UNDER_REVIEW")]
    UnderReview,
    #[sea_orm(iden = "APPROVED")]
    Approved,
    #[sea_orm(iden = "DISBURSED")]
    Disbursed,
    #[sea_orm(iden = "REJECTED")]
    Rejected,
    #[sea_orm(iden = "CANCELLED")]
    Cancelled,
    #[sea_orm(iden = "EXPIRED")]
    Expired,
}
