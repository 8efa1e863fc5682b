//! Storage tests against a migrated Postgres testcontainer.

use chrono::Utc;
use domain_loan_applications::{
    ApplicationError, ApplicationFilter, ApplicationService, ApplicationStatus, ApplicationStore,
    InboundMessage, IngestionHandler, NewApplication, PgApplicationStore, PgTenantResolver,
    StatusUpdate, TenantResolver,
};
use messaging::{ErrorCategory, Processor};
use serde_json::json;
use std::sync::Arc;
use test_utils::{TestDataBuilder, TestDatabase};
use uuid::Uuid;

fn message(builder: &TestDataBuilder, suffix: &str, ussd_offset: u32) -> InboundMessage {
    serde_json::from_value(json!({
        "messageId": builder.message_id(suffix),
        "referenceNumber": builder.reference_number(suffix),
        "loanApplicationUssdId": builder.ussd_id(ussd_offset),
        "fullName": "Jane Doe",
        "nationalId": "123456/78/1",
        "phoneNumber": "+260970000000",
        "loanProductId": 3,
        "loanProductName": "Salary Advance",
        "principalAmount": 1000,
        "loanTermMonths": 6,
        "payoutMethod": 3,
        "bankName": "Zanaco",
        "bankBranch": "Cairo Road",
        "bankAccountNumber": "0011223344",
        "status": "CREATED",
        "source": "USSD",
        "channel": "*801#",
        "queuedAt": "2026-01-01T10:00:00Z"
    }))
    .expect("valid test message")
}

#[tokio::test]
async fn test_ingest_twice_creates_one_record() {
    let db = TestDatabase::new().await;
    let builder = TestDataBuilder::from_test_name("test_ingest_twice_creates_one_record");
    let tenant_id = db.create_test_tenant("default").await;
    let store = Arc::new(PgApplicationStore::new(db.connection()));
    let handler = IngestionHandler::new(
        ApplicationService::from_arc(store.clone()),
        Arc::new(PgTenantResolver::new(db.connection())),
        "default",
    );
    let m1 = message(&builder, "1", 1);

    handler.process(&m1).await.unwrap();
    handler.process(&m1).await.unwrap();

    assert_eq!(store.count(tenant_id).await.unwrap(), 1);
    let records = store
        .list(tenant_id, ApplicationFilter::default())
        .await
        .unwrap();
    let record = &records[0];
    assert_eq!(record.message_id, m1.message_id);
    assert_eq!(record.principal_amount, 1000.0);
    assert_eq!(record.status, ApplicationStatus::Created);
    assert_eq!(record.payout, m1.payout);
    assert!(record.processed_at.is_some());
}

#[tokio::test]
async fn test_unique_indexes_reject_each_key() {
    let db = TestDatabase::new().await;
    let builder = TestDataBuilder::from_test_name("test_unique_indexes_reject_each_key");
    let tenant_id = db.create_test_tenant("default").await;
    let store = PgApplicationStore::new(db.connection());
    let original = message(&builder, "1", 1);
    store
        .create(NewApplication::from_message(tenant_id, original.clone(), Utc::now()))
        .await
        .unwrap();

    let mut same_message_id = message(&builder, "2", 2);
    same_message_id.message_id = original.message_id.clone();
    let mut same_reference = message(&builder, "3", 3);
    same_reference.reference_number = original.reference_number.clone();
    let mut same_ussd_id = message(&builder, "4", 4);
    same_ussd_id.loan_application_ussd_id = original.loan_application_ussd_id;

    // Straight inserts bypass the service lookup; only the indexes stop them
    for duplicate in [same_message_id, same_reference, same_ussd_id] {
        let err = store
            .create(NewApplication::from_message(tenant_id, duplicate, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::Duplicate(_)), "{err:?}");
    }
    assert_eq!(store.count(tenant_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_ingest_of_same_message() {
    let db = TestDatabase::new().await;
    let builder = TestDataBuilder::from_test_name("test_concurrent_ingest_of_same_message");
    let tenant_id = db.create_test_tenant("default").await;
    let service = ApplicationService::new(PgApplicationStore::new(db.connection()));
    let m1 = message(&builder, "1", 1);

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            let m1 = m1.clone();
            tokio::spawn(async move { service.ingest(tenant_id, &m1).await })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        if task.await.unwrap().unwrap().is_created() {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(service.count(tenant_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_same_keys_in_two_tenants() {
    let db = TestDatabase::new().await;
    let builder = TestDataBuilder::from_test_name("test_same_keys_in_two_tenants");
    let t1 = db.create_test_tenant("north").await;
    let t2 = db.create_test_tenant("south").await;
    let service = ApplicationService::new(PgApplicationStore::new(db.connection()));
    let m1 = message(&builder, "1", 1);

    assert!(service.ingest(t1, &m1).await.unwrap().is_created());
    assert!(service.ingest(t2, &m1).await.unwrap().is_created());

    assert_eq!(service.count(t1).await.unwrap(), 1);
    assert_eq!(service.count(t2).await.unwrap(), 1);
}

#[tokio::test]
async fn test_inactive_tenant_is_rejected() {
    let db = TestDatabase::new().await;
    let builder = TestDataBuilder::from_test_name("test_inactive_tenant_is_rejected");
    db.create_inactive_tenant("dormant").await;
    let resolver = Arc::new(PgTenantResolver::new(db.connection()));

    let tenant = resolver.get_tenant_by_slug("dormant").await.unwrap().unwrap();
    assert!(!tenant.is_active);
    assert!(resolver.get_tenant_by_slug("nobody").await.unwrap().is_none());

    let handler = IngestionHandler::new(
        ApplicationService::new(PgApplicationStore::new(db.connection())),
        resolver,
        "dormant",
    );
    let err = handler
        .process(&message(&builder, "1", 1))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Permanent);
}

#[tokio::test]
async fn test_list_and_status_updates() {
    let db = TestDatabase::new().await;
    let builder = TestDataBuilder::from_test_name("test_list_and_status_updates");
    let tenant_id = db.create_test_tenant("default").await;
    let service = ApplicationService::new(PgApplicationStore::new(db.connection()));

    let mut ids = Vec::new();
    for i in 1..=3 {
        let outcome = service
            .ingest(tenant_id, &message(&builder, &i.to_string(), i))
            .await
            .unwrap();
        ids.push(outcome.record().id);
    }

    let newest_first = service
        .list(tenant_id, ApplicationFilter::default())
        .await
        .unwrap();
    assert_eq!(
        newest_first.iter().map(|r| r.id).collect::<Vec<_>>(),
        ids.iter().rev().copied().collect::<Vec<Uuid>>()
    );

    let approved = service
        .update_status(
            ids[0],
            StatusUpdate::new(ApplicationStatus::Approved).with_notes("score 710"),
        )
        .await
        .unwrap();
    assert_eq!(approved.status, ApplicationStatus::Approved);
    assert_eq!(approved.processing_notes.as_deref(), Some("score 710"));

    let rejected_backwards = service
        .update_status(ids[0], StatusUpdate::new(ApplicationStatus::Pending))
        .await
        .unwrap_err();
    assert!(matches!(
        rejected_backwards,
        ApplicationError::InvalidTransition { .. }
    ));

    let approved_only = service
        .list(
            tenant_id,
            ApplicationFilter {
                status: Some(ApplicationStatus::Approved),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(approved_only.len(), 1);
    assert_eq!(approved_only[0].id, ids[0]);
}
