//! Storage guarantees that only MongoDB enforces on its own: the partial
//! unique index, conditional updates and server-side aggregation.
//!
//! Run with a reachable server: `TEST_MONGODB_URI=mongodb://... cargo test -- --ignored`.

mod common;

use common::{rupees, TestApp};
use marketplace_service::models::{
    new_id, BookingStatus, Coupon, DiscountType, PaymentMethod, ServiceFeedbackEntry, Transaction,
    TransactionStatus, WithdrawalDetails, WithdrawalMethod,
};
use marketplace_service::services::Repository;
use mongodb::bson::DateTime;
use serde_json::{json, Value};
use service_core::error::AppError;
use service_core::middleware::auth::Role;

fn online_payment(booking_id: &str, amount: i64) -> Transaction {
    let now = DateTime::now();
    Transaction {
        id: new_id(),
        booking_id: Some(booking_id.to_string()),
        customer_id: Some("customer-1".to_string()),
        provider_id: Some("provider-1".to_string()),
        amount,
        admin_amount: amount,
        provider_amount: 0,
        payment_method: PaymentMethod::Online,
        status: TransactionStatus::Pending,
        razorpay_order_id: Some(format!("order_{}", &new_id()[..8])),
        razorpay_payment_id: None,
        razorpay_signature: None,
        withdrawal_method: None,
        withdrawal_details: None,
        created_at: now,
        updated_at: now,
    }
}

fn ledger_row(
    provider_id: &str,
    method: PaymentMethod,
    status: TransactionStatus,
    amount: i64,
    provider_amount: i64,
) -> Transaction {
    let now = DateTime::now();
    let withdrawal = method == PaymentMethod::Withdrawal;
    Transaction {
        id: new_id(),
        booking_id: (!withdrawal).then(new_id),
        customer_id: None,
        provider_id: Some(provider_id.to_string()),
        amount,
        admin_amount: amount - provider_amount,
        provider_amount,
        payment_method: method,
        status,
        razorpay_order_id: None,
        razorpay_payment_id: None,
        razorpay_signature: None,
        withdrawal_method: withdrawal.then_some(WithdrawalMethod::Upi),
        withdrawal_details: withdrawal.then(|| WithdrawalDetails {
            upi_id: Some("provider@okbank".to_string()),
            ..Default::default()
        }),
        created_at: now,
        updated_at: now,
    }
}

fn limited_coupon(code: &str, usage_limit: i64, expires_in_ms: i64) -> Coupon {
    let now = DateTime::now();
    Coupon {
        id: new_id(),
        code: code.to_string(),
        description: String::new(),
        discount_type: DiscountType::Fixed,
        discount_value: 5_000,
        max_discount: None,
        expiry_date: DateTime::from_millis(now.timestamp_millis() + expires_in_ms),
        min_booking_value: 0,
        is_global: true,
        is_first_booking: false,
        assigned_to: vec![],
        usage_limit: Some(usage_limit),
        used_by: vec![],
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

fn entry(feedback_id: &str, rating: i32) -> ServiceFeedbackEntry {
    ServiceFeedbackEntry {
        feedback_id: feedback_id.to_string(),
        customer_id: "customer-1".to_string(),
        rating,
        comment: String::new(),
        created_at: DateTime::now(),
    }
}

#[tokio::test]
#[ignore = "requires MongoDB at TEST_MONGODB_URI"]
async fn second_completed_payment_for_a_booking_conflicts() {
    let app = TestApp::spawn_mongo().await;
    let repo = &app.repository;
    let first = online_payment("booking-1", 50_000);
    let second = online_payment("booking-1", 50_000);
    repo.insert_transaction(first.clone()).await.unwrap();
    repo.insert_transaction(second.clone()).await.unwrap();

    assert!(repo
        .capture_transaction(&first.id, Some("pay_1"), None)
        .await
        .unwrap());
    let err = repo
        .capture_transaction(&second.id, Some("pay_2"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Completed rows are also guarded at insert time.
    let mut third = online_payment("booking-1", 50_000);
    third.status = TransactionStatus::Completed;
    let err = repo.insert_transaction(third).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let stored = repo.get_transaction(&second.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
}

#[tokio::test]
#[ignore = "requires MongoDB at TEST_MONGODB_URI"]
async fn failed_attempt_is_completed_only_by_a_capture() {
    let app = TestApp::spawn_mongo().await;
    let repo = &app.repository;
    let payment = online_payment("booking-2", 20_000);
    repo.insert_transaction(payment.clone()).await.unwrap();
    assert!(repo.fail_transaction(&payment.id).await.unwrap());

    assert!(!repo
        .complete_transaction(&payment.id, Some("pay_late"), None)
        .await
        .unwrap());
    assert!(repo
        .capture_transaction(&payment.id, Some("pay_late"), None)
        .await
        .unwrap());

    let stored = repo.get_transaction(&payment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Completed);
    assert_eq!(stored.razorpay_payment_id.as_deref(), Some("pay_late"));
}

#[tokio::test]
#[ignore = "requires MongoDB at TEST_MONGODB_URI"]
async fn coupon_redemption_respects_limit_and_expiry() {
    let app = TestApp::spawn_mongo().await;
    let repo = &app.repository;
    let now = DateTime::now();
    repo.insert_coupon(limited_coupon("TWICE", 2, 86_400_000))
        .await
        .unwrap();
    repo.insert_coupon(limited_coupon("STALE", 5, -1_000))
        .await
        .unwrap();

    assert!(repo.redeem_coupon("TWICE", "u1", now).await.unwrap());
    assert!(!repo.redeem_coupon("TWICE", "u1", now).await.unwrap());
    assert!(repo.redeem_coupon("TWICE", "u2", now).await.unwrap());
    assert!(!repo.redeem_coupon("TWICE", "u3", now).await.unwrap());

    repo.release_coupon("TWICE", "u2").await.unwrap();
    assert!(repo.redeem_coupon("TWICE", "u3", now).await.unwrap());

    assert!(!repo.redeem_coupon("STALE", "u1", now).await.unwrap());

    let duplicate = limited_coupon("TWICE", 1, 86_400_000);
    let err = repo.insert_coupon(duplicate).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
#[ignore = "requires MongoDB at TEST_MONGODB_URI"]
async fn ledger_totals_group_by_method_and_status() {
    let app = TestApp::spawn_mongo().await;
    let repo = &app.repository;
    let provider = "provider-ledger";
    let rows = [
        ledger_row(provider, PaymentMethod::Cash, TransactionStatus::Completed, 62_000, 12_000),
        ledger_row(provider, PaymentMethod::Online, TransactionStatus::Completed, 30_000, 8_000),
        ledger_row(provider, PaymentMethod::Online, TransactionStatus::Pending, 30_000, 8_000),
        ledger_row(provider, PaymentMethod::Withdrawal, TransactionStatus::Completed, 3_000, 3_000),
        ledger_row(provider, PaymentMethod::Withdrawal, TransactionStatus::Pending, 2_000, 2_000),
        ledger_row(provider, PaymentMethod::Withdrawal, TransactionStatus::Failed, 5_000, 5_000),
        ledger_row("someone-else", PaymentMethod::Cash, TransactionStatus::Completed, 9_000, 9_000),
    ];
    for row in rows {
        repo.insert_transaction(row).await.unwrap();
    }

    let totals = repo.ledger_totals(provider).await.unwrap();

    assert_eq!(totals.earned, 20_000);
    assert_eq!(totals.withdrawn, 3_000);
    assert_eq!(totals.held, 2_000);
    assert_eq!(totals.available(), 15_000);
}

#[tokio::test]
#[ignore = "requires MongoDB at TEST_MONGODB_URI"]
async fn service_rating_totals_follow_push_edit_and_pull() {
    let app = TestApp::spawn_mongo().await;
    let repo = &app.repository;
    let service = app.seed_service(40_000).await;

    for (id, rating) in [("f1", 5), ("f2", 4), ("f3", 4)] {
        assert!(repo
            .push_service_feedback(&service.id, entry(id, rating))
            .await
            .unwrap());
    }
    let stored = repo.get_service(&service.id).await.unwrap().unwrap();
    assert_eq!((stored.rating_sum, stored.rating_count), (13, 3));

    // The expected old rating guards against a concurrent edit.
    assert!(!repo
        .update_service_feedback(&service.id, "f2", 3, 1, "stale")
        .await
        .unwrap());
    assert!(repo
        .update_service_feedback(&service.id, "f2", 4, 1, "changed my mind")
        .await
        .unwrap());

    assert!(repo.pull_service_feedback(&service.id, "f1", 5).await.unwrap());
    assert!(!repo.pull_service_feedback(&service.id, "f1", 5).await.unwrap());

    let stored = repo.get_service(&service.id).await.unwrap().unwrap();
    assert_eq!((stored.rating_sum, stored.rating_count), (5, 2));
    let edited = stored.feedback.iter().find(|e| e.feedback_id == "f2").unwrap();
    assert_eq!(edited.rating, 1);
    assert_eq!(edited.comment, "changed my mind");
}

#[tokio::test]
#[ignore = "requires MongoDB at TEST_MONGODB_URI"]
async fn feedback_delete_unwinds_every_link() {
    let app = TestApp::spawn_mongo().await;
    let customer = app.seed_user(Role::User, 0).await;
    let provider = app.seed_user(Role::Provider, 0).await;
    let service = app.seed_service(40_000).await;
    let booking = app
        .seed_booking(&customer, &provider, &service.id, 40_000, 0, BookingStatus::Completed)
        .await;
    let token = app.token(&customer, Role::User);

    let response = app
        .post(
            "/api/feedback",
            Some(&token),
            json!({
                "booking_id": booking.id,
                "provider_rating": 4,
                "service_rating": 3
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .post(
            "/api/feedback",
            Some(&token),
            json!({ "booking_id": booking.id, "provider_rating": 1, "service_rating": 1 }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 409);

    let response = app.delete(&format!("/api/feedback/{}", id), &token).await;
    assert_eq!(response.status().as_u16(), 200);

    assert!(app.repository.get_feedback(&id).await.unwrap().is_none());
    assert!(app.booking(&booking.id).await.feedback_id.is_none());
    let provider = app.repository.get_user(&provider).await.unwrap().unwrap();
    assert!(provider.feedbacks.is_empty());
    let stored = app.repository.get_service(&service.id).await.unwrap().unwrap();
    assert!(stored.feedback.is_empty());
    assert_eq!((stored.rating_sum, stored.rating_count), (0, 0));
}

#[tokio::test]
#[ignore = "requires MongoDB at TEST_MONGODB_URI"]
async fn concurrent_cash_payments_settle_once() {
    let app = TestApp::spawn_mongo().await;
    let customer = app.seed_user(Role::User, 0).await;
    let provider = app.seed_user(Role::Provider, 0).await;
    let service = app.seed_service(50_000).await;
    let booking = app
        .seed_booking(&customer, &provider, &service.id, 50_000, 12_000, BookingStatus::Pending)
        .await;
    let token = app.token(&customer, Role::User);
    let path = format!("/api/payment/bookings/{}", booking.id);
    let body = json!({ "amount": rupees(booking.total_amount), "payment_method": "cash" });

    let (a, b) = tokio::join!(
        app.post(&path, Some(&token), body.clone()),
        app.post(&path, Some(&token), body.clone()),
    );

    let mut statuses = [a.status().as_u16(), b.status().as_u16()];
    statuses.sort_unstable();
    assert_eq!(statuses, [201, 409]);
}
