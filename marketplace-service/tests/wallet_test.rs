mod common;

use common::{rupees, TestApp};
use marketplace_service::models::{BookingStatus, PaymentStatus};
use marketplace_service::services::repository::{Page, TransactionFilter};
use marketplace_service::services::Repository;
use serde_json::{json, Value};
use service_core::middleware::auth::Role;

async fn booking_for(app: &TestApp, customer: &str) -> marketplace_service::models::Booking {
    let provider = app.seed_user(Role::Provider, 0).await;
    let service = app.seed_service(30_000).await;
    app.seed_booking(
        customer,
        &provider,
        &service.id,
        30_000,
        5_000,
        BookingStatus::Pending,
    )
    .await
}

#[tokio::test]
async fn wallet_payment_debits_balance_and_pays_booking() {
    let app = TestApp::spawn().await;
    let customer = app.seed_user(Role::User, 50_000).await;
    let booking = booking_for(&app, &customer).await;
    let token = app.token(&customer, Role::User);

    let response = app
        .post(
            &format!("/api/payment/bookings/{}/wallet", booking.id),
            Some(&token),
            json!({ "amount": rupees(booking.total_amount) }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["payment_method"], "wallet");
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["provider_amount"], "50.00");

    assert_eq!(app.wallet(&customer).await, 15_000);
    assert_eq!(app.booking(&booking.id).await.payment_status, PaymentStatus::Paid);

    let body: Value = app
        .get("/api/payment/wallet", Some(&token))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["wallet_balance"], "150.00");
}

#[tokio::test]
async fn insufficient_balance_writes_nothing() {
    let app = TestApp::spawn().await;
    let customer = app.seed_user(Role::User, 20_000).await;
    let booking = booking_for(&app, &customer).await;
    let token = app.token(&customer, Role::User);

    let response = app
        .post(
            &format!("/api/payment/bookings/{}/wallet", booking.id),
            Some(&token),
            json!({ "amount": rupees(booking.total_amount) }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Insufficient wallet balance");

    assert_eq!(app.wallet(&customer).await, 20_000);
    assert_eq!(app.booking(&booking.id).await.payment_status, PaymentStatus::Unpaid);
    let filter = TransactionFilter {
        booking_id: Some(booking.id.clone()),
        ..Default::default()
    };
    let (rows, total) = app
        .repository
        .list_transactions(&filter, Page::default())
        .await
        .unwrap();
    assert!(rows.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn wallet_is_also_reachable_through_create_payment() {
    let app = TestApp::spawn().await;
    let customer = app.seed_user(Role::User, 35_000).await;
    let booking = booking_for(&app, &customer).await;
    let token = app.token(&customer, Role::User);

    let response = app
        .post(
            &format!("/api/payment/bookings/{}", booking.id),
            Some(&token),
            json!({ "amount": "350.00", "payment_method": "wallet" }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["transaction"]["payment_method"], "wallet");
    assert_eq!(app.wallet(&customer).await, 0);
}

#[tokio::test]
async fn paid_booking_is_not_charged_twice() {
    let app = TestApp::spawn().await;
    let customer = app.seed_user(Role::User, 100_000).await;
    let booking = booking_for(&app, &customer).await;
    let token = app.token(&customer, Role::User);
    let path = format!("/api/payment/bookings/{}/wallet", booking.id);
    let body = json!({ "amount": rupees(booking.total_amount) });

    let first = app.post(&path, Some(&token), body.clone()).await;
    assert_eq!(first.status().as_u16(), 201);

    let second = app.post(&path, Some(&token), body).await;
    assert_eq!(second.status().as_u16(), 409);

    assert_eq!(app.wallet(&customer).await, 100_000 - booking.total_amount);
}

#[tokio::test]
async fn concurrent_wallet_payments_charge_once() {
    let app = TestApp::spawn().await;
    let customer = app.seed_user(Role::User, 100_000).await;
    let booking = booking_for(&app, &customer).await;
    let token = app.token(&customer, Role::User);
    let path = format!("/api/payment/bookings/{}/wallet", booking.id);
    let body = json!({ "amount": rupees(booking.total_amount) });

    let (a, b) = tokio::join!(
        app.post(&path, Some(&token), body.clone()),
        app.post(&path, Some(&token), body.clone()),
    );
    let created = [a.status().as_u16(), b.status().as_u16()]
        .iter()
        .filter(|s| **s == 201)
        .count();

    assert_eq!(created, 1);
    assert_eq!(app.wallet(&customer).await, 100_000 - booking.total_amount);
}

#[tokio::test]
async fn admin_credits_wallet() {
    let app = TestApp::spawn().await;
    let customer = app.seed_user(Role::User, 1_000).await;
    let admin = app.token("admin-1", Role::Admin);

    let response = app
        .post(
            &format!("/api/payment/admin/wallets/{}/credit", customer),
            Some(&admin),
            json!({ "amount": "250.50" }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["wallet_balance"], "260.50");
    assert_eq!(app.wallet(&customer).await, 26_050);

    let response = app
        .post(
            "/api/payment/admin/wallets/nobody/credit",
            Some(&admin),
            json!({ "amount": "10" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app
        .post(
            &format!("/api/payment/admin/wallets/{}/credit", customer),
            Some(&admin),
            json!({ "amount": "0" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn wallet_credit_beyond_range_is_rejected() {
    let app = TestApp::spawn().await;
    let customer = app.seed_user(Role::User, 1_000).await;
    let admin = app.token("admin-1", Role::Admin);

    let response = app
        .post(
            &format!("/api/payment/admin/wallets/{}/credit", customer),
            Some(&admin),
            json!({ "amount": "92233720368547758.07" }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Amount is out of range");
    assert_eq!(app.wallet(&customer).await, 1_000);
}
