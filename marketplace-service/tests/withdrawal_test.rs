mod common;

use common::TestApp;
use marketplace_service::models::BookingStatus;
use serde_json::{json, Value};
use service_core::middleware::auth::Role;

/// Provider with one cash-paid booking whose products amount is ₹120.
async fn provider_with_earnings(app: &TestApp) -> String {
    let customer = app.seed_user(Role::User, 0).await;
    let provider = app.seed_user(Role::Provider, 0).await;
    let service = app.seed_service(50_000).await;
    let booking = app
        .seed_booking(
            &customer,
            &provider,
            &service.id,
            50_000,
            12_000,
            BookingStatus::Completed,
        )
        .await;
    app.pay_cash(&booking).await;
    provider
}

fn upi(amount: &str) -> Value {
    json!({
        "amount": amount,
        "withdrawal_method": "upi",
        "withdrawal_details": { "upi_id": "provider@okbank" }
    })
}

async fn earnings(app: &TestApp, token: &str) -> Value {
    let response = app.get("/api/payment/earnings", Some(token)).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    body["data"].clone()
}

#[tokio::test]
async fn earnings_count_only_the_products_amount() {
    let app = TestApp::spawn().await;
    let provider = provider_with_earnings(&app).await;
    let token = app.token(&provider, Role::Provider);

    let data = earnings(&app, &token).await;
    assert_eq!(data["total_earnings"], "120.00");
    assert_eq!(data["total_withdrawn"], "0.00");
    assert_eq!(data["pending_withdrawals"], "0.00");
    assert_eq!(data["available_balance"], "120.00");
}

#[tokio::test]
async fn withdrawal_above_available_balance_is_rejected() {
    let app = TestApp::spawn().await;
    let provider = provider_with_earnings(&app).await;
    let token = app.token(&provider, Role::Provider);

    let response = app
        .post("/api/payment/withdrawals", Some(&token), upi("120.01"))
        .await;

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Insufficient balance for withdrawal");
    assert_eq!(earnings(&app, &token).await["available_balance"], "120.00");
}

#[tokio::test]
async fn full_balance_withdrawal_holds_funds() {
    let app = TestApp::spawn().await;
    let provider = provider_with_earnings(&app).await;
    let token = app.token(&provider, Role::Provider);

    let response = app
        .post("/api/payment/withdrawals", Some(&token), upi("120.00"))
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["payment_method"], "withdrawal");
    assert_eq!(body["data"]["withdrawal_details"]["upi_id"], "provider@okbank");

    let data = earnings(&app, &token).await;
    assert_eq!(data["pending_withdrawals"], "120.00");
    assert_eq!(data["available_balance"], "0.00");

    let response = app
        .post("/api/payment/withdrawals", Some(&token), upi("1.00"))
        .await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn rejected_withdrawal_releases_the_hold() {
    let app = TestApp::spawn().await;
    let provider = provider_with_earnings(&app).await;
    let token = app.token(&provider, Role::Provider);
    let admin = app.token("admin-1", Role::Admin);

    let body: Value = app
        .post("/api/payment/withdrawals", Some(&token), upi("100.00"))
        .await
        .json()
        .await
        .unwrap();
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .post(
            &format!("/api/payment/admin/withdrawals/{}/reject", id),
            Some(&admin),
            json!({}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["status"], "failed");

    assert_eq!(earnings(&app, &token).await["available_balance"], "120.00");

    let response = app
        .post(
            &format!("/api/payment/admin/withdrawals/{}/approve", id),
            Some(&admin),
            json!({}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn approved_withdrawal_moves_hold_to_withdrawn() {
    let app = TestApp::spawn().await;
    let provider = provider_with_earnings(&app).await;
    let token = app.token(&provider, Role::Provider);
    let admin = app.token("admin-1", Role::Admin);

    let body: Value = app
        .post("/api/payment/withdrawals", Some(&token), upi("70.00"))
        .await
        .json()
        .await
        .unwrap();
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let body: Value = app
        .get("/api/payment/admin/withdrawals", Some(&admin))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], id.as_str());

    let response = app
        .post(
            &format!("/api/payment/admin/withdrawals/{}/approve", id),
            Some(&admin),
            json!({}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let data = earnings(&app, &token).await;
    assert_eq!(data["total_withdrawn"], "70.00");
    assert_eq!(data["pending_withdrawals"], "0.00");
    assert_eq!(data["available_balance"], "50.00");
}

#[tokio::test]
async fn concurrent_withdrawals_never_overdraw() {
    let app = TestApp::spawn().await;
    let provider = provider_with_earnings(&app).await;
    let token = app.token(&provider, Role::Provider);

    let (a, b) = tokio::join!(
        app.post("/api/payment/withdrawals", Some(&token), upi("120.00")),
        app.post("/api/payment/withdrawals", Some(&token), upi("120.00")),
    );
    let accepted = [a.status().as_u16(), b.status().as_u16()]
        .iter()
        .filter(|s| **s == 201)
        .count();

    assert!(accepted <= 1);
    let data = earnings(&app, &token).await;
    assert_eq!(data["pending_withdrawals"], if accepted == 1 { "120.00" } else { "0.00" });
}

#[tokio::test]
async fn payout_details_are_required() {
    let app = TestApp::spawn().await;
    let provider = provider_with_earnings(&app).await;
    let token = app.token(&provider, Role::Provider);

    let response = app
        .post(
            "/api/payment/withdrawals",
            Some(&token),
            json!({ "amount": "10.00", "withdrawal_method": "upi" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .post(
            "/api/payment/withdrawals",
            Some(&token),
            json!({
                "amount": "10.00",
                "withdrawal_method": "bank_transfer",
                "withdrawal_details": { "account_holder_name": "Asha", "account_number": "001122" }
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("ifsc_code"));
}

#[tokio::test]
async fn only_providers_withdraw_and_only_admins_approve() {
    let app = TestApp::spawn().await;
    let customer = app.seed_user(Role::User, 0).await;
    let user_token = app.token(&customer, Role::User);

    let response = app
        .post("/api/payment/withdrawals", Some(&user_token), upi("1.00"))
        .await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .post(
            "/api/payment/admin/withdrawals/anything/approve",
            Some(&user_token),
            json!({}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 403);
}
