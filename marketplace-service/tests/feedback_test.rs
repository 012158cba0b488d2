mod common;

use common::TestApp;
use marketplace_service::models::{Booking, BookingStatus};
use marketplace_service::services::feedback::{FeedbackChanges, EDIT_WINDOW_SECS};
use marketplace_service::services::{FeedbackService, Repository};
use mongodb::bson::DateTime;
use serde_json::{json, Value};
use service_core::error::AppError;
use service_core::middleware::auth::Role;

struct Parties {
    customer: String,
    provider: String,
    service_id: String,
}

async fn parties(app: &TestApp) -> Parties {
    let customer = app.seed_user(Role::User, 0).await;
    let provider = app.seed_user(Role::Provider, 0).await;
    let service = app.seed_service(40_000).await;
    Parties {
        customer,
        provider,
        service_id: service.id,
    }
}

async fn completed_booking(app: &TestApp, p: &Parties) -> Booking {
    app.seed_booking(
        &p.customer,
        &p.provider,
        &p.service_id,
        40_000,
        0,
        BookingStatus::Completed,
    )
    .await
}

async fn submit(app: &TestApp, customer: &str, booking_id: &str, provider: i32, service: i32) -> reqwest::Response {
    let token = app.token(customer, Role::User);
    app.post(
        "/api/feedback",
        Some(&token),
        json!({
            "booking_id": booking_id,
            "provider_rating": provider,
            "provider_comment": "On time",
            "service_rating": service,
            "service_comment": "Works again"
        }),
    )
    .await
}

async fn submitted_id(app: &TestApp, customer: &str, booking_id: &str, provider: i32, service: i32) -> String {
    let response = submit(app, customer, booking_id, provider, service).await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    body["data"]["id"].as_str().unwrap().to_string()
}

async fn service_json(app: &TestApp, service_id: &str) -> Value {
    let body: Value = app
        .get(&format!("/api/services/{}", service_id), None)
        .await
        .json()
        .await
        .unwrap();
    body["data"].clone()
}

#[tokio::test]
async fn feedback_on_completed_booking_links_everywhere() {
    let app = TestApp::spawn().await;
    let p = parties(&app).await;
    let booking = completed_booking(&app, &p).await;

    let id = submitted_id(&app, &p.customer, &booking.id, 5, 4).await;

    assert_eq!(app.booking(&booking.id).await.feedback_id.as_deref(), Some(id.as_str()));
    let provider = app.repository.get_user(&p.provider).await.unwrap().unwrap();
    assert_eq!(provider.feedbacks, vec![id.clone()]);
    let service = app.repository.get_service(&p.service_id).await.unwrap().unwrap();
    assert_eq!(service.feedback.len(), 1);
    assert_eq!(service.feedback[0].feedback_id, id);
    assert_eq!(service.feedback[0].rating, 4);
}

#[tokio::test]
async fn feedback_requires_a_completed_booking_of_the_caller() {
    let app = TestApp::spawn().await;
    let p = parties(&app).await;
    let pending = app
        .seed_booking(&p.customer, &p.provider, &p.service_id, 40_000, 0, BookingStatus::Pending)
        .await;

    let response = submit(&app, &p.customer, &pending.id, 5, 5).await;
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Feedback can only be given for completed bookings");

    let done = completed_booking(&app, &p).await;
    let stranger = app.seed_user(Role::User, 0).await;
    assert_eq!(submit(&app, &stranger, &done.id, 5, 5).await.status().as_u16(), 403);
    assert_eq!(submit(&app, &p.customer, "missing", 5, 5).await.status().as_u16(), 404);
}

#[tokio::test]
async fn second_feedback_for_a_booking_conflicts() {
    let app = TestApp::spawn().await;
    let p = parties(&app).await;
    let booking = completed_booking(&app, &p).await;

    submitted_id(&app, &p.customer, &booking.id, 5, 5).await;
    let response = submit(&app, &p.customer, &booking.id, 1, 1).await;

    assert_eq!(response.status().as_u16(), 409);
    let service = service_json(&app, &p.service_id).await;
    assert_eq!(service["rating_count"], 1);
    assert_eq!(service["average_rating"], 5.0);
}

#[tokio::test]
async fn out_of_range_rating_fails_validation() {
    let app = TestApp::spawn().await;
    let p = parties(&app).await;
    let booking = completed_booking(&app, &p).await;

    let response = submit(&app, &p.customer, &booking.id, 6, 3).await;
    assert_eq!(response.status().as_u16(), 422);

    let response = submit(&app, &p.customer, &booking.id, 3, 0).await;
    assert_eq!(response.status().as_u16(), 422);
    assert!(app.booking(&booking.id).await.feedback_id.is_none());
}

#[tokio::test]
async fn service_average_is_rounded_to_one_decimal() {
    let app = TestApp::spawn().await;
    let p = parties(&app).await;

    for rating in [5, 4, 4] {
        let booking = completed_booking(&app, &p).await;
        submitted_id(&app, &p.customer, &booking.id, rating, rating).await;
    }

    let service = service_json(&app, &p.service_id).await;
    assert_eq!(service["average_rating"], 4.3);
    assert_eq!(service["rating_count"], 3);

    let body: Value = app
        .get(&format!("/api/feedback/provider/{}/summary", p.provider), None)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["average_rating"], 4.3);
    assert_eq!(body["data"]["rating_count"], 3);

    let body: Value = app
        .get(&format!("/api/services/{}/feedback", p.service_id), None)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["summary"]["rating_count"], 3);
    assert_eq!(body["data"]["feedback"]["total"], 3);
}

#[tokio::test]
async fn editing_a_rating_moves_the_aggregate() {
    let app = TestApp::spawn().await;
    let p = parties(&app).await;
    let first = completed_booking(&app, &p).await;
    let second = completed_booking(&app, &p).await;
    let id = submitted_id(&app, &p.customer, &first.id, 2, 2).await;
    submitted_id(&app, &p.customer, &second.id, 4, 4).await;

    let token = app.token(&p.customer, Role::User);
    let response = app
        .patch(
            &format!("/api/feedback/{}", id),
            &token,
            json!({ "service_rating": 5, "service_comment": "Better than expected" }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["service_feedback"]["rating"], 5);
    assert_eq!(body["data"]["service_feedback"]["is_edited"], true);
    assert_eq!(body["data"]["provider_feedback"]["is_edited"], false);

    let service = service_json(&app, &p.service_id).await;
    assert_eq!(service["average_rating"], 4.5);
    assert_eq!(service["rating_count"], 2);
    let stored = app.repository.get_service(&p.service_id).await.unwrap().unwrap();
    let entry = stored.feedback.iter().find(|e| e.feedback_id == id).unwrap();
    assert_eq!(entry.rating, 5);
    assert_eq!(entry.comment, "Better than expected");
}

#[tokio::test]
async fn only_the_author_edits_and_only_with_changes() {
    let app = TestApp::spawn().await;
    let p = parties(&app).await;
    let booking = completed_booking(&app, &p).await;
    let id = submitted_id(&app, &p.customer, &booking.id, 3, 3).await;

    let other = app.token(&app.seed_user(Role::User, 0).await, Role::User);
    let response = app
        .patch(&format!("/api/feedback/{}", id), &other, json!({ "provider_rating": 1 }))
        .await;
    assert_eq!(response.status().as_u16(), 403);

    let token = app.token(&p.customer, Role::User);
    let response = app
        .patch(&format!("/api/feedback/{}", id), &token, json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn edit_window_closes_seven_days_after_submission() {
    let app = TestApp::spawn().await;
    let p = parties(&app).await;
    let booking = completed_booking(&app, &p).await;
    let id = submitted_id(&app, &p.customer, &booking.id, 3, 3).await;

    let created = app
        .repository
        .get_feedback(&id)
        .await
        .unwrap()
        .unwrap()
        .created_at
        .timestamp_millis();
    let feedback = FeedbackService::new(app.repository.clone());
    let changes = || FeedbackChanges {
        provider_rating: Some(4),
        ..Default::default()
    };

    let late = DateTime::from_millis(created + (EDIT_WINDOW_SECS + 1) * 1000);
    let err = feedback
        .edit(&p.customer, &id, changes(), late)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let in_time = DateTime::from_millis(created + (EDIT_WINDOW_SECS - 1) * 1000);
    let edited = feedback
        .edit(&p.customer, &id, changes(), in_time)
        .await
        .unwrap();
    assert_eq!(edited.provider_feedback.rating, 4);
    assert!(edited.provider_feedback.is_edited);
}

#[tokio::test]
async fn deleting_feedback_unwinds_every_link() {
    let app = TestApp::spawn().await;
    let p = parties(&app).await;
    let keep = completed_booking(&app, &p).await;
    let removed = completed_booking(&app, &p).await;
    submitted_id(&app, &p.customer, &keep.id, 4, 4).await;
    let id = submitted_id(&app, &p.customer, &removed.id, 1, 1).await;

    let token = app.token(&p.customer, Role::User);
    let response = app.delete(&format!("/api/feedback/{}", id), &token).await;
    assert_eq!(response.status().as_u16(), 200);

    assert!(app.repository.get_feedback(&id).await.unwrap().is_none());
    assert!(app.booking(&removed.id).await.feedback_id.is_none());
    let provider = app.repository.get_user(&p.provider).await.unwrap().unwrap();
    assert!(!provider.feedbacks.contains(&id));

    let service = service_json(&app, &p.service_id).await;
    assert_eq!(service["average_rating"], 4.0);
    assert_eq!(service["rating_count"], 1);

    // The booking can be reviewed again.
    assert_eq!(submit(&app, &p.customer, &removed.id, 5, 5).await.status().as_u16(), 201);
}

#[tokio::test]
async fn admins_list_by_rating_and_delete_any_feedback() {
    let app = TestApp::spawn().await;
    let p = parties(&app).await;
    let a = completed_booking(&app, &p).await;
    let b = completed_booking(&app, &p).await;
    let low = submitted_id(&app, &p.customer, &a.id, 1, 3).await;
    submitted_id(&app, &p.customer, &b.id, 5, 5).await;

    let admin = app.token("admin-1", Role::Admin);
    let body: Value = app
        .get("/api/feedback/admin?rating=1", Some(&admin))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], low.as_str());

    let response = app.get("/api/feedback/admin?rating=9", Some(&admin)).await;
    assert_eq!(response.status().as_u16(), 400);

    let provider_token = app.token(&p.provider, Role::Provider);
    let response = app.delete(&format!("/api/feedback/{}", low), &provider_token).await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app.delete(&format!("/api/feedback/admin/{}", low), &admin).await;
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = app
        .get("/api/feedback/provider", Some(&provider_token))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["summary"]["average_rating"], 5.0);
    assert_eq!(body["data"]["summary"]["rating_count"], 1);
    assert_eq!(body["data"]["feedback"]["total"], 1);
}

#[tokio::test]
async fn feedback_for_a_missing_service_is_not_stored() {
    let app = TestApp::spawn().await;
    let p = parties(&app).await;
    let booking = app
        .seed_booking(&p.customer, &p.provider, "gone", 40_000, 0, BookingStatus::Completed)
        .await;

    let response = submit(&app, &p.customer, &booking.id, 4, 4).await;

    assert_eq!(response.status().as_u16(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Service not found");
    assert!(app.booking(&booking.id).await.feedback_id.is_none());
    let provider = app.repository.get_user(&p.provider).await.unwrap().unwrap();
    assert!(provider.feedbacks.is_empty());
}
