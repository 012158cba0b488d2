//! Razorpay checkout verification and webhook delivery.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use service_core::error::AppError;
use service_core::middleware::auth::UserAuth;
use service_core::response::ApiResponse;
use validator::Validate;

use crate::dtos::{TransactionResponse, VerifyPaymentRequest, WebhookAck};
use crate::services::metrics;
use crate::startup::AppState;

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Confirms a checkout with the values Razorpay returned to the client.
#[tracing::instrument(skip(state, auth, payload), fields(user_id = %auth.user_id(), order_id = %payload.razorpay_order_id))]
pub async fn verify_payment(
    State(state): State<AppState>,
    auth: UserAuth,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<ApiResponse<TransactionResponse>, AppError> {
    payload.validate()?;

    let transaction = state
        .payments
        .verify_payment(
            auth.user_id(),
            &payload.razorpay_order_id,
            &payload.razorpay_payment_id,
            &payload.razorpay_signature,
        )
        .await?;

    Ok(ApiResponse::ok(transaction.into()).with_message("Payment verified successfully"))
}

/// Razorpay webhook. The signature covers the raw body, so it is checked
/// before the body is parsed.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ApiResponse<WebhookAck>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            tracing::warn!("Missing X-Razorpay-Signature header");
            metrics::record_webhook("unknown", "missing_signature");
            AppError::unauthorized("Missing webhook signature")
        })?;

    if !state.razorpay.verify_webhook_signature(&body, signature) {
        metrics::record_webhook("unknown", "invalid_signature");
        return Err(AppError::unauthorized("Invalid webhook signature"));
    }

    let event = state.razorpay.parse_webhook_event(&body).map_err(|e| {
        tracing::warn!(error = %e, "Failed to parse webhook event");
        metrics::record_webhook("unknown", "malformed");
        AppError::bad_request("Invalid webhook payload")
    })?;

    tracing::info!(
        event_type = %event.event,
        order_id = ?event.order_id(),
        payment_id = ?event.payment_id(),
        "Processing Razorpay webhook"
    );

    let outcome = state.payments.handle_webhook_event(&event).await?;
    metrics::record_webhook(&event.event, outcome.as_str());

    Ok(ApiResponse::ok(WebhookAck {
        event: event.event,
        outcome: outcome.as_str(),
    }))
}
