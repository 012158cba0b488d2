//! Razorpay payment gateway client.
//!
//! Orders API for payment initiation, checkout signature verification for
//! payment confirmation and webhook signature verification/parsing.

use crate::config::RazorpayConfig;
use anyhow::{anyhow, Result};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use service_core::utils::signature::verify_hmac_sha256_hex;
use std::time::Duration;

/// Razorpay's upper bound on `receipt` length.
pub const MAX_RECEIPT_LEN: usize = 40;

const ORDER_FAILED: &str = "Failed to create payment order";

#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    config: RazorpayConfig,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderRequest {
    /// Amount in paise.
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayError {
    pub error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayErrorDetail {
    pub code: String,
    pub description: String,
}

/// Values returned by Razorpay checkout to the client.
#[derive(Debug)]
pub struct PaymentVerification<'a> {
    pub order_id: &'a str,
    pub payment_id: &'a str,
    pub signature: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    pub payment: Option<WebhookEntity<PaymentEntity>>,
    pub order: Option<WebhookEntity<OrderEntity>>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEntity<T> {
    pub entity: T,
}

#[derive(Debug, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderEntity {
    pub id: String,
}

impl WebhookEvent {
    /// Order the event refers to, from the payment or the order entity.
    pub fn order_id(&self) -> Option<&str> {
        self.payload
            .payment
            .as_ref()
            .and_then(|p| p.entity.order_id.as_deref())
            .or_else(|| self.payload.order.as_ref().map(|o| o.entity.id.as_str()))
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.payload.payment.as_ref().map(|p| p.entity.id.as_str())
    }
}

/// `rcpt_<booking prefix>_<unix seconds>`, never longer than
/// [`MAX_RECEIPT_LEN`].
pub fn receipt_for(booking_id: &str, timestamp: i64) -> String {
    let prefix: String = booking_id.chars().filter(|c| *c != '-').take(12).collect();
    let mut receipt = format!("rcpt_{}_{}", prefix, timestamp);
    receipt.truncate(MAX_RECEIPT_LEN);
    receipt
}

impl RazorpayClient {
    pub fn new(config: RazorpayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Whether API credentials are set.
    pub fn is_configured(&self) -> bool {
        !self.config.key_id.is_empty() && !self.config.key_secret.expose_secret().is_empty()
    }

    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    /// Creates an INR order for a booking. Gateway failures of any kind are
    /// reported as a single `BadGateway`.
    pub async fn create_order(
        &self,
        booking_id: &str,
        amount_paise: i64,
    ) -> Result<RazorpayOrder, AppError> {
        if !self.is_configured() {
            return Err(AppError::ServiceUnavailable(
                "Online payments are not configured".to_string(),
            ));
        }

        let request = CreateOrderRequest {
            amount: amount_paise,
            currency: "INR".to_string(),
            receipt: receipt_for(booking_id, chrono::Utc::now().timestamp()),
            notes: Some(serde_json::json!({ "booking_id": booking_id })),
        };

        self.post_order(&request).await.map_err(|e| {
            tracing::error!(booking_id = %booking_id, error = %e, "Razorpay order creation failed");
            AppError::BadGateway(ORDER_FAILED.to_string())
        })
    }

    async fn post_order(&self, request: &CreateOrderRequest) -> Result<RazorpayOrder> {
        let url = format!("{}/orders", self.config.api_base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, "Razorpay create_order response");

        if status.is_success() {
            let order: RazorpayOrder = serde_json::from_str(&body)?;
            tracing::info!(
                order_id = %order.id,
                amount = order.amount,
                currency = %order.currency,
                "Razorpay order created"
            );
            Ok(order)
        } else {
            match serde_json::from_str::<RazorpayError>(&body) {
                Ok(error) => Err(anyhow!(
                    "Razorpay error {}: {} - {}",
                    status,
                    error.error.code,
                    error.error.description
                )),
                Err(_) => Err(anyhow!("Razorpay error {}: {}", status, body)),
            }
        }
    }

    /// Checkout signature: `hex(HMAC-SHA256(order_id|payment_id, key_secret))`.
    pub fn verify_payment_signature(&self, verification: &PaymentVerification<'_>) -> bool {
        let payload = format!("{}|{}", verification.order_id, verification.payment_id);
        let valid = self.check(
            self.config.key_secret.expose_secret(),
            payload.as_bytes(),
            verification.signature,
        );

        if valid {
            tracing::info!(
                order_id = %verification.order_id,
                payment_id = %verification.payment_id,
                "Payment signature verified"
            );
        } else {
            tracing::warn!(
                order_id = %verification.order_id,
                payment_id = %verification.payment_id,
                "Payment signature verification failed"
            );
        }
        valid
    }

    /// Webhook signature: `hex(HMAC-SHA256(raw body, webhook_secret))`.
    pub fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        let valid = self.check(self.config.webhook_secret.expose_secret(), body, signature);
        if !valid {
            tracing::warn!("Webhook signature verification failed");
        }
        valid
    }

    pub fn parse_webhook_event(&self, body: &[u8]) -> Result<WebhookEvent> {
        Ok(serde_json::from_slice(body)?)
    }

    fn check(&self, secret: &str, payload: &[u8], signature: &str) -> bool {
        if secret.is_empty() || signature.is_empty() {
            return false;
        }
        verify_hmac_sha256_hex(secret, payload, signature).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Signature computation failed");
            false
        })
    }
}
