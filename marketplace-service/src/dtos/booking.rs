use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::utc;
use crate::models::{Booking, BookingStatus, PaymentStatus, Service};
use crate::utils::money::from_paise;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    #[validate(length(min = 1, message = "service_id is required"))]
    pub service_id: String,
    #[validate(length(min = 1, message = "provider_id is required"))]
    pub provider_id: String,
    #[serde(default)]
    pub products_amount: Decimal,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: String,
    pub customer_id: String,
    pub provider_id: String,
    pub service_id: String,
    pub service_amount: Decimal,
    pub products_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            customer_id: b.customer_id,
            provider_id: b.provider_id,
            service_id: b.service_id,
            service_amount: from_paise(b.service_amount),
            products_amount: from_paise(b.products_amount),
            discount_amount: from_paise(b.discount_amount),
            total_amount: from_paise(b.total_amount),
            coupon_code: b.coupon_code,
            status: b.status,
            payment_status: b.payment_status,
            feedback_id: b.feedback_id,
            created_at: utc(b.created_at),
            updated_at: utc(b.updated_at),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateServiceRequest {
    #[validate(length(min = 1, max = 120, message = "name must be 1-120 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 60, message = "category must be 1-60 characters"))]
    pub category: String,
    pub price: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServiceListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Serialize)]
pub struct ServiceResponse {
    pub id: String,
    pub name: String,
    pub category: String,
    pub price: Decimal,
    pub is_active: bool,
    pub average_rating: f64,
    pub rating_count: i64,
    pub created_at: DateTime<Utc>,
}

impl From<Service> for ServiceResponse {
    fn from(s: Service) -> Self {
        Self {
            average_rating: s.average_rating(),
            id: s.id,
            name: s.name,
            category: s.category,
            price: from_paise(s.price),
            is_active: s.is_active,
            rating_count: s.rating_count,
            created_at: utc(s.created_at),
        }
    }
}
