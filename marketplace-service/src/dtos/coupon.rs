use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

use super::utc;
use crate::models::{Coupon, DiscountType};
use crate::services::coupon::{CouponChanges, NewCoupon, Quote};
use crate::utils::money::{from_paise, to_paise};

fn default_true() -> bool {
    true
}

/// Percent for percentage coupons, rupees for fixed ones.
fn discount_value(discount_type: DiscountType, value: Decimal) -> Result<i64, AppError> {
    match discount_type {
        DiscountType::Percentage => {
            if !value.fract().is_zero() {
                return Err(AppError::bad_request("Percentage must be a whole number"));
            }
            value
                .to_i64()
                .ok_or_else(|| AppError::bad_request("Percentage is out of range"))
        }
        DiscountType::Fixed => to_paise(value),
    }
}

/// Keeps an explicit `null` apart from an absent field: absent is `None`,
/// `null` is `Some(None)`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn bson_time(value: DateTime<Utc>) -> mongodb::bson::DateTime {
    mongodb::bson::DateTime::from_chrono(value)
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCouponRequest {
    #[validate(length(min = 1, max = 32, message = "code must be 1-32 characters"))]
    pub code: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub description: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub max_discount: Option<Decimal>,
    pub expiry_date: DateTime<Utc>,
    #[serde(default)]
    pub min_booking_value: Decimal,
    #[serde(default = "default_true")]
    pub is_global: bool,
    #[serde(default)]
    pub is_first_booking: bool,
    #[serde(default)]
    pub assigned_to: Vec<String>,
    pub usage_limit: Option<i64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl CreateCouponRequest {
    pub fn into_new_coupon(self) -> Result<NewCoupon, AppError> {
        Ok(NewCoupon {
            discount_value: discount_value(self.discount_type, self.discount_value)?,
            max_discount: self.max_discount.map(to_paise).transpose()?,
            min_booking_value: to_paise(self.min_booking_value)?,
            expiry_date: bson_time(self.expiry_date),
            code: self.code,
            description: self.description,
            discount_type: self.discount_type,
            is_global: self.is_global,
            is_first_booking: self.is_first_booking,
            assigned_to: self.assigned_to,
            usage_limit: self.usage_limit,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCouponRequest {
    #[validate(length(min = 1, max = 32, message = "code must be 1-32 characters"))]
    pub code: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<Decimal>,
    /// `null` removes the cap.
    #[serde(default, deserialize_with = "nullable")]
    pub max_discount: Option<Option<Decimal>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub min_booking_value: Option<Decimal>,
    pub is_global: Option<bool>,
    pub is_first_booking: Option<bool>,
    pub assigned_to: Option<Vec<String>>,
    /// `null` removes the limit.
    #[serde(default, deserialize_with = "nullable")]
    pub usage_limit: Option<Option<i64>>,
    pub is_active: Option<bool>,
}

impl UpdateCouponRequest {
    /// `current_type` interprets `discount_value` when the type is unchanged.
    pub fn into_changes(self, current_type: DiscountType) -> Result<CouponChanges, AppError> {
        let effective_type = self.discount_type.unwrap_or(current_type);
        Ok(CouponChanges {
            discount_value: self
                .discount_value
                .map(|v| discount_value(effective_type, v))
                .transpose()?,
            max_discount: self
                .max_discount
                .map(|cap| cap.map(to_paise).transpose())
                .transpose()?,
            min_booking_value: self.min_booking_value.map(to_paise).transpose()?,
            expiry_date: self.expiry_date.map(bson_time),
            code: self.code,
            description: self.description,
            discount_type: self.discount_type,
            is_global: self.is_global,
            is_first_booking: self.is_first_booking,
            assigned_to: self.assigned_to,
            usage_limit: self.usage_limit,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, message = "code is required"))]
    pub code: String,
    pub booking_value: Decimal,
}

#[derive(Debug, Serialize)]
pub struct CouponQuoteResponse {
    pub code: String,
    pub discount: Decimal,
    pub final_amount: Decimal,
}

impl CouponQuoteResponse {
    pub fn new(code: String, quote: Quote) -> Self {
        Self {
            code,
            discount: from_paise(quote.discount),
            final_amount: from_paise(quote.final_amount),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CouponResponse {
    pub id: String,
    pub code: String,
    pub description: String,
    pub discount_type: DiscountType,
    /// Percent or rupees, following `discount_type`.
    pub discount_value: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_discount: Option<Decimal>,
    pub expiry_date: DateTime<Utc>,
    pub min_booking_value: Decimal,
    pub is_global: bool,
    pub is_first_booking: bool,
    pub assigned_to: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_limit: Option<i64>,
    pub times_used: usize,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Coupon> for CouponResponse {
    fn from(c: Coupon) -> Self {
        Self {
            discount_value: match c.discount_type {
                DiscountType::Percentage => Decimal::from(c.discount_value),
                DiscountType::Fixed => from_paise(c.discount_value),
            },
            max_discount: c.max_discount.map(from_paise),
            min_booking_value: from_paise(c.min_booking_value),
            expiry_date: utc(c.expiry_date),
            times_used: c.used_by.len(),
            id: c.id,
            code: c.code,
            description: c.description,
            discount_type: c.discount_type,
            is_global: c.is_global,
            is_first_booking: c.is_first_booking,
            assigned_to: c.assigned_to,
            usage_limit: c.usage_limit,
            is_active: c.is_active,
            created_at: utc(c.created_at),
        }
    }
}
