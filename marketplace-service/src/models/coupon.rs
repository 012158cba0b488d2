use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

/// Discount code managed by admins. Values in paise except percentages.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Coupon {
    #[serde(rename = "_id")]
    pub id: String,
    /// Stored upper-cased; unique.
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub discount_type: DiscountType,
    /// Percent (1..=100) for percentage coupons, paise for fixed ones.
    pub discount_value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_discount: Option<i64>,
    pub expiry_date: DateTime,
    #[serde(default)]
    pub min_booking_value: i64,
    pub is_global: bool,
    #[serde(default)]
    pub is_first_booking: bool,
    #[serde(default)]
    pub assigned_to: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_limit: Option<i64>,
    #[serde(default)]
    pub used_by: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl Coupon {
    pub fn is_expired(&self, now: DateTime) -> bool {
        self.expiry_date <= now
    }

    pub fn is_exhausted(&self) -> bool {
        self.usage_limit
            .is_some_and(|limit| self.used_by.len() as i64 >= limit)
    }

    pub fn is_usable_by(&self, user_id: &str) -> bool {
        self.is_global || self.assigned_to.iter().any(|u| u == user_id)
    }

    pub fn used_by_user(&self, user_id: &str) -> bool {
        self.used_by.iter().any(|u| u == user_id)
    }

    /// Discount in paise for a booking of `booking_value` paise. Never
    /// exceeds the booking value.
    pub fn discount_for(&self, booking_value: i64) -> i64 {
        let raw = match self.discount_type {
            // i128 keeps `value * percent` exact; the quotient is at most the value.
            DiscountType::Percentage => {
                (i128::from(booking_value) * i128::from(self.discount_value) / 100) as i64
            }
            DiscountType::Fixed => self.discount_value,
        };
        let capped = match self.max_discount {
            Some(cap) => raw.min(cap),
            None => raw,
        };
        capped.clamp(0, booking_value.max(0))
    }
}
