use mongodb::bson::DateTime;
use service_core::error::AppError;
use std::sync::Arc;

use crate::models::{new_id, Coupon, DiscountType};
use crate::services::metrics;
use crate::services::repository::Repository;

/// Fields an admin supplies when creating a coupon. Money in paise.
#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub code: String,
    pub description: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub max_discount: Option<i64>,
    pub expiry_date: DateTime,
    pub min_booking_value: i64,
    pub is_global: bool,
    pub is_first_booking: bool,
    pub assigned_to: Vec<String>,
    pub usage_limit: Option<i64>,
    pub is_active: bool,
}

/// Partial update; `None` leaves a field unchanged. For the optional limits
/// `Some(None)` clears the field.
#[derive(Debug, Clone, Default)]
pub struct CouponChanges {
    pub code: Option<String>,
    pub description: Option<String>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<i64>,
    pub max_discount: Option<Option<i64>>,
    pub expiry_date: Option<DateTime>,
    pub min_booking_value: Option<i64>,
    pub is_global: Option<bool>,
    pub is_first_booking: Option<bool>,
    pub assigned_to: Option<Vec<String>>,
    pub usage_limit: Option<Option<i64>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub discount: i64,
    pub final_amount: i64,
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn check_terms(coupon: &Coupon) -> Result<(), AppError> {
    if coupon.code.is_empty() {
        return Err(AppError::bad_request("Coupon code is required"));
    }
    match coupon.discount_type {
        DiscountType::Percentage if !(1..=100).contains(&coupon.discount_value) => Err(
            AppError::bad_request("Percentage discount must be between 1 and 100"),
        ),
        DiscountType::Fixed if coupon.discount_value <= 0 => Err(AppError::bad_request(
            "Fixed discount must be greater than zero",
        )),
        _ if coupon.max_discount.is_some_and(|m| m <= 0) => Err(AppError::bad_request(
            "Maximum discount must be greater than zero",
        )),
        _ if coupon.usage_limit.is_some_and(|l| l <= 0) => Err(AppError::bad_request(
            "Usage limit must be greater than zero",
        )),
        _ if coupon.min_booking_value < 0 => Err(AppError::bad_request(
            "Minimum booking value must not be negative",
        )),
        _ => Ok(()),
    }
}

#[derive(Clone)]
pub struct CouponService {
    repo: Arc<dyn Repository>,
}

impl CouponService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    pub async fn create(&self, input: NewCoupon) -> Result<Coupon, AppError> {
        let now = DateTime::now();
        let coupon = Coupon {
            id: new_id(),
            code: normalize_code(&input.code),
            description: input.description,
            discount_type: input.discount_type,
            discount_value: input.discount_value,
            max_discount: input.max_discount,
            expiry_date: input.expiry_date,
            min_booking_value: input.min_booking_value,
            is_global: input.is_global,
            is_first_booking: input.is_first_booking,
            assigned_to: input.assigned_to,
            usage_limit: input.usage_limit,
            used_by: Vec::new(),
            is_active: input.is_active,
            created_at: now,
            updated_at: now,
        };
        check_terms(&coupon)?;

        self.repo.insert_coupon(coupon.clone()).await?;
        tracing::info!(coupon_id = %coupon.id, code = %coupon.code, "Coupon created");
        Ok(coupon)
    }

    pub async fn update(&self, id: &str, changes: CouponChanges) -> Result<Coupon, AppError> {
        let mut coupon = self
            .repo
            .get_coupon(id)
            .await?
            .ok_or_else(|| AppError::not_found("Coupon not found"))?;

        if let Some(code) = changes.code {
            coupon.code = normalize_code(&code);
        }
        if let Some(description) = changes.description {
            coupon.description = description;
        }
        if let Some(discount_type) = changes.discount_type {
            coupon.discount_type = discount_type;
        }
        if let Some(value) = changes.discount_value {
            coupon.discount_value = value;
        }
        if let Some(max) = changes.max_discount {
            coupon.max_discount = max;
        }
        if let Some(expiry) = changes.expiry_date {
            coupon.expiry_date = expiry;
        }
        if let Some(min) = changes.min_booking_value {
            coupon.min_booking_value = min;
        }
        if let Some(is_global) = changes.is_global {
            coupon.is_global = is_global;
        }
        if let Some(first) = changes.is_first_booking {
            coupon.is_first_booking = first;
        }
        if let Some(assigned) = changes.assigned_to {
            coupon.assigned_to = assigned;
        }
        if let Some(limit) = changes.usage_limit {
            coupon.usage_limit = limit;
        }
        if let Some(active) = changes.is_active {
            coupon.is_active = active;
        }
        coupon.updated_at = DateTime::now();
        check_terms(&coupon)?;

        if !self.repo.replace_coupon(&coupon).await? {
            return Err(AppError::not_found("Coupon not found"));
        }
        tracing::info!(coupon_id = %coupon.id, code = %coupon.code, "Coupon updated");
        Ok(coupon)
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        if !self.repo.delete_coupon(id).await? {
            return Err(AppError::not_found("Coupon not found"));
        }
        tracing::info!(coupon_id = %id, "Coupon deleted");
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Coupon>, AppError> {
        self.repo.list_coupons().await
    }

    async fn is_first_booking(&self, user_id: &str) -> Result<bool, AppError> {
        Ok(self.repo.count_paid_bookings(user_id).await? == 0)
    }

    /// Coupons the user could apply right now.
    pub async fn available(&self, user_id: &str, now: DateTime) -> Result<Vec<Coupon>, AppError> {
        let first_booking = self.is_first_booking(user_id).await?;
        let coupons = self.repo.list_coupons().await?;

        Ok(coupons
            .into_iter()
            .filter(|c| {
                c.is_active
                    && !c.is_expired(now)
                    && c.is_usable_by(user_id)
                    && !c.used_by_user(user_id)
                    && !c.is_exhausted()
                    && (!c.is_first_booking || first_booking)
            })
            .collect())
    }

    /// Discount the user would get on a booking of `booking_value` paise,
    /// or the reason the coupon does not apply.
    pub async fn validate(
        &self,
        user_id: &str,
        code: &str,
        booking_value: i64,
        now: DateTime,
    ) -> Result<Quote, AppError> {
        let code = normalize_code(code);
        let coupon = self
            .repo
            .find_coupon_by_code(&code)
            .await?
            .ok_or_else(|| AppError::bad_request("Invalid coupon code"))?;

        if !coupon.is_active {
            return Err(AppError::bad_request("Coupon is not active"));
        }
        if coupon.is_expired(now) {
            return Err(AppError::bad_request("Coupon has expired"));
        }
        if !coupon.is_usable_by(user_id) {
            return Err(AppError::bad_request("Coupon is not available for this user"));
        }
        if coupon.used_by_user(user_id) {
            return Err(AppError::bad_request("Coupon has already been used"));
        }
        if coupon.is_exhausted() {
            return Err(AppError::bad_request("Coupon usage limit reached"));
        }
        if booking_value < coupon.min_booking_value {
            return Err(AppError::bad_request(format!(
                "Minimum booking value for this coupon is {}",
                crate::utils::money::from_paise(coupon.min_booking_value)
            )));
        }
        if coupon.is_first_booking && !self.is_first_booking(user_id).await? {
            return Err(AppError::bad_request("Coupon is valid on the first booking only"));
        }

        let discount = coupon.discount_for(booking_value);
        Ok(Quote {
            discount,
            final_amount: booking_value - discount,
        })
    }

    /// Records a use of the coupon by the user; `false` when it is no
    /// longer redeemable.
    pub async fn mark_as_used(
        &self,
        code: &str,
        user_id: &str,
        now: DateTime,
    ) -> Result<bool, AppError> {
        let redeemed = self
            .repo
            .redeem_coupon(&normalize_code(code), user_id, now)
            .await?;
        metrics::record_coupon_redemption(if redeemed { "redeemed" } else { "rejected" });
        Ok(redeemed)
    }

    pub async fn release(&self, code: &str, user_id: &str) -> Result<(), AppError> {
        self.repo.release_coupon(&normalize_code(code), user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coupon(discount_type: DiscountType, value: i64, max: Option<i64>) -> Coupon {
        let now = DateTime::now();
        Coupon {
            id: "c1".into(),
            code: "SAVE".into(),
            description: String::new(),
            discount_type,
            discount_value: value,
            max_discount: max,
            expiry_date: DateTime::from_millis(now.timestamp_millis() + 86_400_000),
            min_booking_value: 0,
            is_global: true,
            is_first_booking: false,
            assigned_to: vec![],
            usage_limit: None,
            used_by: vec![],
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn percentage_discount_is_capped() {
        let c = coupon(DiscountType::Percentage, 20, Some(5_000));
        assert_eq!(c.discount_for(10_000), 2_000);
        assert_eq!(c.discount_for(100_000), 5_000);
    }

    #[test]
    fn fixed_discount_never_exceeds_booking_value() {
        let c = coupon(DiscountType::Fixed, 30_000, None);
        assert_eq!(c.discount_for(50_000), 30_000);
        assert_eq!(c.discount_for(20_000), 20_000);
    }

    #[test]
    fn percentage_of_a_huge_booking_does_not_overflow() {
        let c = coupon(DiscountType::Percentage, 100, None);
        assert_eq!(c.discount_for(i64::MAX), i64::MAX);
        let c = coupon(DiscountType::Percentage, 50, None);
        assert_eq!(c.discount_for(i64::MAX), i64::MAX / 2);
    }

    #[test]
    fn terms_reject_out_of_range_percentage() {
        assert!(check_terms(&coupon(DiscountType::Percentage, 150, None)).is_err());
        assert!(check_terms(&coupon(DiscountType::Fixed, 0, None)).is_err());
        assert!(check_terms(&coupon(DiscountType::Percentage, 100, None)).is_ok());
    }

    #[test]
    fn codes_are_upper_cased() {
        assert_eq!(normalize_code("  welcome10 "), "WELCOME10");
    }
}
