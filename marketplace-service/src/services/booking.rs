use mongodb::bson::DateTime;
use service_core::error::AppError;
use service_core::middleware::auth::{AuthContext, Role};
use std::sync::Arc;

use crate::models::{new_id, Booking, BookingStatus, PaymentStatus, Service};
use crate::services::coupon::{normalize_code, CouponService};
use crate::services::repository::Repository;
use crate::utils::money::checked_total;

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub service_id: String,
    pub provider_id: String,
    /// Paise.
    pub products_amount: i64,
    pub coupon_code: Option<String>,
}

#[derive(Clone)]
pub struct BookingService {
    repo: Arc<dyn Repository>,
    coupons: CouponService,
}

impl BookingService {
    pub fn new(repo: Arc<dyn Repository>, coupons: CouponService) -> Self {
        Self { repo, coupons }
    }

    /// Prices the booking from the catalog and redeems the coupon, if any,
    /// before the booking is stored.
    pub async fn create(&self, customer_id: &str, input: NewBooking) -> Result<Booking, AppError> {
        if input.products_amount < 0 {
            return Err(AppError::bad_request("Products amount must not be negative"));
        }

        let service = self
            .repo
            .get_service(&input.service_id)
            .await?
            .ok_or_else(|| AppError::not_found("Service not found"))?;
        if !service.is_active {
            return Err(AppError::bad_request("Service is not available"));
        }

        let provider = self
            .repo
            .get_user(&input.provider_id)
            .await?
            .filter(|u| u.role == Role::Provider)
            .ok_or_else(|| AppError::not_found("Provider not found"))?;

        let subtotal = checked_total(service.price, input.products_amount)?;
        let now = DateTime::now();

        let coupon_code = input
            .coupon_code
            .as_deref()
            .map(normalize_code)
            .filter(|c| !c.is_empty());

        let discount = match coupon_code.as_deref() {
            Some(code) => {
                let quote = self.coupons.validate(customer_id, code, subtotal, now).await?;
                if !self.coupons.mark_as_used(code, customer_id, now).await? {
                    return Err(AppError::bad_request("Coupon is no longer available"));
                }
                quote.discount
            }
            None => 0,
        };

        let booking = Booking {
            id: new_id(),
            customer_id: customer_id.to_string(),
            provider_id: provider.id,
            service_id: service.id,
            service_amount: service.price,
            products_amount: input.products_amount,
            discount_amount: discount,
            total_amount: subtotal - discount,
            coupon_code: coupon_code.clone(),
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            feedback_id: None,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.repo.insert_booking(booking.clone()).await {
            if let Some(code) = coupon_code.as_deref() {
                if let Err(release_err) = self.coupons.release(code, customer_id).await {
                    tracing::error!(
                        code = %code,
                        customer_id = %customer_id,
                        error = %release_err,
                        "Failed to release coupon after booking insert failed"
                    );
                }
            }
            return Err(e);
        }

        tracing::info!(
            booking_id = %booking.id,
            customer_id = %customer_id,
            provider_id = %booking.provider_id,
            total_amount = booking.total_amount,
            discount_amount = booking.discount_amount,
            "Booking created"
        );
        Ok(booking)
    }

    /// Visible to its customer, its provider and admins.
    pub async fn get(&self, auth: &AuthContext, id: &str) -> Result<Booking, AppError> {
        let booking = self
            .repo
            .get_booking(id)
            .await?
            .ok_or_else(|| AppError::not_found("Booking not found"))?;

        let allowed = auth.is_admin()
            || booking.customer_id == auth.user_id
            || booking.provider_id == auth.user_id;
        if !allowed {
            return Err(AppError::forbidden("Not allowed to view this booking"));
        }
        Ok(booking)
    }

    pub async fn complete(&self, provider_id: &str, id: &str) -> Result<Booking, AppError> {
        let booking = self
            .repo
            .get_booking(id)
            .await?
            .ok_or_else(|| AppError::not_found("Booking not found"))?;
        if booking.provider_id != provider_id {
            return Err(AppError::forbidden("Booking is not assigned to this provider"));
        }

        if !self
            .repo
            .set_booking_status(id, BookingStatus::Pending, BookingStatus::Completed)
            .await?
        {
            return Err(AppError::conflict("Only pending bookings can be completed"));
        }

        tracing::info!(booking_id = %id, provider_id = %provider_id, "Booking completed");
        self.repo
            .get_booking(id)
            .await?
            .ok_or_else(|| AppError::not_found("Booking not found"))
    }
}

#[derive(Clone)]
pub struct CatalogService {
    repo: Arc<dyn Repository>,
}

impl CatalogService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    pub async fn create(
        &self,
        name: String,
        category: String,
        price: i64,
    ) -> Result<Service, AppError> {
        let now = DateTime::now();
        let service = Service {
            id: new_id(),
            name,
            category,
            price,
            is_active: true,
            feedback: Vec::new(),
            rating_sum: 0,
            rating_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.repo.insert_service(service.clone()).await?;
        tracing::info!(service_id = %service.id, name = %service.name, "Service created");
        Ok(service)
    }

    pub async fn list(&self, include_inactive: bool) -> Result<Vec<Service>, AppError> {
        self.repo.list_services(!include_inactive).await
    }

    pub async fn get(&self, id: &str) -> Result<Service, AppError> {
        self.repo
            .get_service(id)
            .await?
            .ok_or_else(|| AppError::not_found("Service not found"))
    }
}
