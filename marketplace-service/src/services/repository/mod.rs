//! Persistence seam for the marketplace.
//!
//! Every method that guards an invariant (wallet balance, single completed
//! payment per booking, single feedback per booking, coupon usage limits) is
//! a single conditional write, so callers never need a read-then-write
//! sequence to stay correct under concurrent requests.

mod memory;
mod mongo;

pub use memory::InMemoryRepository;
pub use mongo::MongoRepository;

use async_trait::async_trait;
use mongodb::bson::DateTime;
use service_core::error::AppError;

use crate::models::{
    Booking, BookingStatus, Coupon, Feedback, PaymentMethod, PaymentStatus, Service,
    ServiceFeedbackEntry, Transaction, TransactionStatus, User,
};

/// Offset pagination.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: i64,
    pub skip: u64,
}

impl Page {
    pub const MAX_LIMIT: i64 = 100;

    pub fn new(limit: Option<i64>, skip: Option<u64>) -> Self {
        Self {
            limit: limit.unwrap_or(20).clamp(1, Self::MAX_LIMIT),
            skip: skip.unwrap_or(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub customer_id: Option<String>,
    pub provider_id: Option<String>,
    pub booking_id: Option<String>,
    pub status: Option<TransactionStatus>,
    pub payment_method: Option<PaymentMethod>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        fn eq(want: &Option<String>, have: &Option<String>) -> bool {
            want.as_ref().map_or(true, |w| have.as_ref() == Some(w))
        }

        eq(&self.customer_id, &tx.customer_id)
            && eq(&self.provider_id, &tx.provider_id)
            && eq(&self.booking_id, &tx.booking_id)
            && self.status.map_or(true, |s| s == tx.status)
            && self.payment_method.map_or(true, |m| m == tx.payment_method)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeedbackFilter {
    pub customer_id: Option<String>,
    pub provider_id: Option<String>,
    pub service_id: Option<String>,
    /// Matches feedback whose provider *or* service rating equals this value.
    pub rating: Option<i32>,
}

impl FeedbackFilter {
    pub fn matches(&self, fb: &Feedback) -> bool {
        self.customer_id
            .as_ref()
            .map_or(true, |c| &fb.customer_id == c)
            && self
                .provider_id
                .as_ref()
                .map_or(true, |p| &fb.provider_feedback.provider_id == p)
            && self
                .service_id
                .as_ref()
                .map_or(true, |s| &fb.service_feedback.service_id == s)
            && self.rating.map_or(true, |r| {
                fb.provider_feedback.rating == r || fb.service_feedback.rating == r
            })
    }
}

/// Sums over a provider's ledger rows, in paise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerTotals {
    /// `provider_amount` of completed customer payments.
    pub earned: i64,
    /// Completed withdrawals.
    pub withdrawn: i64,
    /// Pending withdrawals (funds on hold).
    pub held: i64,
}

impl LedgerTotals {
    pub fn available(&self) -> i64 {
        self.earned
            .saturating_sub(self.withdrawn)
            .saturating_sub(self.held)
    }
}

/// Raw rating aggregate; see [`crate::models::catalog::average_rating`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RatingTotals {
    pub sum: i64,
    pub count: i64,
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn init_indexes(&self) -> Result<(), AppError>;
    async fn health_check(&self) -> Result<(), AppError>;

    // Users & wallets
    async fn insert_user(&self, user: User) -> Result<(), AppError>;
    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError>;
    /// Debits only when the balance covers `amount`; returns whether it did.
    async fn debit_wallet(&self, user_id: &str, amount: i64) -> Result<bool, AppError>;
    /// Returns `false` when the user does not exist.
    async fn credit_wallet(&self, user_id: &str, amount: i64) -> Result<bool, AppError>;
    async fn add_provider_feedback(
        &self,
        provider_id: &str,
        feedback_id: &str,
    ) -> Result<(), AppError>;
    async fn remove_provider_feedback(
        &self,
        provider_id: &str,
        feedback_id: &str,
    ) -> Result<(), AppError>;

    // Catalog
    async fn insert_service(&self, service: Service) -> Result<(), AppError>;
    async fn get_service(&self, id: &str) -> Result<Option<Service>, AppError>;
    async fn list_services(&self, active_only: bool) -> Result<Vec<Service>, AppError>;
    /// Appends the entry and adds its rating to the running totals.
    async fn push_service_feedback(
        &self,
        service_id: &str,
        entry: ServiceFeedbackEntry,
    ) -> Result<bool, AppError>;
    /// Rewrites an embedded entry, provided it still carries `old_rating`.
    async fn update_service_feedback(
        &self,
        service_id: &str,
        feedback_id: &str,
        old_rating: i32,
        new_rating: i32,
        comment: &str,
    ) -> Result<bool, AppError>;
    /// Removes an embedded entry and subtracts `rating` from the totals.
    async fn pull_service_feedback(
        &self,
        service_id: &str,
        feedback_id: &str,
        rating: i32,
    ) -> Result<bool, AppError>;

    // Bookings
    async fn insert_booking(&self, booking: Booking) -> Result<(), AppError>;
    async fn get_booking(&self, id: &str) -> Result<Option<Booking>, AppError>;
    /// Compare-and-set on `payment_status`.
    async fn set_booking_payment_status(
        &self,
        id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<bool, AppError>;
    /// Compare-and-set on `status`.
    async fn set_booking_status(
        &self,
        id: &str,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<bool, AppError>;
    /// Links feedback to a booking that has none yet.
    async fn attach_booking_feedback(
        &self,
        booking_id: &str,
        feedback_id: &str,
    ) -> Result<bool, AppError>;
    async fn detach_booking_feedback(
        &self,
        booking_id: &str,
        feedback_id: &str,
    ) -> Result<(), AppError>;
    async fn count_paid_bookings(&self, customer_id: &str) -> Result<u64, AppError>;

    // Transactions
    /// Fails with `Conflict` if it would create a second completed payment
    /// for the same booking.
    async fn insert_transaction(&self, tx: Transaction) -> Result<(), AppError>;
    async fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, AppError>;
    async fn find_transaction_by_order(
        &self,
        order_id: &str,
    ) -> Result<Option<Transaction>, AppError>;
    /// `pending -> completed`, recording gateway ids when given. Fails with
    /// `Conflict` if the booking already has a completed payment.
    async fn complete_transaction(
        &self,
        id: &str,
        payment_id: Option<&str>,
        signature: Option<&str>,
    ) -> Result<bool, AppError>;
    /// `pending | failed -> completed` for a gateway capture. A failed
    /// attempt may be followed by a successful retry on the same order.
    /// Same `Conflict` rule as [`Repository::complete_transaction`].
    async fn capture_transaction(
        &self,
        id: &str,
        payment_id: Option<&str>,
        signature: Option<&str>,
    ) -> Result<bool, AppError>;
    /// `pending -> failed`.
    async fn fail_transaction(&self, id: &str) -> Result<bool, AppError>;
    /// Newest first, with the total match count.
    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
        page: Page,
    ) -> Result<(Vec<Transaction>, u64), AppError>;
    async fn ledger_totals(&self, provider_id: &str) -> Result<LedgerTotals, AppError>;

    // Feedback
    /// Fails with `Conflict` when the booking already has feedback.
    async fn insert_feedback(&self, feedback: Feedback) -> Result<(), AppError>;
    async fn get_feedback(&self, id: &str) -> Result<Option<Feedback>, AppError>;
    async fn replace_feedback(&self, feedback: &Feedback) -> Result<bool, AppError>;
    async fn delete_feedback(&self, id: &str) -> Result<bool, AppError>;
    /// Newest first, with the total match count.
    async fn list_feedback(
        &self,
        filter: &FeedbackFilter,
        page: Page,
    ) -> Result<(Vec<Feedback>, u64), AppError>;
    /// Aggregated over `provider_feedback.rating` at read time.
    async fn provider_rating(&self, provider_id: &str) -> Result<RatingTotals, AppError>;

    // Coupons
    /// Fails with `Conflict` on a duplicate code.
    async fn insert_coupon(&self, coupon: Coupon) -> Result<(), AppError>;
    async fn get_coupon(&self, id: &str) -> Result<Option<Coupon>, AppError>;
    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, AppError>;
    async fn replace_coupon(&self, coupon: &Coupon) -> Result<bool, AppError>;
    async fn delete_coupon(&self, id: &str) -> Result<bool, AppError>;
    async fn list_coupons(&self) -> Result<Vec<Coupon>, AppError>;
    /// Records a use by `user_id` if the coupon is active, unexpired at
    /// `now`, not yet used by them and under its usage limit.
    async fn redeem_coupon(
        &self,
        code: &str,
        user_id: &str,
        now: DateTime,
    ) -> Result<bool, AppError>;
    /// Undoes [`Repository::redeem_coupon`].
    async fn release_coupon(&self, code: &str, user_id: &str) -> Result<(), AppError>;
}
