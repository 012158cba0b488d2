use async_trait::async_trait;
use mongodb::bson::DateTime;
use service_core::error::AppError;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{FeedbackFilter, LedgerTotals, Page, RatingTotals, Repository, TransactionFilter};
use crate::utils::money::out_of_range;
use crate::models::{
    Booking, BookingStatus, Coupon, Feedback, PaymentStatus, Service, ServiceFeedbackEntry,
    Transaction, TransactionStatus, User,
};

/// Process-local storage for development (`STORAGE_BACKEND=memory`) and
/// tests. One lock guards all collections, so every trait method is atomic
/// with respect to every other.
#[derive(Default)]
pub struct InMemoryRepository {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    users: HashMap<String, User>,
    services: HashMap<String, Service>,
    bookings: HashMap<String, Booking>,
    // Insertion order doubles as a tie-breaker for equal timestamps.
    transactions: Vec<Transaction>,
    feedbacks: Vec<Feedback>,
    coupons: Vec<Coupon>,
}

impl State {
    fn has_completed_payment(&self, booking_id: &str, except_id: &str) -> bool {
        self.transactions.iter().any(|t| {
            t.id != except_id
                && t.status == TransactionStatus::Completed
                && t.booking_id.as_deref() == Some(booking_id)
        })
    }

    /// Moves the row to `completed` if its status is one of `from`; mirrors
    /// the partial unique index on completed booking payments.
    fn mark_completed(
        &mut self,
        id: &str,
        from: &[TransactionStatus],
        payment_id: Option<&str>,
        signature: Option<&str>,
    ) -> Result<bool, AppError> {
        let Some(index) = self
            .transactions
            .iter()
            .position(|t| t.id == id && from.contains(&t.status))
        else {
            return Ok(false);
        };

        if let Some(booking_id) = self.transactions[index].booking_id.clone() {
            if self.has_completed_payment(&booking_id, id) {
                return Err(AppError::conflict("Booking already has a completed payment"));
            }
        }

        let tx = &mut self.transactions[index];
        tx.status = TransactionStatus::Completed;
        if let Some(payment_id) = payment_id {
            tx.razorpay_payment_id = Some(payment_id.to_string());
        }
        if let Some(signature) = signature {
            tx.razorpay_signature = Some(signature.to_string());
        }
        tx.updated_at = DateTime::now();
        Ok(true)
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T: Clone>(mut rows: Vec<&T>, created_at: impl Fn(&T) -> DateTime, page: Page) -> (Vec<T>, u64) {
    let total = rows.len() as u64;
    // Rows arrive in insertion order; reverse first so the stable sort keeps
    // the newest insert ahead on timestamp ties.
    rows.reverse();
    rows.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    let items = rows
        .into_iter()
        .skip(page.skip as usize)
        .take(page.limit.max(0) as usize)
        .cloned()
        .collect();
    (items, total)
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn init_indexes(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn insert_user(&self, user: User) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if state.users.contains_key(&user.id) {
            return Err(AppError::conflict("User already exists"));
        }
        state.users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.state.read().await.users.get(id).cloned())
    }

    async fn debit_wallet(&self, user_id: &str, amount: i64) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        match state.users.get_mut(user_id) {
            Some(user) if user.wallet_balance >= amount => {
                user.wallet_balance -= amount;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn credit_wallet(&self, user_id: &str, amount: i64) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        match state.users.get_mut(user_id) {
            Some(user) => {
                user.wallet_balance = user
                    .wallet_balance
                    .checked_add(amount)
                    .ok_or_else(out_of_range)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn add_provider_feedback(
        &self,
        provider_id: &str,
        feedback_id: &str,
    ) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if let Some(provider) = state.users.get_mut(provider_id) {
            if !provider.feedbacks.iter().any(|f| f == feedback_id) {
                provider.feedbacks.push(feedback_id.to_string());
            }
        }
        Ok(())
    }

    async fn remove_provider_feedback(
        &self,
        provider_id: &str,
        feedback_id: &str,
    ) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if let Some(provider) = state.users.get_mut(provider_id) {
            provider.feedbacks.retain(|f| f != feedback_id);
        }
        Ok(())
    }

    async fn insert_service(&self, service: Service) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.services.insert(service.id.clone(), service);
        Ok(())
    }

    async fn get_service(&self, id: &str) -> Result<Option<Service>, AppError> {
        Ok(self.state.read().await.services.get(id).cloned())
    }

    async fn list_services(&self, active_only: bool) -> Result<Vec<Service>, AppError> {
        let state = self.state.read().await;
        let mut services: Vec<Service> = state
            .services
            .values()
            .filter(|s| !active_only || s.is_active)
            .cloned()
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }

    async fn push_service_feedback(
        &self,
        service_id: &str,
        entry: ServiceFeedbackEntry,
    ) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let Some(service) = state.services.get_mut(service_id) else {
            return Ok(false);
        };
        service.rating_sum += i64::from(entry.rating);
        service.rating_count += 1;
        service.feedback.push(entry);
        service.updated_at = DateTime::now();
        Ok(true)
    }

    async fn update_service_feedback(
        &self,
        service_id: &str,
        feedback_id: &str,
        old_rating: i32,
        new_rating: i32,
        comment: &str,
    ) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let Some(service) = state.services.get_mut(service_id) else {
            return Ok(false);
        };
        let Some(entry) = service
            .feedback
            .iter_mut()
            .find(|e| e.feedback_id == feedback_id && e.rating == old_rating)
        else {
            return Ok(false);
        };
        entry.rating = new_rating;
        entry.comment = comment.to_string();
        service.rating_sum += i64::from(new_rating - old_rating);
        service.updated_at = DateTime::now();
        Ok(true)
    }

    async fn pull_service_feedback(
        &self,
        service_id: &str,
        feedback_id: &str,
        rating: i32,
    ) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let Some(service) = state.services.get_mut(service_id) else {
            return Ok(false);
        };
        let before = service.feedback.len();
        service.feedback.retain(|e| e.feedback_id != feedback_id);
        if service.feedback.len() == before {
            return Ok(false);
        }
        service.rating_sum -= i64::from(rating);
        service.rating_count -= 1;
        service.updated_at = DateTime::now();
        Ok(true)
    }

    async fn insert_booking(&self, booking: Booking) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.bookings.insert(booking.id.clone(), booking);
        Ok(())
    }

    async fn get_booking(&self, id: &str) -> Result<Option<Booking>, AppError> {
        Ok(self.state.read().await.bookings.get(id).cloned())
    }

    async fn set_booking_payment_status(
        &self,
        id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        match state.bookings.get_mut(id) {
            Some(booking) if booking.payment_status == from => {
                booking.payment_status = to;
                booking.updated_at = DateTime::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_booking_status(
        &self,
        id: &str,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        match state.bookings.get_mut(id) {
            Some(booking) if booking.status == from => {
                booking.status = to;
                booking.updated_at = DateTime::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn attach_booking_feedback(
        &self,
        booking_id: &str,
        feedback_id: &str,
    ) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        match state.bookings.get_mut(booking_id) {
            Some(booking) if booking.feedback_id.is_none() => {
                booking.feedback_id = Some(feedback_id.to_string());
                booking.updated_at = DateTime::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn detach_booking_feedback(
        &self,
        booking_id: &str,
        feedback_id: &str,
    ) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if let Some(booking) = state.bookings.get_mut(booking_id) {
            if booking.feedback_id.as_deref() == Some(feedback_id) {
                booking.feedback_id = None;
                booking.updated_at = DateTime::now();
            }
        }
        Ok(())
    }

    async fn count_paid_bookings(&self, customer_id: &str) -> Result<u64, AppError> {
        let state = self.state.read().await;
        Ok(state
            .bookings
            .values()
            .filter(|b| b.customer_id == customer_id && b.payment_status == PaymentStatus::Paid)
            .count() as u64)
    }

    async fn insert_transaction(&self, tx: Transaction) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if tx.status == TransactionStatus::Completed {
            if let Some(ref booking_id) = tx.booking_id {
                if state.has_completed_payment(booking_id, &tx.id) {
                    return Err(AppError::conflict("Booking already has a completed payment"));
                }
            }
        }
        state.transactions.push(tx);
        Ok(())
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, AppError> {
        let state = self.state.read().await;
        Ok(state.transactions.iter().find(|t| t.id == id).cloned())
    }

    async fn find_transaction_by_order(
        &self,
        order_id: &str,
    ) -> Result<Option<Transaction>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .iter()
            .find(|t| t.razorpay_order_id.as_deref() == Some(order_id))
            .cloned())
    }

    async fn complete_transaction(
        &self,
        id: &str,
        payment_id: Option<&str>,
        signature: Option<&str>,
    ) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        state.mark_completed(id, &[TransactionStatus::Pending], payment_id, signature)
    }

    async fn capture_transaction(
        &self,
        id: &str,
        payment_id: Option<&str>,
        signature: Option<&str>,
    ) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        state.mark_completed(
            id,
            &[TransactionStatus::Pending, TransactionStatus::Failed],
            payment_id,
            signature,
        )
    }

    async fn fail_transaction(&self, id: &str) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        match state
            .transactions
            .iter_mut()
            .find(|t| t.id == id && t.status == TransactionStatus::Pending)
        {
            Some(tx) => {
                tx.status = TransactionStatus::Failed;
                tx.updated_at = DateTime::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
        page: Page,
    ) -> Result<(Vec<Transaction>, u64), AppError> {
        let state = self.state.read().await;
        let rows = state.transactions.iter().filter(|t| filter.matches(t)).collect();
        Ok(paginate(rows, |t| t.created_at, page))
    }

    async fn ledger_totals(&self, provider_id: &str) -> Result<LedgerTotals, AppError> {
        let state = self.state.read().await;
        let mut totals = LedgerTotals::default();
        for tx in state
            .transactions
            .iter()
            .filter(|t| t.provider_id.as_deref() == Some(provider_id))
        {
            match (tx.is_withdrawal(), tx.status) {
                (false, TransactionStatus::Completed) => {
                    totals.earned = totals.earned.saturating_add(tx.provider_amount)
                }
                (true, TransactionStatus::Completed) => {
                    totals.withdrawn = totals.withdrawn.saturating_add(tx.amount)
                }
                (true, TransactionStatus::Pending) => {
                    totals.held = totals.held.saturating_add(tx.amount)
                }
                _ => {}
            }
        }
        Ok(totals)
    }

    async fn insert_feedback(&self, feedback: Feedback) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if state
            .feedbacks
            .iter()
            .any(|f| f.booking_id == feedback.booking_id)
        {
            return Err(AppError::conflict(
                "Feedback already submitted for this booking",
            ));
        }
        state.feedbacks.push(feedback);
        Ok(())
    }

    async fn get_feedback(&self, id: &str) -> Result<Option<Feedback>, AppError> {
        let state = self.state.read().await;
        Ok(state.feedbacks.iter().find(|f| f.id == id).cloned())
    }

    async fn replace_feedback(&self, feedback: &Feedback) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        match state.feedbacks.iter_mut().find(|f| f.id == feedback.id) {
            Some(existing) => {
                *existing = feedback.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_feedback(&self, id: &str) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let before = state.feedbacks.len();
        state.feedbacks.retain(|f| f.id != id);
        Ok(state.feedbacks.len() != before)
    }

    async fn list_feedback(
        &self,
        filter: &FeedbackFilter,
        page: Page,
    ) -> Result<(Vec<Feedback>, u64), AppError> {
        let state = self.state.read().await;
        let rows = state.feedbacks.iter().filter(|f| filter.matches(f)).collect();
        Ok(paginate(rows, |f| f.created_at, page))
    }

    async fn provider_rating(&self, provider_id: &str) -> Result<RatingTotals, AppError> {
        let state = self.state.read().await;
        Ok(state
            .feedbacks
            .iter()
            .filter(|f| f.provider_feedback.provider_id == provider_id)
            .fold(RatingTotals::default(), |acc, f| RatingTotals {
                sum: acc.sum + i64::from(f.provider_feedback.rating),
                count: acc.count + 1,
            }))
    }

    async fn insert_coupon(&self, coupon: Coupon) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if state.coupons.iter().any(|c| c.code == coupon.code) {
            return Err(AppError::conflict("Coupon code already exists"));
        }
        state.coupons.push(coupon);
        Ok(())
    }

    async fn get_coupon(&self, id: &str) -> Result<Option<Coupon>, AppError> {
        let state = self.state.read().await;
        Ok(state.coupons.iter().find(|c| c.id == id).cloned())
    }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, AppError> {
        let state = self.state.read().await;
        Ok(state.coupons.iter().find(|c| c.code == code).cloned())
    }

    async fn replace_coupon(&self, coupon: &Coupon) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        if state
            .coupons
            .iter()
            .any(|c| c.code == coupon.code && c.id != coupon.id)
        {
            return Err(AppError::conflict("Coupon code already exists"));
        }
        match state.coupons.iter_mut().find(|c| c.id == coupon.id) {
            Some(existing) => {
                *existing = coupon.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_coupon(&self, id: &str) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let before = state.coupons.len();
        state.coupons.retain(|c| c.id != id);
        Ok(state.coupons.len() != before)
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>, AppError> {
        let state = self.state.read().await;
        let rows = state.coupons.iter().collect();
        let (coupons, _) = paginate(rows, |c| c.created_at, Page {
            limit: i64::MAX,
            skip: 0,
        });
        Ok(coupons)
    }

    async fn redeem_coupon(
        &self,
        code: &str,
        user_id: &str,
        now: DateTime,
    ) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        match state.coupons.iter_mut().find(|c| c.code == code) {
            Some(coupon)
                if coupon.is_active
                    && !coupon.is_expired(now)
                    && !coupon.used_by_user(user_id)
                    && !coupon.is_exhausted() =>
            {
                coupon.used_by.push(user_id.to_string());
                coupon.updated_at = DateTime::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_coupon(&self, code: &str, user_id: &str) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if let Some(coupon) = state.coupons.iter_mut().find(|c| c.code == code) {
            coupon.used_by.retain(|u| u != user_id);
        }
        Ok(())
    }
}
