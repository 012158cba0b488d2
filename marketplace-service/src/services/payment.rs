//! Money movement: customer payments (cash, online, wallet), provider
//! withdrawals and the earnings ledger.
//!
//! Each flow is a sequence of single-document conditional writes. The ledger
//! row is written before the booking is marked paid, so the partial unique
//! index on completed payments decides which of two racing payments wins;
//! the loser undoes its own earlier steps.

use mongodb::bson::DateTime;
use service_core::error::AppError;
use service_core::middleware::auth::{AuthContext, Role};
use std::sync::Arc;

use crate::models::{
    new_id, Booking, PaymentMethod, PaymentStatus, Transaction, TransactionStatus,
    WithdrawalDetails, WithdrawalMethod,
};
use crate::services::metrics;
use crate::services::razorpay::{PaymentVerification, RazorpayClient, RazorpayOrder, WebhookEvent};
use crate::services::repository::{LedgerTotals, Page, Repository, TransactionFilter};
use crate::utils::money::checked_total;

/// How a booking's total is divided between the platform and the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    pub admin_amount: i64,
    pub provider_amount: i64,
}

/// The platform keeps the service charge; the provider receives the
/// products amount.
pub fn split_payment(booking: &Booking) -> Split {
    Split {
        admin_amount: booking.service_amount,
        provider_amount: booking.products_amount,
    }
}

/// Result of starting a customer payment.
#[derive(Debug)]
pub struct PaymentInitiation {
    pub transaction: Transaction,
    /// Present for online payments; the client completes checkout with it.
    pub order: Option<RazorpayOrder>,
}

/// What a webhook delivery did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Completed,
    Failed,
    AlreadyProcessed,
    UnknownOrder,
    Ignored,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Completed => "completed",
            WebhookOutcome::Failed => "failed",
            WebhookOutcome::AlreadyProcessed => "already_processed",
            WebhookOutcome::UnknownOrder => "unknown_order",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

#[derive(Clone)]
pub struct PaymentService {
    repo: Arc<dyn Repository>,
    razorpay: RazorpayClient,
}

impl PaymentService {
    pub fn new(repo: Arc<dyn Repository>, razorpay: RazorpayClient) -> Self {
        Self { repo, razorpay }
    }

    pub fn razorpay(&self) -> &RazorpayClient {
        &self.razorpay
    }

    /// Loads a booking the caller owns and may still pay for `amount`.
    async fn payable_booking(
        &self,
        user_id: &str,
        booking_id: &str,
        amount: i64,
    ) -> Result<Booking, AppError> {
        let booking = self
            .repo
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| AppError::not_found("Booking not found"))?;

        if booking.customer_id != user_id {
            return Err(AppError::forbidden("Booking does not belong to this user"));
        }
        if booking.payment_status == PaymentStatus::Paid {
            return Err(AppError::conflict("Booking is already paid"));
        }
        if amount != booking.total_amount {
            return Err(AppError::bad_request(
                "Payment amount does not match the booking total",
            ));
        }
        Ok(booking)
    }

    fn payment_row(booking: &Booking, method: PaymentMethod, status: TransactionStatus) -> Transaction {
        let split = split_payment(booking);
        let now = DateTime::now();
        Transaction {
            id: new_id(),
            booking_id: Some(booking.id.clone()),
            customer_id: Some(booking.customer_id.clone()),
            provider_id: Some(booking.provider_id.clone()),
            amount: booking.total_amount,
            admin_amount: split.admin_amount,
            provider_amount: split.provider_amount,
            payment_method: method,
            status,
            razorpay_order_id: None,
            razorpay_payment_id: None,
            razorpay_signature: None,
            withdrawal_method: None,
            withdrawal_details: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the booking paid after its completed ledger row exists.
    async fn mark_booking_paid(&self, booking_id: &str) -> Result<(), AppError> {
        let claimed = self
            .repo
            .set_booking_payment_status(booking_id, PaymentStatus::Unpaid, PaymentStatus::Paid)
            .await?;
        if !claimed {
            tracing::warn!(booking_id = %booking_id, "Booking was already marked paid");
        }
        Ok(())
    }

    pub async fn create_customer_payment(
        &self,
        user_id: &str,
        booking_id: &str,
        amount: i64,
        method: PaymentMethod,
    ) -> Result<PaymentInitiation, AppError> {
        match method {
            PaymentMethod::Cash => self.pay_cash(user_id, booking_id, amount).await,
            PaymentMethod::Online => self.start_online(user_id, booking_id, amount).await,
            PaymentMethod::Wallet => {
                let transaction = self.pay_from_wallet(user_id, booking_id, amount).await?;
                Ok(PaymentInitiation {
                    transaction,
                    order: None,
                })
            }
            PaymentMethod::Withdrawal => Err(AppError::bad_request(
                "Withdrawal is not a customer payment method",
            )),
        }
    }

    async fn pay_cash(
        &self,
        user_id: &str,
        booking_id: &str,
        amount: i64,
    ) -> Result<PaymentInitiation, AppError> {
        let booking = self.payable_booking(user_id, booking_id, amount).await?;
        let transaction = Self::payment_row(&booking, PaymentMethod::Cash, TransactionStatus::Completed);

        self.repo
            .insert_transaction(transaction.clone())
            .await
            .map_err(already_paid)?;
        self.mark_booking_paid(&booking.id).await?;

        metrics::record_payment(PaymentMethod::Cash.as_str(), TransactionStatus::Completed.as_str());
        metrics::record_amount("payment", transaction.amount);
        tracing::info!(
            booking_id = %booking.id,
            transaction_id = %transaction.id,
            amount = transaction.amount,
            "Cash payment recorded"
        );

        Ok(PaymentInitiation {
            transaction,
            order: None,
        })
    }

    async fn start_online(
        &self,
        user_id: &str,
        booking_id: &str,
        amount: i64,
    ) -> Result<PaymentInitiation, AppError> {
        let booking = self.payable_booking(user_id, booking_id, amount).await?;
        let order = self.razorpay.create_order(&booking.id, booking.total_amount).await?;

        let mut transaction =
            Self::payment_row(&booking, PaymentMethod::Online, TransactionStatus::Pending);
        transaction.razorpay_order_id = Some(order.id.clone());
        self.repo.insert_transaction(transaction.clone()).await?;

        metrics::record_payment(PaymentMethod::Online.as_str(), TransactionStatus::Pending.as_str());
        tracing::info!(
            booking_id = %booking.id,
            transaction_id = %transaction.id,
            order_id = %order.id,
            "Online payment initiated"
        );

        Ok(PaymentInitiation {
            transaction,
            order: Some(order),
        })
    }

    /// Confirms a checkout. The signature is checked before anything is
    /// read or written; repeating a successful verification returns the
    /// completed transaction unchanged.
    pub async fn verify_payment(
        &self,
        user_id: &str,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<Transaction, AppError> {
        let verification = PaymentVerification {
            order_id,
            payment_id,
            signature,
        };
        if !self.razorpay.verify_payment_signature(&verification) {
            return Err(AppError::unauthorized("Invalid payment signature"));
        }

        let transaction = self
            .repo
            .find_transaction_by_order(order_id)
            .await?
            .ok_or_else(|| AppError::not_found("Transaction not found for this order"))?;

        if transaction.customer_id.as_deref() != Some(user_id) {
            return Err(AppError::forbidden("Transaction does not belong to this user"));
        }

        if transaction.status == TransactionStatus::Completed {
            return Ok(transaction);
        }
        // A valid signature proves a captured payment, even after a failed attempt.
        self.settle_online(&transaction, Some(payment_id), Some(signature))
            .await?;
        self.repo
            .get_transaction(&transaction.id)
            .await?
            .ok_or_else(|| AppError::not_found("Transaction not found"))
    }

    /// `pending | failed -> completed` for an online payment, then marks the
    /// booking paid. Returns `false` when another request completed it first.
    async fn settle_online(
        &self,
        transaction: &Transaction,
        payment_id: Option<&str>,
        signature: Option<&str>,
    ) -> Result<bool, AppError> {
        let completed = match self
            .repo
            .capture_transaction(&transaction.id, payment_id, signature)
            .await
        {
            Ok(completed) => completed,
            Err(AppError::Conflict(_)) => {
                tracing::error!(
                    transaction_id = %transaction.id,
                    booking_id = ?transaction.booking_id,
                    order_id = ?transaction.razorpay_order_id,
                    payment_id = ?payment_id,
                    "Online payment captured for a booking that is already paid; requires manual refund"
                );
                self.repo.fail_transaction(&transaction.id).await?;
                metrics::record_payment(PaymentMethod::Online.as_str(), "duplicate");
                return Err(AppError::conflict("Booking is already paid"));
            }
            Err(e) => return Err(e),
        };

        if !completed {
            let current = self.repo.get_transaction(&transaction.id).await?;
            return match current.map(|t| t.status) {
                Some(TransactionStatus::Completed) => Ok(false),
                _ => Err(AppError::conflict("Transaction can no longer be completed")),
            };
        }

        if let Some(booking_id) = transaction.booking_id.as_deref() {
            self.mark_booking_paid(booking_id).await?;
        }

        metrics::record_payment(PaymentMethod::Online.as_str(), TransactionStatus::Completed.as_str());
        metrics::record_amount("payment", transaction.amount);
        tracing::info!(
            transaction_id = %transaction.id,
            booking_id = ?transaction.booking_id,
            payment_id = ?payment_id,
            "Online payment completed"
        );
        Ok(true)
    }

    /// Applies a verified Razorpay webhook.
    pub async fn handle_webhook_event(
        &self,
        event: &WebhookEvent,
    ) -> Result<WebhookOutcome, AppError> {
        let failed = match event.event.as_str() {
            "payment.captured" | "order.paid" => false,
            "payment.failed" => true,
            _ => return Ok(WebhookOutcome::Ignored),
        };

        let Some(order_id) = event.order_id() else {
            tracing::warn!(event = %event.event, "Webhook event without an order id");
            return Ok(WebhookOutcome::Ignored);
        };

        let Some(transaction) = self.repo.find_transaction_by_order(order_id).await? else {
            tracing::warn!(event = %event.event, order_id = %order_id, "Webhook for unknown order");
            return Ok(WebhookOutcome::UnknownOrder);
        };

        match (transaction.status, failed) {
            (TransactionStatus::Completed, _) | (TransactionStatus::Failed, true) => {
                return Ok(WebhookOutcome::AlreadyProcessed);
            }
            _ => {}
        }

        if failed {
            let flipped = self.repo.fail_transaction(&transaction.id).await?;
            if !flipped {
                return Ok(WebhookOutcome::AlreadyProcessed);
            }
            metrics::record_payment(PaymentMethod::Online.as_str(), TransactionStatus::Failed.as_str());
            tracing::info!(
                transaction_id = %transaction.id,
                order_id = %order_id,
                "Online payment failed"
            );
            return Ok(WebhookOutcome::Failed);
        }

        match self
            .settle_online(&transaction, event.payment_id(), None)
            .await
        {
            Ok(true) => Ok(WebhookOutcome::Completed),
            Ok(false) => Ok(WebhookOutcome::AlreadyProcessed),
            // Already logged for refund; Razorpay must not retry it.
            Err(AppError::Conflict(_)) => Ok(WebhookOutcome::AlreadyProcessed),
            Err(e) => Err(e),
        }
    }

    /// Pays a booking from the customer's wallet. A failed balance check
    /// writes nothing; a lost race for the booking re-credits the wallet.
    pub async fn pay_from_wallet(
        &self,
        user_id: &str,
        booking_id: &str,
        amount: i64,
    ) -> Result<Transaction, AppError> {
        let booking = self.payable_booking(user_id, booking_id, amount).await?;

        if !self.repo.debit_wallet(user_id, booking.total_amount).await? {
            return Err(AppError::bad_request("Insufficient wallet balance"));
        }

        let transaction = Self::payment_row(&booking, PaymentMethod::Wallet, TransactionStatus::Completed);
        if let Err(e) = self.repo.insert_transaction(transaction.clone()).await {
            self.refund_wallet(user_id, booking.total_amount).await;
            return Err(already_paid(e));
        }
        self.mark_booking_paid(&booking.id).await?;

        metrics::record_payment(PaymentMethod::Wallet.as_str(), TransactionStatus::Completed.as_str());
        metrics::record_amount("payment", transaction.amount);
        tracing::info!(
            booking_id = %booking.id,
            transaction_id = %transaction.id,
            amount = transaction.amount,
            "Wallet payment recorded"
        );
        Ok(transaction)
    }

    async fn refund_wallet(&self, user_id: &str, amount: i64) {
        match self.repo.credit_wallet(user_id, amount).await {
            Ok(true) => tracing::info!(user_id = %user_id, amount, "Wallet debit reversed"),
            Ok(false) => tracing::error!(user_id = %user_id, amount, "Wallet reversal found no user"),
            Err(e) => tracing::error!(
                user_id = %user_id,
                amount,
                error = %e,
                "Wallet reversal failed; requires manual correction"
            ),
        }
    }

    /// Requests a payout. The pending row is the hold: it is written first
    /// and counted against the balance, so concurrent requests can never
    /// together exceed what the provider has earned.
    pub async fn initiate_withdrawal(
        &self,
        provider_id: &str,
        amount: i64,
        method: WithdrawalMethod,
        details: WithdrawalDetails,
    ) -> Result<Transaction, AppError> {
        if amount <= 0 {
            return Err(AppError::bad_request("Amount must be greater than zero"));
        }
        if let Some(field) = details.missing_field(method) {
            return Err(AppError::bad_request(format!(
                "{} is required for this withdrawal method",
                field
            )));
        }

        // Cheap early rejection; the hold below is what actually guards races.
        if amount > self.repo.ledger_totals(provider_id).await?.available() {
            metrics::record_withdrawal("rejected_insufficient");
            return Err(AppError::bad_request("Insufficient balance for withdrawal"));
        }

        let now = DateTime::now();
        let hold = Transaction {
            id: new_id(),
            booking_id: None,
            customer_id: None,
            provider_id: Some(provider_id.to_string()),
            amount,
            admin_amount: 0,
            provider_amount: amount,
            payment_method: PaymentMethod::Withdrawal,
            status: TransactionStatus::Pending,
            razorpay_order_id: None,
            razorpay_payment_id: None,
            razorpay_signature: None,
            withdrawal_method: Some(method),
            withdrawal_details: Some(details),
            created_at: now,
            updated_at: now,
        };
        self.repo.insert_transaction(hold.clone()).await?;

        let totals = self.repo.ledger_totals(provider_id).await?;
        if totals.available() < 0 {
            self.repo.fail_transaction(&hold.id).await?;
            metrics::record_withdrawal("rejected_insufficient");
            tracing::info!(
                provider_id = %provider_id,
                amount,
                available = totals.available().saturating_add(amount),
                "Withdrawal exceeds available balance"
            );
            return Err(AppError::bad_request("Insufficient balance for withdrawal"));
        }

        metrics::record_withdrawal(TransactionStatus::Pending.as_str());
        tracing::info!(
            provider_id = %provider_id,
            transaction_id = %hold.id,
            amount,
            "Withdrawal requested"
        );
        Ok(hold)
    }

    pub async fn earnings_summary(&self, provider_id: &str) -> Result<LedgerTotals, AppError> {
        self.repo.ledger_totals(provider_id).await
    }

    /// Lists what the caller may see, newest first.
    pub async fn get_transactions(
        &self,
        auth: &AuthContext,
        mut filter: TransactionFilter,
        page: Page,
    ) -> Result<(Vec<Transaction>, u64), AppError> {
        match auth.role {
            Role::User => {
                filter.customer_id = Some(auth.user_id.clone());
                filter.provider_id = None;
            }
            Role::Provider => {
                filter.provider_id = Some(auth.user_id.clone());
                filter.customer_id = None;
            }
            Role::Admin => {}
        }
        self.repo.list_transactions(&filter, page).await
    }

    async fn withdrawal(&self, id: &str) -> Result<Transaction, AppError> {
        self.repo
            .get_transaction(id)
            .await?
            .filter(Transaction::is_withdrawal)
            .ok_or_else(|| AppError::not_found("Withdrawal not found"))
    }

    /// Pays out a held withdrawal.
    pub async fn approve_withdrawal(&self, id: &str) -> Result<Transaction, AppError> {
        self.withdrawal(id).await?;
        if !self.repo.complete_transaction(id, None, None).await? {
            return Err(AppError::conflict("Withdrawal is not pending"));
        }
        metrics::record_withdrawal(TransactionStatus::Completed.as_str());
        tracing::info!(transaction_id = %id, "Withdrawal approved");
        self.withdrawal(id).await
    }

    /// Releases a held withdrawal back to the provider's balance.
    pub async fn reject_withdrawal(&self, id: &str) -> Result<Transaction, AppError> {
        self.withdrawal(id).await?;
        if !self.repo.fail_transaction(id).await? {
            return Err(AppError::conflict("Withdrawal is not pending"));
        }
        metrics::record_withdrawal(TransactionStatus::Failed.as_str());
        tracing::info!(transaction_id = %id, "Withdrawal rejected");
        self.withdrawal(id).await
    }

    pub async fn wallet_balance(&self, user_id: &str) -> Result<i64, AppError> {
        self.repo
            .get_user(user_id)
            .await?
            .map(|u| u.wallet_balance)
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    /// Adds funds to a wallet and returns the new balance.
    pub async fn credit_wallet(&self, user_id: &str, amount: i64) -> Result<i64, AppError> {
        if amount <= 0 {
            return Err(AppError::bad_request("Amount must be greater than zero"));
        }
        let balance = self.wallet_balance(user_id).await?;
        checked_total(balance, amount)?;
        if !self.repo.credit_wallet(user_id, amount).await? {
            return Err(AppError::not_found("User not found"));
        }
        metrics::record_amount("wallet_credit", amount);
        tracing::info!(user_id = %user_id, amount, "Wallet credited");
        self.wallet_balance(user_id).await
    }
}

fn already_paid(err: AppError) -> AppError {
    match err {
        AppError::Conflict(_) => AppError::conflict("Booking is already paid"),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingStatus;

    #[test]
    fn split_keeps_service_charge_for_platform() {
        let now = DateTime::now();
        let booking = Booking {
            id: "b1".into(),
            customer_id: "c1".into(),
            provider_id: "p1".into(),
            service_id: "s1".into(),
            service_amount: 50_000,
            products_amount: 12_000,
            discount_amount: 0,
            total_amount: 62_000,
            coupon_code: None,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            feedback_id: None,
            created_at: now,
            updated_at: now,
        };

        assert_eq!(
            split_payment(&booking),
            Split {
                admin_amount: 50_000,
                provider_amount: 12_000,
            }
        );
    }
}
