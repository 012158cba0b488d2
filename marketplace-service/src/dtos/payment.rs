use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{utc, Page};
use crate::models::{
    PaymentMethod, Transaction, TransactionStatus, WithdrawalDetails, WithdrawalMethod,
};
use crate::services::payment::PaymentInitiation;
use crate::services::repository::{LedgerTotals, TransactionFilter};
use crate::utils::money::from_paise;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, message = "razorpay_order_id is required"))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1, message = "razorpay_payment_id is required"))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1, message = "razorpay_signature is required"))]
    pub razorpay_signature: String,
}

#[derive(Debug, Deserialize)]
pub struct WalletPaymentRequest {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: Decimal,
    pub withdrawal_method: WithdrawalMethod,
    #[serde(default)]
    pub withdrawal_details: WithdrawalDetails,
}

#[derive(Debug, Deserialize)]
pub struct CreditWalletRequest {
    pub amount: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    pub status: Option<TransactionStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
}

impl TransactionQuery {
    pub fn filter(&self) -> TransactionFilter {
        TransactionFilter {
            status: self.status,
            payment_method: self.payment_method,
            ..Default::default()
        }
    }

    pub fn page(&self) -> Page {
        Page::new(self.limit, self.skip)
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    pub amount: Decimal,
    pub admin_amount: Decimal,
    pub provider_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub razorpay_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub razorpay_payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdrawal_method: Option<WithdrawalMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdrawal_details: Option<WithdrawalDetails>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            booking_id: tx.booking_id,
            customer_id: tx.customer_id,
            provider_id: tx.provider_id,
            amount: from_paise(tx.amount),
            admin_amount: from_paise(tx.admin_amount),
            provider_amount: from_paise(tx.provider_amount),
            payment_method: tx.payment_method,
            status: tx.status,
            razorpay_order_id: tx.razorpay_order_id,
            razorpay_payment_id: tx.razorpay_payment_id,
            withdrawal_method: tx.withdrawal_method,
            withdrawal_details: tx.withdrawal_details,
            created_at: utc(tx.created_at),
            updated_at: utc(tx.updated_at),
        }
    }
}

/// What the client needs to open Razorpay checkout.
#[derive(Debug, Serialize)]
pub struct CheckoutOrder {
    pub order_id: String,
    pub amount: Decimal,
    /// Paise, as Razorpay checkout expects.
    pub amount_paise: i64,
    pub currency: String,
    pub key_id: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub transaction: TransactionResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<CheckoutOrder>,
}

impl PaymentResponse {
    pub fn new(initiation: PaymentInitiation, key_id: &str) -> Self {
        Self {
            transaction: initiation.transaction.into(),
            order: initiation.order.map(|order| CheckoutOrder {
                order_id: order.id,
                amount: from_paise(order.amount),
                amount_paise: order.amount,
                currency: order.currency,
                key_id: key_id.to_string(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EarningsResponse {
    pub total_earnings: Decimal,
    pub total_withdrawn: Decimal,
    pub pending_withdrawals: Decimal,
    pub available_balance: Decimal,
}

impl From<LedgerTotals> for EarningsResponse {
    fn from(totals: LedgerTotals) -> Self {
        Self {
            total_earnings: from_paise(totals.earned),
            total_withdrawn: from_paise(totals.withdrawn),
            pending_withdrawals: from_paise(totals.held),
            available_balance: from_paise(totals.available()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub user_id: String,
    pub wallet_balance: Decimal,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub event: String,
    pub outcome: &'static str,
}
