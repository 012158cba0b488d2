use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

/// One money movement: a customer paying for a booking, or a provider
/// withdrawing earnings. Amounts are in paise.
///
/// Rows are never deleted; only `status` (and gateway ids) change.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Transaction {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    pub amount: i64,
    pub admin_amount: i64,
    pub provider_amount: i64,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub razorpay_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub razorpay_payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub razorpay_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawal_method: Option<WithdrawalMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawal_details: Option<WithdrawalDetails>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Transaction {
    pub fn is_withdrawal(&self) -> bool {
        self.payment_method == PaymentMethod::Withdrawal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Online,
    Wallet,
    Withdrawal,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Online => "online",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Withdrawal => "withdrawal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalMethod {
    BankTransfer,
    Upi,
}

/// Payout destination. Bank transfers need account holder, number and IFSC;
/// UPI payouts need a VPA.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_holder_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ifsc_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upi_id: Option<String>,
}

impl WithdrawalDetails {
    /// Returns the first missing field for the chosen method, if any.
    pub fn missing_field(&self, method: WithdrawalMethod) -> Option<&'static str> {
        fn blank(v: &Option<String>) -> bool {
            v.as_deref().map(str::trim).unwrap_or_default().is_empty()
        }

        match method {
            WithdrawalMethod::BankTransfer => {
                if blank(&self.account_holder_name) {
                    Some("account_holder_name")
                } else if blank(&self.account_number) {
                    Some("account_number")
                } else if blank(&self.ifsc_code) {
                    Some("ifsc_code")
                } else {
                    None
                }
            }
            WithdrawalMethod::Upi => blank(&self.upi_id).then_some("upi_id"),
        }
    }
}
