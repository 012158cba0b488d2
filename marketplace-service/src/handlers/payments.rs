use axum::extract::{Path, State};
use axum::Json;
use service_core::error::AppError;
use service_core::middleware::auth::{AdminAuth, UserAuth};
use service_core::response::ApiResponse;

use crate::dtos::{
    CreatePaymentRequest, CreditWalletRequest, PaymentResponse, TransactionResponse,
    WalletPaymentRequest, WalletResponse,
};
use crate::models::TransactionStatus;
use crate::startup::AppState;
use crate::utils::money::{from_paise, to_paise, to_positive_paise};

#[tracing::instrument(skip(state, auth, payload), fields(user_id = %auth.user_id(), method = payload.payment_method.as_str()))]
pub async fn create_payment(
    State(state): State<AppState>,
    auth: UserAuth,
    Path(booking_id): Path<String>,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<ApiResponse<PaymentResponse>, AppError> {
    let amount = to_paise(payload.amount)?;
    let initiation = state
        .payments
        .create_customer_payment(auth.user_id(), &booking_id, amount, payload.payment_method)
        .await?;

    let message = match initiation.transaction.status {
        TransactionStatus::Pending => "Payment order created",
        _ => "Payment recorded",
    };
    let response = PaymentResponse::new(initiation, state.razorpay.key_id());
    Ok(ApiResponse::created(response).with_message(message))
}

#[tracing::instrument(skip(state, auth, payload), fields(user_id = %auth.user_id()))]
pub async fn pay_from_wallet(
    State(state): State<AppState>,
    auth: UserAuth,
    Path(booking_id): Path<String>,
    Json(payload): Json<WalletPaymentRequest>,
) -> Result<ApiResponse<TransactionResponse>, AppError> {
    let amount = to_paise(payload.amount)?;
    let transaction = state
        .payments
        .pay_from_wallet(auth.user_id(), &booking_id, amount)
        .await?;
    Ok(ApiResponse::created(transaction.into()).with_message("Payment recorded"))
}

pub async fn wallet_balance(
    State(state): State<AppState>,
    auth: UserAuth,
) -> Result<ApiResponse<WalletResponse>, AppError> {
    let balance = state.payments.wallet_balance(auth.user_id()).await?;
    Ok(ApiResponse::ok(WalletResponse {
        user_id: auth.user_id().to_string(),
        wallet_balance: from_paise(balance),
    }))
}

pub async fn credit_wallet(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(user_id): Path<String>,
    Json(payload): Json<CreditWalletRequest>,
) -> Result<ApiResponse<WalletResponse>, AppError> {
    let amount = to_positive_paise(payload.amount)?;
    let balance = state.payments.credit_wallet(&user_id, amount).await?;
    Ok(ApiResponse::ok(WalletResponse {
        user_id,
        wallet_balance: from_paise(balance),
    })
    .with_message("Wallet credited"))
}
