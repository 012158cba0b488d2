//! Ledger views, provider earnings and the withdrawal lifecycle.

use axum::extract::{Path, Query, State};
use axum::Json;
use service_core::error::AppError;
use service_core::middleware::auth::{AdminAuth, AnyAuth, ProviderAuth};
use service_core::response::ApiResponse;

use crate::dtos::{
    EarningsResponse, Paginated, TransactionQuery, TransactionResponse, WithdrawalRequest,
};
use crate::models::PaymentMethod;
use crate::startup::AppState;
use crate::utils::money::to_positive_paise;

/// Users see their payments, providers their earnings and withdrawals,
/// admins everything.
pub async fn list_transactions(
    State(state): State<AppState>,
    auth: AnyAuth,
    Query(query): Query<TransactionQuery>,
) -> Result<ApiResponse<Paginated<TransactionResponse>>, AppError> {
    let page = query.page();
    let (rows, total) = state
        .payments
        .get_transactions(&auth, query.filter(), page)
        .await?;
    Ok(ApiResponse::ok(Paginated::new(rows, total, page)))
}

pub async fn earnings(
    State(state): State<AppState>,
    auth: ProviderAuth,
) -> Result<ApiResponse<EarningsResponse>, AppError> {
    let totals = state.payments.earnings_summary(auth.user_id()).await?;
    Ok(ApiResponse::ok(totals.into()))
}

#[tracing::instrument(skip(state, auth, payload), fields(provider_id = %auth.user_id()))]
pub async fn initiate_withdrawal(
    State(state): State<AppState>,
    auth: ProviderAuth,
    Json(payload): Json<WithdrawalRequest>,
) -> Result<ApiResponse<TransactionResponse>, AppError> {
    let amount = to_positive_paise(payload.amount)?;
    let withdrawal = state
        .payments
        .initiate_withdrawal(
            auth.user_id(),
            amount,
            payload.withdrawal_method,
            payload.withdrawal_details,
        )
        .await?;
    Ok(ApiResponse::created(withdrawal.into()).with_message("Withdrawal request submitted"))
}

pub async fn list_withdrawals(
    State(state): State<AppState>,
    auth: AdminAuth,
    Query(mut query): Query<TransactionQuery>,
) -> Result<ApiResponse<Paginated<TransactionResponse>>, AppError> {
    query.payment_method = Some(PaymentMethod::Withdrawal);
    let page = query.page();
    let (rows, total) = state
        .payments
        .get_transactions(&auth.0, query.filter(), page)
        .await?;
    Ok(ApiResponse::ok(Paginated::new(rows, total, page)))
}

pub async fn approve_withdrawal(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(id): Path<String>,
) -> Result<ApiResponse<TransactionResponse>, AppError> {
    let withdrawal = state.payments.approve_withdrawal(&id).await?;
    Ok(ApiResponse::ok(withdrawal.into()).with_message("Withdrawal approved"))
}

pub async fn reject_withdrawal(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(id): Path<String>,
) -> Result<ApiResponse<TransactionResponse>, AppError> {
    let withdrawal = state.payments.reject_withdrawal(&id).await?;
    Ok(ApiResponse::ok(withdrawal.into()).with_message("Withdrawal rejected"))
}
