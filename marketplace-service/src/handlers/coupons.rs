use axum::extract::{Path, State};
use axum::Json;
use mongodb::bson::DateTime;
use service_core::error::AppError;
use service_core::middleware::auth::{AdminAuth, UserAuth};
use service_core::response::ApiResponse;
use validator::Validate;

use crate::dtos::{
    CouponQuoteResponse, CouponResponse, CreateCouponRequest, UpdateCouponRequest,
    ValidateCouponRequest,
};
use crate::services::coupon::normalize_code;
use crate::startup::AppState;
use crate::utils::money::to_paise;

pub async fn create_coupon(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Json(payload): Json<CreateCouponRequest>,
) -> Result<ApiResponse<CouponResponse>, AppError> {
    payload.validate()?;
    let coupon = state.coupons.create(payload.into_new_coupon()?).await?;
    Ok(ApiResponse::created(coupon.into()).with_message("Coupon created"))
}

pub async fn list_coupons(
    State(state): State<AppState>,
    _admin: AdminAuth,
) -> Result<ApiResponse<Vec<CouponResponse>>, AppError> {
    let coupons = state.coupons.list().await?;
    Ok(ApiResponse::ok(coupons.into_iter().map(Into::into).collect()))
}

pub async fn update_coupon(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(id): Path<String>,
    Json(payload): Json<UpdateCouponRequest>,
) -> Result<ApiResponse<CouponResponse>, AppError> {
    payload.validate()?;
    let current = state
        .repository
        .get_coupon(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Coupon not found"))?;
    let changes = payload.into_changes(current.discount_type)?;
    let coupon = state.coupons.update(&id, changes).await?;
    Ok(ApiResponse::ok(coupon.into()).with_message("Coupon updated"))
}

pub async fn delete_coupon(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, AppError> {
    state.coupons.delete(&id).await?;
    Ok(ApiResponse::ok(()).with_message("Coupon deleted"))
}

pub async fn available_coupons(
    State(state): State<AppState>,
    auth: UserAuth,
) -> Result<ApiResponse<Vec<CouponResponse>>, AppError> {
    let coupons = state
        .coupons
        .available(auth.user_id(), DateTime::now())
        .await?;
    Ok(ApiResponse::ok(coupons.into_iter().map(Into::into).collect()))
}

pub async fn validate_coupon(
    State(state): State<AppState>,
    auth: UserAuth,
    Json(payload): Json<ValidateCouponRequest>,
) -> Result<ApiResponse<CouponQuoteResponse>, AppError> {
    payload.validate()?;
    let booking_value = to_paise(payload.booking_value)?;
    let quote = state
        .coupons
        .validate(auth.user_id(), &payload.code, booking_value, DateTime::now())
        .await?;
    Ok(ApiResponse::ok(CouponQuoteResponse::new(
        normalize_code(&payload.code),
        quote,
    )))
}
