use axum::extract::{Path, Query, State};
use axum::Json;
use service_core::error::AppError;
use service_core::middleware::auth::{AdminAuth, AnyAuth, ProviderAuth, UserAuth};
use service_core::response::ApiResponse;
use validator::Validate;

use crate::dtos::{
    BookingResponse, CreateBookingRequest, CreateServiceRequest, FeedbackResponse,
    FeedbackWithSummary, PageQuery, Paginated, ServiceListQuery, ServiceResponse,
};
use crate::services::booking::NewBooking;
use crate::services::repository::FeedbackFilter;
use crate::startup::AppState;
use crate::utils::money::{to_paise, to_positive_paise};

pub async fn create_booking(
    State(state): State<AppState>,
    auth: UserAuth,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<ApiResponse<BookingResponse>, AppError> {
    payload.validate()?;
    let input = NewBooking {
        products_amount: to_paise(payload.products_amount)?,
        service_id: payload.service_id,
        provider_id: payload.provider_id,
        coupon_code: payload.coupon_code,
    };
    let booking = state.bookings.create(auth.user_id(), input).await?;
    Ok(ApiResponse::created(booking.into()))
}

pub async fn get_booking(
    State(state): State<AppState>,
    auth: AnyAuth,
    Path(id): Path<String>,
) -> Result<ApiResponse<BookingResponse>, AppError> {
    let booking = state.bookings.get(&auth, &id).await?;
    Ok(ApiResponse::ok(booking.into()))
}

pub async fn complete_booking(
    State(state): State<AppState>,
    auth: ProviderAuth,
    Path(id): Path<String>,
) -> Result<ApiResponse<BookingResponse>, AppError> {
    let booking = state.bookings.complete(auth.user_id(), &id).await?;
    Ok(ApiResponse::ok(booking.into()).with_message("Booking completed"))
}

pub async fn create_service(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Json(payload): Json<CreateServiceRequest>,
) -> Result<ApiResponse<ServiceResponse>, AppError> {
    payload.validate()?;
    let price = to_positive_paise(payload.price)?;
    let service = state
        .catalog
        .create(payload.name, payload.category, price)
        .await?;
    Ok(ApiResponse::created(service.into()))
}

pub async fn list_services(
    State(state): State<AppState>,
    Query(query): Query<ServiceListQuery>,
) -> Result<ApiResponse<Vec<ServiceResponse>>, AppError> {
    let services = state.catalog.list(query.include_inactive).await?;
    Ok(ApiResponse::ok(services.into_iter().map(Into::into).collect()))
}

pub async fn get_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<ServiceResponse>, AppError> {
    let service = state.catalog.get(&id).await?;
    Ok(ApiResponse::ok(service.into()))
}

/// Public feedback for a catalog service with its rating summary.
pub async fn service_feedback(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<ApiResponse<FeedbackWithSummary>, AppError> {
    let summary = state.feedback.service_summary(&id).await?;
    let page = query.page();
    let filter = FeedbackFilter {
        service_id: Some(id),
        ..Default::default()
    };
    let (rows, total) = state.feedback.list(filter, page).await?;

    Ok(ApiResponse::ok(FeedbackWithSummary {
        summary: summary.into(),
        feedback: Paginated::<FeedbackResponse>::new(rows, total, page),
    }))
}
