use axum::extract::{Path, Query, State};
use axum::Json;
use mongodb::bson::DateTime;
use service_core::error::AppError;
use service_core::middleware::auth::{AdminAuth, AnyAuth, ProviderAuth, UserAuth};
use service_core::response::ApiResponse;
use validator::Validate;

use crate::dtos::{
    AdminFeedbackQuery, EditFeedbackRequest, FeedbackResponse, FeedbackWithSummary, PageQuery,
    Paginated, RatingSummaryResponse, SubmitFeedbackRequest,
};
use crate::services::repository::FeedbackFilter;
use crate::startup::AppState;

#[tracing::instrument(skip(state, auth, payload), fields(user_id = %auth.user_id(), booking_id = %payload.booking_id))]
pub async fn submit_feedback(
    State(state): State<AppState>,
    auth: UserAuth,
    Json(payload): Json<SubmitFeedbackRequest>,
) -> Result<ApiResponse<FeedbackResponse>, AppError> {
    payload.validate()?;
    let feedback = state
        .feedback
        .submit(auth.user_id(), payload.into())
        .await?;
    Ok(ApiResponse::created(feedback.into()).with_message("Feedback submitted"))
}

pub async fn my_feedback(
    State(state): State<AppState>,
    auth: UserAuth,
    Query(query): Query<PageQuery>,
) -> Result<ApiResponse<Paginated<FeedbackResponse>>, AppError> {
    let page = query.page();
    let filter = FeedbackFilter {
        customer_id: Some(auth.user_id().to_string()),
        ..Default::default()
    };
    let (rows, total) = state.feedback.list(filter, page).await?;
    Ok(ApiResponse::ok(Paginated::new(rows, total, page)))
}

pub async fn edit_feedback(
    State(state): State<AppState>,
    auth: UserAuth,
    Path(id): Path<String>,
    Json(payload): Json<EditFeedbackRequest>,
) -> Result<ApiResponse<FeedbackResponse>, AppError> {
    payload.validate()?;
    let feedback = state
        .feedback
        .edit(auth.user_id(), &id, payload.into(), DateTime::now())
        .await?;
    Ok(ApiResponse::ok(feedback.into()).with_message("Feedback updated"))
}

/// Authors delete their own feedback; admins may delete any.
pub async fn delete_feedback(
    State(state): State<AppState>,
    auth: AnyAuth,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, AppError> {
    state.feedback.delete(&auth, &id).await?;
    Ok(ApiResponse::ok(()).with_message("Feedback deleted"))
}

/// Feedback received by the calling provider.
pub async fn provider_feedback(
    State(state): State<AppState>,
    auth: ProviderAuth,
    Query(query): Query<PageQuery>,
) -> Result<ApiResponse<FeedbackWithSummary>, AppError> {
    let summary = state.feedback.provider_summary(auth.user_id()).await?;
    let page = query.page();
    let filter = FeedbackFilter {
        provider_id: Some(auth.user_id().to_string()),
        ..Default::default()
    };
    let (rows, total) = state.feedback.list(filter, page).await?;

    Ok(ApiResponse::ok(FeedbackWithSummary {
        summary: summary.into(),
        feedback: Paginated::new(rows, total, page),
    }))
}

pub async fn provider_summary(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
) -> Result<ApiResponse<RatingSummaryResponse>, AppError> {
    let summary = state.feedback.provider_summary(&provider_id).await?;
    Ok(ApiResponse::ok(summary.into()))
}

pub async fn admin_list_feedback(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Query(query): Query<AdminFeedbackQuery>,
) -> Result<ApiResponse<Paginated<FeedbackResponse>>, AppError> {
    if let Some(rating) = query.rating {
        if !(1..=5).contains(&rating) {
            return Err(AppError::bad_request("Rating filter must be between 1 and 5"));
        }
    }
    let page = query.page();
    let filter = FeedbackFilter {
        rating: query.rating,
        provider_id: query.provider_id,
        service_id: query.service_id,
        ..Default::default()
    };
    let (rows, total) = state.feedback.list(filter, page).await?;
    Ok(ApiResponse::ok(Paginated::new(rows, total, page)))
}

pub async fn admin_delete_feedback(
    State(state): State<AppState>,
    admin: AdminAuth,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, AppError> {
    state.feedback.delete(&admin.0, &id).await?;
    Ok(ApiResponse::ok(()).with_message("Feedback deleted"))
}
