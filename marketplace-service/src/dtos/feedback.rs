use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{utc, Page, Paginated};
use crate::models::{Feedback, ProviderFeedback, ServiceFeedback};
use crate::services::feedback::{FeedbackChanges, NewFeedback, RatingSummary};

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitFeedbackRequest {
    #[validate(length(min = 1, message = "booking_id is required"))]
    pub booking_id: String,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub provider_rating: i32,
    #[serde(default)]
    #[validate(length(max = 500, message = "Comment must be at most 500 characters"))]
    pub provider_comment: String,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub service_rating: i32,
    #[serde(default)]
    #[validate(length(max = 500, message = "Comment must be at most 500 characters"))]
    pub service_comment: String,
}

impl From<SubmitFeedbackRequest> for NewFeedback {
    fn from(req: SubmitFeedbackRequest) -> Self {
        Self {
            booking_id: req.booking_id,
            provider_rating: req.provider_rating,
            provider_comment: req.provider_comment,
            service_rating: req.service_rating,
            service_comment: req.service_comment,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct EditFeedbackRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub provider_rating: Option<i32>,
    #[validate(length(max = 500, message = "Comment must be at most 500 characters"))]
    pub provider_comment: Option<String>,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub service_rating: Option<i32>,
    #[validate(length(max = 500, message = "Comment must be at most 500 characters"))]
    pub service_comment: Option<String>,
}

impl From<EditFeedbackRequest> for FeedbackChanges {
    fn from(req: EditFeedbackRequest) -> Self {
        Self {
            provider_rating: req.provider_rating,
            provider_comment: req.provider_comment,
            service_rating: req.service_rating,
            service_comment: req.service_comment,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminFeedbackQuery {
    pub rating: Option<i32>,
    pub provider_id: Option<String>,
    pub service_id: Option<String>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
}

impl AdminFeedbackQuery {
    pub fn page(&self) -> Page {
        Page::new(self.limit, self.skip)
    }
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub id: String,
    pub booking_id: String,
    pub customer_id: String,
    pub provider_feedback: ProviderFeedback,
    pub service_feedback: ServiceFeedback,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Feedback> for FeedbackResponse {
    fn from(f: Feedback) -> Self {
        Self {
            id: f.id,
            booking_id: f.booking_id,
            customer_id: f.customer_id,
            provider_feedback: f.provider_feedback,
            service_feedback: f.service_feedback,
            created_at: utc(f.created_at),
            updated_at: utc(f.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RatingSummaryResponse {
    pub average_rating: f64,
    pub rating_count: i64,
}

impl From<RatingSummary> for RatingSummaryResponse {
    fn from(s: RatingSummary) -> Self {
        Self {
            average_rating: s.average_rating,
            rating_count: s.rating_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeedbackWithSummary {
    pub summary: RatingSummaryResponse,
    pub feedback: Paginated<FeedbackResponse>,
}
