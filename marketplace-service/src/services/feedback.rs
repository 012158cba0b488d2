//! Customer feedback and the rating aggregates derived from it.
//!
//! A feedback document has three denormalised echoes: the booking's
//! `feedback_id`, the provider's `feedbacks` list and an embedded entry on
//! the service together with its `(rating_sum, rating_count)` totals. Every
//! create, edit and delete keeps all three in step.

use mongodb::bson::DateTime;
use service_core::error::AppError;
use service_core::middleware::auth::AuthContext;
use std::sync::Arc;

use crate::models::catalog::average_rating;
use crate::models::{
    new_id, BookingStatus, Feedback, ProviderFeedback, ServiceFeedback, ServiceFeedbackEntry,
};
use crate::services::metrics;
use crate::services::repository::{FeedbackFilter, Page, Repository};

/// Feedback may be edited for this long after it was submitted.
pub const EDIT_WINDOW_SECS: i64 = 7 * 24 * 60 * 60;

pub const MAX_COMMENT_LEN: usize = 500;

/// Whether feedback created at `created_at` may still be edited at `now`.
pub fn edit_window_open(created_at: DateTime, now: DateTime) -> bool {
    now.timestamp_millis() - created_at.timestamp_millis() <= EDIT_WINDOW_SECS * 1000
}

fn check_rating(rating: i32) -> Result<(), AppError> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::bad_request("Rating must be between 1 and 5"));
    }
    Ok(())
}

fn check_comment(comment: &str) -> Result<(), AppError> {
    if comment.chars().count() > MAX_COMMENT_LEN {
        return Err(AppError::bad_request(format!(
            "Comment must be at most {} characters",
            MAX_COMMENT_LEN
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub booking_id: String,
    pub provider_rating: i32,
    pub provider_comment: String,
    pub service_rating: i32,
    pub service_comment: String,
}

#[derive(Debug, Clone, Default)]
pub struct FeedbackChanges {
    pub provider_rating: Option<i32>,
    pub provider_comment: Option<String>,
    pub service_rating: Option<i32>,
    pub service_comment: Option<String>,
}

impl FeedbackChanges {
    fn is_empty(&self) -> bool {
        self.provider_rating.is_none()
            && self.provider_comment.is_none()
            && self.service_rating.is_none()
            && self.service_comment.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSummary {
    pub average_rating: f64,
    pub rating_count: i64,
}

impl RatingSummary {
    pub fn new(sum: i64, count: i64) -> Self {
        Self {
            average_rating: average_rating(sum, count),
            rating_count: count,
        }
    }
}

#[derive(Clone)]
pub struct FeedbackService {
    repo: Arc<dyn Repository>,
}

impl FeedbackService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    pub async fn submit(&self, customer_id: &str, input: NewFeedback) -> Result<Feedback, AppError> {
        check_rating(input.provider_rating)?;
        check_rating(input.service_rating)?;
        check_comment(&input.provider_comment)?;
        check_comment(&input.service_comment)?;

        let booking = self
            .repo
            .get_booking(&input.booking_id)
            .await?
            .ok_or_else(|| AppError::not_found("Booking not found"))?;

        if booking.customer_id != customer_id {
            return Err(AppError::forbidden("Booking does not belong to this user"));
        }
        if booking.status != BookingStatus::Completed {
            return Err(AppError::bad_request(
                "Feedback can only be given for completed bookings",
            ));
        }
        if booking.feedback_id.is_some() {
            return Err(AppError::conflict("Feedback already submitted for this booking"));
        }
        if self.repo.get_service(&booking.service_id).await?.is_none() {
            return Err(AppError::not_found("Service not found"));
        }

        let now = DateTime::now();
        let feedback = Feedback {
            id: new_id(),
            booking_id: booking.id.clone(),
            customer_id: customer_id.to_string(),
            provider_feedback: ProviderFeedback {
                provider_id: booking.provider_id.clone(),
                rating: input.provider_rating,
                comment: input.provider_comment,
                is_edited: false,
            },
            service_feedback: ServiceFeedback {
                service_id: booking.service_id.clone(),
                rating: input.service_rating,
                comment: input.service_comment,
                is_edited: false,
            },
            created_at: now,
            updated_at: now,
        };

        // The unique index on booking_id arbitrates concurrent submits.
        self.repo.insert_feedback(feedback.clone()).await?;

        if !self
            .repo
            .attach_booking_feedback(&booking.id, &feedback.id)
            .await?
        {
            self.repo.delete_feedback(&feedback.id).await?;
            return Err(AppError::conflict("Feedback already submitted for this booking"));
        }

        self.repo
            .add_provider_feedback(&booking.provider_id, &feedback.id)
            .await?;

        let entry = ServiceFeedbackEntry {
            feedback_id: feedback.id.clone(),
            customer_id: customer_id.to_string(),
            rating: feedback.service_feedback.rating,
            comment: feedback.service_feedback.comment.clone(),
            created_at: now,
        };
        if !self.repo.push_service_feedback(&booking.service_id, entry).await? {
            // Every stored feedback has a matching service entry.
            tracing::warn!(
                service_id = %booking.service_id,
                feedback_id = %feedback.id,
                "Service disappeared during feedback submit; rolling back"
            );
            self.repo.delete_feedback(&feedback.id).await?;
            self.repo
                .detach_booking_feedback(&booking.id, &feedback.id)
                .await?;
            self.repo
                .remove_provider_feedback(&booking.provider_id, &feedback.id)
                .await?;
            return Err(AppError::not_found("Service not found"));
        }

        metrics::record_feedback("created");
        tracing::info!(
            feedback_id = %feedback.id,
            booking_id = %booking.id,
            provider_rating = feedback.provider_feedback.rating,
            service_rating = feedback.service_feedback.rating,
            "Feedback submitted"
        );
        Ok(feedback)
    }

    /// Author-only, within [`EDIT_WINDOW_SECS`] of submission.
    pub async fn edit(
        &self,
        customer_id: &str,
        feedback_id: &str,
        changes: FeedbackChanges,
        now: DateTime,
    ) -> Result<Feedback, AppError> {
        if changes.is_empty() {
            return Err(AppError::bad_request("Nothing to update"));
        }
        if let Some(r) = changes.provider_rating {
            check_rating(r)?;
        }
        if let Some(r) = changes.service_rating {
            check_rating(r)?;
        }
        if let Some(ref c) = changes.provider_comment {
            check_comment(c)?;
        }
        if let Some(ref c) = changes.service_comment {
            check_comment(c)?;
        }

        let mut feedback = self
            .repo
            .get_feedback(feedback_id)
            .await?
            .ok_or_else(|| AppError::not_found("Feedback not found"))?;

        if feedback.customer_id != customer_id {
            return Err(AppError::forbidden("Only the author can edit this feedback"));
        }
        if !edit_window_open(feedback.created_at, now) {
            return Err(AppError::bad_request(
                "Feedback can only be edited within 7 days of submission",
            ));
        }

        if changes.provider_rating.is_some() || changes.provider_comment.is_some() {
            let part = &mut feedback.provider_feedback;
            if let Some(rating) = changes.provider_rating {
                part.rating = rating;
            }
            if let Some(comment) = changes.provider_comment {
                part.comment = comment;
            }
            part.is_edited = true;
        }

        if changes.service_rating.is_some() || changes.service_comment.is_some() {
            let old_rating = feedback.service_feedback.rating;
            let part = &mut feedback.service_feedback;
            if let Some(rating) = changes.service_rating {
                part.rating = rating;
            }
            if let Some(comment) = changes.service_comment {
                part.comment = comment;
            }
            part.is_edited = true;

            let updated = self
                .repo
                .update_service_feedback(
                    &part.service_id,
                    &feedback.id,
                    old_rating,
                    part.rating,
                    &part.comment,
                )
                .await?;
            if !updated {
                return Err(AppError::conflict(
                    "Feedback was changed by another request; retry",
                ));
            }
        }

        feedback.updated_at = now;
        if !self.repo.replace_feedback(&feedback).await? {
            return Err(AppError::not_found("Feedback not found"));
        }

        metrics::record_feedback("edited");
        tracing::info!(feedback_id = %feedback.id, "Feedback edited");
        Ok(feedback)
    }

    /// Author or admin.
    pub async fn delete(&self, auth: &AuthContext, feedback_id: &str) -> Result<(), AppError> {
        let feedback = self
            .repo
            .get_feedback(feedback_id)
            .await?
            .ok_or_else(|| AppError::not_found("Feedback not found"))?;

        if !auth.is_admin() && feedback.customer_id != auth.user_id {
            return Err(AppError::forbidden("Not allowed to delete this feedback"));
        }

        if !self.repo.delete_feedback(&feedback.id).await? {
            return Err(AppError::not_found("Feedback not found"));
        }

        self.repo
            .detach_booking_feedback(&feedback.booking_id, &feedback.id)
            .await?;
        self.repo
            .remove_provider_feedback(&feedback.provider_feedback.provider_id, &feedback.id)
            .await?;
        self.repo
            .pull_service_feedback(
                &feedback.service_feedback.service_id,
                &feedback.id,
                feedback.service_feedback.rating,
            )
            .await?;

        metrics::record_feedback("deleted");
        tracing::info!(
            feedback_id = %feedback.id,
            booking_id = %feedback.booking_id,
            deleted_by = %auth.user_id,
            "Feedback deleted"
        );
        Ok(())
    }

    pub async fn list(
        &self,
        filter: FeedbackFilter,
        page: Page,
    ) -> Result<(Vec<Feedback>, u64), AppError> {
        self.repo.list_feedback(&filter, page).await
    }

    pub async fn provider_summary(&self, provider_id: &str) -> Result<RatingSummary, AppError> {
        let totals = self.repo.provider_rating(provider_id).await?;
        Ok(RatingSummary::new(totals.sum, totals.count))
    }

    pub async fn service_summary(&self, service_id: &str) -> Result<RatingSummary, AppError> {
        let service = self
            .repo
            .get_service(service_id)
            .await?
            .ok_or_else(|| AppError::not_found("Service not found"))?;
        Ok(RatingSummary::new(service.rating_sum, service.rating_count))
    }
}
