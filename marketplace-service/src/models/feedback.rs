use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

/// A customer's review of a completed booking: one rating for the provider
/// and one for the service. At most one per booking.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Feedback {
    #[serde(rename = "_id")]
    pub id: String,
    pub booking_id: String,
    pub customer_id: String,
    pub provider_feedback: ProviderFeedback,
    pub service_feedback: ServiceFeedback,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderFeedback {
    pub provider_id: String,
    pub rating: i32,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub is_edited: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceFeedback {
    pub service_id: String,
    pub rating: i32,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub is_edited: bool,
}
