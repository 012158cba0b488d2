use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use service_core::middleware::auth::Role;

/// Marketplace account. Customers carry a wallet balance (paise); providers
/// additionally keep the ids of feedback they have received.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub wallet_balance: i64,
    #[serde(default)]
    pub feedbacks: Vec<String>,
    pub created_at: DateTime,
}
