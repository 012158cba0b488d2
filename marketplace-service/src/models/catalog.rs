use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

/// A bookable catalog service (e.g. "AC servicing").
///
/// Ratings are kept as a running `(rating_sum, rating_count)` pair next to
/// the embedded feedback entries; the average is derived, never stored.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Service {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub category: String,
    /// Base charge in paise.
    pub price: i64,
    pub is_active: bool,
    #[serde(default)]
    pub feedback: Vec<ServiceFeedbackEntry>,
    #[serde(default)]
    pub rating_sum: i64,
    #[serde(default)]
    pub rating_count: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Service {
    pub fn average_rating(&self) -> f64 {
        average_rating(self.rating_sum, self.rating_count)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServiceFeedbackEntry {
    pub feedback_id: String,
    pub customer_id: String,
    pub rating: i32,
    #[serde(default)]
    pub comment: String,
    pub created_at: DateTime,
}

/// Mean rating rounded half-up to one decimal place; `0.0` with no ratings.
///
/// Computed in integer tenths so that e.g. a mean of exactly 4.25 always
/// rounds to 4.3.
pub fn average_rating(sum: i64, count: i64) -> f64 {
    if count <= 0 || sum <= 0 {
        return 0.0;
    }
    let tenths = (sum * 20 + count) / (count * 2);
    tenths as f64 / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mean_rounded(ratings: &[i64]) -> f64 {
        average_rating(ratings.iter().sum(), ratings.len() as i64)
    }

    #[test]
    fn empty_average_is_zero() {
        assert_eq!(average_rating(0, 0), 0.0);
    }

    #[test]
    fn rounds_to_one_decimal() {
        assert_eq!(mean_rounded(&[5, 4, 4]), 4.3);
        assert_eq!(mean_rounded(&[5, 4, 4, 4]), 4.3);
        assert_eq!(mean_rounded(&[1, 2]), 1.5);
        assert_eq!(mean_rounded(&[3]), 3.0);
        assert_eq!(mean_rounded(&[1, 1, 2]), 1.3);
        assert_eq!(mean_rounded(&[2, 2, 2, 1, 1, 1]), 1.5);
    }
}
