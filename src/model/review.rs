use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HospitalReview {
    pub id: Uuid,
    pub hospital_id: Uuid,
    pub patient_id: Uuid,
    /// 1 to 5 inclusive.
    pub rating: i16,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatingSummary {
    pub count: usize,
    pub average: Option<f64>,
}

impl RatingSummary {
    pub fn of(reviews: &[HospitalReview]) -> Self {
        if reviews.is_empty() {
            return Self {
                count: 0,
                average: None,
            };
        }
        let sum: i64 = reviews.iter().map(|r| i64::from(r.rating)).sum();
        Self {
            count: reviews.len(),
            average: Some(sum as f64 / reviews.len() as f64),
        }
    }
}
