use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RequestStatus;

/// A doctor's request to work at a hospital. One row per (doctor, hospital).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliationRequest {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub hospital_id: Uuid,
    /// Proposed monthly compensation.
    pub compensation: Decimal,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AffiliationRequest {
    pub fn new(doctor_id: Uuid, hospital_id: Uuid, compensation: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            hospital_id,
            compensation,
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An approved working relationship. One row per (doctor, hospital);
/// removal deactivates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub hospital_id: Uuid,
    pub compensation: Decimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Assignment {
    pub fn new(doctor_id: Uuid, hospital_id: Uuid, compensation: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            hospital_id,
            compensation,
            active: true,
            created_at: now,
        }
    }
}
