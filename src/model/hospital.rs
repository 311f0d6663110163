use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hospital {
    pub id: Uuid,
    /// The hospital-admin identity that manages this hospital.
    pub admin_id: Uuid,
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub total_beds: i32,
    pub created_at: DateTime<Utc>,
}

/// Details supplied when a hospital admin registers.
#[derive(Debug, Clone, Default)]
pub struct NewHospital {
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub total_beds: i32,
}

impl Hospital {
    pub fn new(admin_id: Uuid, details: NewHospital, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            admin_id,
            name: details.name.trim().to_string(),
            address: details.address.trim().to_string(),
            phone: details.phone,
            email: details.email,
            total_beds: details.total_beds,
            created_at: now,
        }
    }
}
