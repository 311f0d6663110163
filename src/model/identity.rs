use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::text_enum;

text_enum! {
    pub enum Role as "role" {
        Admin => "ADMIN",
        Doctor => "DOCTOR",
        Patient => "PATIENT",
        HospitalAdmin => "HOSPITAL_ADMIN",
    }
}

impl Role {
    /// Doctors and hospital admins must be approved before they can act.
    pub fn requires_approval(self) -> bool {
        matches!(self, Role::Doctor | Role::HospitalAdmin)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub role: Role,
    pub email: String,
    pub display_name: String,
    /// False once an admin blocks the account.
    pub active: bool,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(role: Role, email: &str, display_name: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            email: email.trim().to_lowercase(),
            display_name: display_name.trim().to_string(),
            active: true,
            approved: !role.requires_approval(),
            created_at: now,
        }
    }

    pub fn is_pending_approval(&self) -> bool {
        self.role.requires_approval() && !self.approved
    }

    /// Whether the account may open its role dashboard.
    pub fn can_access_dashboard(&self) -> bool {
        match self.role {
            Role::Admin | Role::Patient => true,
            Role::Doctor | Role::HospitalAdmin => self.approved,
        }
    }
}
