//! Queued edits to the sensitive part of a doctor profile.
//!
//! Credential fields only change after an admin approves a request. Contact
//! details are applied directly through [`ContactUpdate`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{text_enum, DoctorProfile, RequestStatus, Specialization};
use crate::error::CareError;

text_enum! {
    pub enum ProfileField as "profile field" {
        Specialization => "specialization",
        Qualification => "qualification",
        LicenseNumber => "license_number",
        VerificationDocument => "verification_document",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub field: ProfileField,
    pub old_value: Option<String>,
    pub new_value: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
}

impl ChangeRequest {
    pub fn new(
        doctor_id: Uuid,
        field: ProfileField,
        old_value: Option<String>,
        new_value: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            field,
            old_value,
            new_value,
            status: RequestStatus::Pending,
            created_at: now,
            reviewed_at: None,
            reviewed_by: None,
        }
    }
}

/// Proposed credential edits. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub specialization: Option<Specialization>,
    pub qualification: Option<String>,
    pub license_number: Option<String>,
    pub verification_document: Option<String>,
}

impl ProfileChanges {
    pub(crate) fn proposed(&self) -> Vec<(ProfileField, String)> {
        let mut out = Vec::new();
        if let Some(s) = self.specialization {
            out.push((ProfileField::Specialization, s.as_str().to_string()));
        }
        if let Some(q) = &self.qualification {
            out.push((ProfileField::Qualification, q.trim().to_string()));
        }
        if let Some(l) = &self.license_number {
            out.push((ProfileField::LicenseNumber, l.trim().to_string()));
        }
        if let Some(d) = &self.verification_document {
            out.push((ProfileField::VerificationDocument, d.trim().to_string()));
        }
        out
    }
}

/// Non-sensitive profile edits, applied without review.
#[derive(Debug, Clone, Default)]
pub struct ContactUpdate {
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub photo_ref: Option<String>,
}

impl DoctorProfile {
    pub fn field_value(&self, field: ProfileField) -> Option<String> {
        match field {
            ProfileField::Specialization => Some(self.specialization.as_str().to_string()),
            ProfileField::Qualification => Some(self.qualification.clone()),
            ProfileField::LicenseNumber => Some(self.license_number.clone()),
            ProfileField::VerificationDocument => self.verification_document.clone(),
        }
    }

    pub fn apply_field(&mut self, field: ProfileField, value: &str) -> Result<(), CareError> {
        match field {
            ProfileField::Specialization => {
                self.specialization = value
                    .parse()
                    .map_err(|e: super::UnknownVariant| CareError::validation("specialization", e.to_string()))?;
            }
            ProfileField::Qualification => self.qualification = value.to_string(),
            ProfileField::LicenseNumber => self.license_number = value.to_string(),
            ProfileField::VerificationDocument => {
                self.verification_document = Some(value.to_string())
            }
        }
        Ok(())
    }

    pub fn apply_contact(&mut self, update: ContactUpdate) {
        if let Some(phone) = update.phone {
            self.phone = Some(phone);
        }
        if let Some(bio) = update.bio {
            self.bio = Some(bio);
        }
        if let Some(photo) = update.photo_ref {
            self.photo_ref = Some(photo);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewDoctor, Schedule};
    use chrono::NaiveTime;

    fn profile() -> DoctorProfile {
        let schedule = Schedule::new(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            30,
        )
        .unwrap();
        DoctorProfile::new(
            Uuid::new_v4(),
            NewDoctor {
                specialization: Specialization::General,
                qualification: "MBBS".into(),
                license_number: "LIC-1".into(),
                verification_document: None,
            },
            schedule,
            Utc::now(),
        )
    }

    #[test]
    fn test_apply_field_parses_specialization() {
        let mut p = profile();
        p.apply_field(ProfileField::Specialization, "CARDIOLOGY").unwrap();
        assert_eq!(p.specialization, Specialization::Cardiology);

        let err = p.apply_field(ProfileField::Specialization, "ASTROLOGY").unwrap_err();
        assert!(err.to_string().contains("unknown specialization"));
    }

    #[test]
    fn test_proposed_lists_only_supplied_fields() {
        let changes = ProfileChanges {
            license_number: Some(" LIC-2 ".into()),
            ..ProfileChanges::default()
        };
        assert_eq!(
            changes.proposed(),
            vec![(ProfileField::LicenseNumber, "LIC-2".to_string())]
        );
    }

    #[test]
    fn test_contact_update_keeps_absent_fields() {
        let mut p = profile();
        p.bio = Some("old".into());
        p.apply_contact(ContactUpdate {
            phone: Some("555-0100".into()),
            ..ContactUpdate::default()
        });
        assert_eq!(p.phone.as_deref(), Some("555-0100"));
        assert_eq!(p.bio.as_deref(), Some("old"));
    }
}
