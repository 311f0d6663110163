use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::text_enum;
use crate::error::CareError;

text_enum! {
    pub enum Specialization as "specialization" {
        Cardiology => "CARDIOLOGY",
        Dermatology => "DERMATOLOGY",
        Neurology => "NEUROLOGY",
        Orthopedics => "ORTHOPEDICS",
        Pediatrics => "PEDIATRICS",
        Psychiatry => "PSYCHIATRY",
        Surgery => "SURGERY",
        General => "GENERAL",
        Oncology => "ONCOLOGY",
        Gynecology => "GYNECOLOGY",
    }
}

/// A doctor's working window `[from, to)` cut into slots of `slot_minutes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScheduleFields")]
pub struct Schedule {
    from: NaiveTime,
    to: NaiveTime,
    slot_minutes: u32,
}

/// Unchecked wire form; deserialization goes through [`Schedule::new`].
#[derive(Deserialize)]
struct ScheduleFields {
    from: NaiveTime,
    to: NaiveTime,
    slot_minutes: u32,
}

impl TryFrom<ScheduleFields> for Schedule {
    type Error = CareError;

    fn try_from(fields: ScheduleFields) -> Result<Self, CareError> {
        Schedule::new(fields.from, fields.to, fields.slot_minutes)
    }
}

impl Schedule {
    pub fn new(from: NaiveTime, to: NaiveTime, slot_minutes: u32) -> Result<Self, CareError> {
        if slot_minutes == 0 {
            return Err(CareError::validation(
                "slot_duration",
                "must be at least one minute",
            ));
        }
        if from >= to {
            return Err(CareError::validation(
                "available_to",
                format!("end {to} must be after start {from}"),
            ));
        }
        Ok(Self {
            from,
            to,
            slot_minutes,
        })
    }

    pub fn from(&self) -> NaiveTime {
        self.from
    }

    pub fn to(&self) -> NaiveTime {
        self.to
    }

    pub fn slot_minutes(&self) -> u32 {
        self.slot_minutes
    }

    /// True when `time` is a slot start this schedule generates.
    ///
    /// Slot starts are whole minutes, so any sub-second part disqualifies.
    pub fn offers(&self, time: NaiveTime) -> bool {
        if time < self.from || time >= self.to || time.nanosecond() != 0 {
            return false;
        }
        let offset = (time - self.from).num_seconds();
        offset % (i64::from(self.slot_minutes) * 60) == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorProfile {
    /// Same id as the doctor's identity.
    pub id: Uuid,
    pub specialization: Specialization,
    pub qualification: String,
    pub license_number: String,
    pub verification_document: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub photo_ref: Option<String>,
    pub schedule: Schedule,
    pub created_at: DateTime<Utc>,
}

/// Professional details supplied at doctor registration.
#[derive(Debug, Clone)]
pub struct NewDoctor {
    pub specialization: Specialization,
    pub qualification: String,
    pub license_number: String,
    pub verification_document: Option<String>,
}

impl DoctorProfile {
    pub fn new(id: Uuid, details: NewDoctor, schedule: Schedule, now: DateTime<Utc>) -> Self {
        Self {
            id,
            specialization: details.specialization,
            qualification: details.qualification.trim().to_string(),
            license_number: details.license_number.trim().to_string(),
            verification_document: details.verification_document,
            phone: None,
            bio: None,
            photo_ref: None,
            schedule,
            created_at: now,
        }
    }
}
