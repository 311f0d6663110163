use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::text_enum;
use crate::error::CareError;

text_enum! {
    pub enum AppointmentStatus as "appointment status" {
        Pending => "PENDING",
        Confirmed => "CONFIRMED",
        Completed => "COMPLETED",
        Cancelled => "CANCELLED",
        Rescheduled => "RESCHEDULED",
    }
}

impl AppointmentStatus {
    /// Statuses that hold a slot on the doctor's calendar.
    pub const ACTIVE: &'static [AppointmentStatus] =
        &[AppointmentStatus::Pending, AppointmentStatus::Confirmed];

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    pub fn allowed_targets(self) -> &'static [AppointmentStatus] {
        use AppointmentStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Completed, Cancelled],
            Rescheduled => &[Confirmed, Cancelled],
            Completed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        self.allowed_targets().contains(&next)
    }

    /// Checks `self -> next` against the transition table.
    pub fn ensure_transition(self, next: AppointmentStatus) -> Result<(), CareError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CareError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub hospital_id: Option<Uuid>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: AppointmentStatus,
    pub reason: String,
    pub notes: Option<String>,
    pub prescription: Option<String>,
    pub emergency: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// A new Pending appointment.
    pub fn pending(
        patient_id: Uuid,
        doctor_id: Uuid,
        hospital_id: Option<Uuid>,
        date: NaiveDate,
        time: NaiveTime,
        reason: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            hospital_id,
            date,
            time,
            status: AppointmentStatus::Pending,
            reason,
            notes: None,
            prescription: None,
            emergency: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn scheduled_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    /// True when this row and `other` claim the same doctor slot.
    pub fn collides_with(&self, other: &Appointment) -> bool {
        self.id != other.id
            && self.status.is_active()
            && other.status.is_active()
            && self.doctor_id == other.doctor_id
            && self.date == other.date
            && self.time == other.time
    }
}

/// Filter for appointment listings. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppointmentQuery {
    pub doctor: Option<Uuid>,
    pub patient: Option<Uuid>,
    pub hospital: Option<Uuid>,
    pub on: Option<NaiveDate>,
    /// Inclusive lower bound on the date.
    pub from: Option<NaiveDate>,
    /// Exclusive upper bound on the date.
    pub before: Option<NaiveDate>,
    pub statuses: Option<Vec<AppointmentStatus>>,
}

impl AppointmentQuery {
    pub fn for_doctor(doctor: Uuid) -> Self {
        Self {
            doctor: Some(doctor),
            ..Self::default()
        }
    }

    pub fn for_patient(patient: Uuid) -> Self {
        Self {
            patient: Some(patient),
            ..Self::default()
        }
    }

    pub fn for_hospital(hospital: Uuid) -> Self {
        Self {
            hospital: Some(hospital),
            ..Self::default()
        }
    }

    pub fn at_hospital(mut self, hospital: Uuid) -> Self {
        self.hospital = Some(hospital);
        self
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.on = Some(date);
        self
    }

    pub fn from(mut self, date: NaiveDate) -> Self {
        self.from = Some(date);
        self
    }

    pub fn before(mut self, date: NaiveDate) -> Self {
        self.before = Some(date);
        self
    }

    pub fn with_statuses(mut self, statuses: &[AppointmentStatus]) -> Self {
        self.statuses = Some(statuses.to_vec());
        self
    }

    pub fn active(self) -> Self {
        self.with_statuses(AppointmentStatus::ACTIVE)
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.doctor.map_or(true, |d| appointment.doctor_id == d)
            && self.patient.map_or(true, |p| appointment.patient_id == p)
            && self.hospital.map_or(true, |h| appointment.hospital_id == Some(h))
            && self.on.map_or(true, |d| appointment.date == d)
            && self.from.map_or(true, |d| appointment.date >= d)
            && self.before.map_or(true, |d| appointment.date < d)
            && self
                .statuses
                .as_ref()
                .map_or(true, |s| s.contains(&appointment.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AppointmentStatus::*;

    #[test]
    fn test_terminal_states_admit_no_transition() {
        for from in [Completed, Cancelled] {
            assert!(from.is_terminal());
            for to in AppointmentStatus::ALL {
                let err = from.ensure_transition(*to).unwrap_err();
                assert!(matches!(err, CareError::InvalidTransition { .. }));
            }
        }
    }

    #[test]
    fn test_transition_table() {
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Rescheduled.can_transition_to(Confirmed));
        assert!(!Rescheduled.can_transition_to(Completed));
        assert!(!Confirmed.can_transition_to(Pending));
    }

    #[test]
    fn test_query_matches() {
        let now = Utc::now();
        let day = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        let hospital = Uuid::new_v4();
        let appt = Appointment::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Some(hospital),
            day,
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            "Checkup".into(),
            now,
        );

        assert!(AppointmentQuery::for_doctor(appt.doctor_id).on(day).active().matches(&appt));
        assert!(AppointmentQuery::for_hospital(hospital).from(day).matches(&appt));
        assert!(!AppointmentQuery::for_patient(appt.patient_id).before(day).matches(&appt));
        assert!(!AppointmentQuery::default()
            .with_statuses(&[Completed])
            .matches(&appt));
    }

    #[test]
    fn test_collision_ignores_inactive_rows() {
        let now = Utc::now();
        let day = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        let ten = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        let doctor = Uuid::new_v4();
        let a = Appointment::pending(Uuid::new_v4(), doctor, None, day, ten, "a".into(), now);
        let mut b = Appointment::pending(Uuid::new_v4(), doctor, Some(Uuid::new_v4()), day, ten, "b".into(), now);
        assert!(a.collides_with(&b));
        b.status = Cancelled;
        assert!(!a.collides_with(&b));
    }
}
