//! Domain operations over a [`CareStore`].
//!
//! Every operation takes the acting identity's id, loads it inside the same
//! transaction as the work it guards, and runs the guard list for its role
//! before touching anything else. Multi-row writes happen inside one
//! [`CareStore::atomically`] call.

mod affiliation;
mod appointments;
mod availability;
mod beds;
mod identity;
mod profile;
mod reviews;

pub use affiliation::AffiliationOutcome;
pub use appointments::{BookingRequest, CompletionOutcome, DoctorView, HospitalView, NotesUpdate};
pub use beds::{AdmissionRequest, EmergencyRequest, HospitalDashboard};
pub use identity::Registration;

use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::SchedulingConfig;
use crate::error::CareError;
use crate::guard::{authorize, Check};
use crate::model::{Identity, Schedule};
use crate::store::{CareStore, Repository};

pub struct CareService<S, C = SystemClock> {
    store: S,
    clock: C,
    scheduling: SchedulingConfig,
}

impl<S: CareStore, C: Clock> CareService<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            scheduling: SchedulingConfig::default(),
        }
    }

    pub fn with_scheduling(mut self, scheduling: SchedulingConfig) -> Self {
        self.scheduling = scheduling;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn scheduling(&self) -> &SchedulingConfig {
        &self.scheduling
    }

    fn default_schedule(&self) -> Result<Schedule, CareError> {
        Schedule::new(
            self.scheduling.default_work_start,
            self.scheduling.default_work_end,
            self.scheduling.default_slot_minutes,
        )
    }
}

/// Load `actor` and run `checks` against it.
///
/// An unknown actor is denied rather than reported missing.
fn authorized(repo: &dyn Repository, actor: Uuid, checks: &[Check]) -> Result<Identity, CareError> {
    let identity = repo
        .identity(actor)?
        .ok_or_else(|| CareError::PermissionDenied("unknown account".to_string()))?;
    authorize(&identity, checks)?;
    Ok(identity)
}

/// Trimmed `value`, or a validation error on `field` when it is blank.
fn required(field: &'static str, value: &str) -> Result<String, CareError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(CareError::validation(field, "is required"))
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{Duration, NaiveDate};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{CareService, Registration};
    use crate::clock::FixedClock;
    use crate::model::{Hospital, NewDoctor, NewHospital, Specialization};
    use crate::store::MemoryStore;

    pub type TestService = CareService<MemoryStore, FixedClock>;

    pub fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    /// Service whose clock reads 2026-03-02 08:00 UTC.
    pub fn service() -> TestService {
        CareService::new(MemoryStore::new(), FixedClock::at(day(2), 8, 0))
    }

    /// One second forward, so that records created by consecutive fixtures
    /// have distinct, ordered timestamps.
    pub fn tick(svc: &TestService) {
        svc.clock().advance(Duration::seconds(1));
    }

    pub fn admin(svc: &TestService) -> Uuid {
        svc.register("admin@example.com", "Admin", Registration::Admin)
            .unwrap()
            .id
    }

    pub fn patient(svc: &TestService, email: &str) -> Uuid {
        let id = svc
            .register(email, "Pat Patient", Registration::Patient)
            .unwrap()
            .id;
        tick(svc);
        id
    }

    /// Approved hospital admin and their hospital.
    pub fn hospital(svc: &TestService, admin: Uuid, name: &str, beds: i32) -> (Uuid, Hospital) {
        let email = format!("{}@hospital.example.com", name.to_lowercase().replace(' ', "."));
        let manager = svc
            .register(
                &email,
                &format!("{name} Admin"),
                Registration::HospitalAdmin(NewHospital {
                    name: name.to_string(),
                    address: "1 Main Street".to_string(),
                    phone: None,
                    email: None,
                    total_beds: beds,
                }),
            )
            .unwrap();
        svc.approve_identity(admin, manager.id).unwrap();
        let hospital = svc.managed_hospital(manager.id).unwrap();
        tick(svc);
        (manager.id, hospital)
    }

    /// Approved doctor affiliated with `hospital`.
    pub fn doctor(svc: &TestService, admin: Uuid, hospital_admin: Uuid, hospital: Uuid, email: &str) -> Uuid {
        let doctor = svc
            .register(
                email,
                "Dr Who",
                Registration::Doctor(NewDoctor {
                    specialization: Specialization::General,
                    qualification: "MBBS".to_string(),
                    license_number: "LIC-1".to_string(),
                    verification_document: None,
                }),
            )
            .unwrap();
        svc.approve_identity(admin, doctor.id).unwrap();
        svc.request_affiliation(doctor.id, hospital, Decimal::new(1000, 0))
            .unwrap();
        let request = svc
            .affiliation_requests(hospital_admin, None)
            .unwrap()
            .into_iter()
            .find(|r| r.doctor_id == doctor.id)
            .unwrap();
        svc.approve_affiliation(hospital_admin, request.id).unwrap();
        tick(svc);
        doctor.id
    }
}
