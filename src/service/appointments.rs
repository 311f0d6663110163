//! Booking and the appointment lifecycle.
//!
//! Doctors confirm, reject and complete their own appointments; patients
//! cancel their own; a hospital administrator may move any appointment at
//! their hospital, but only along the transition table. Cancelling an
//! emergency appointment discharges its open admission in the same
//! transaction.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

use super::availability::{booked_times, doctor_profile};
use super::{authorized, required, CareService};
use crate::clock::Clock;
use crate::error::CareError;
use crate::guard;
use crate::model::{Appointment, AppointmentQuery, AppointmentStatus, Identity, Role};
use crate::store::{CareStore, Repository};

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub doctor: Uuid,
    /// Defaults to the doctor's primary hospital.
    pub hospital: Option<Uuid>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Completed(Appointment),
    /// The appointment was already complete; nothing changed.
    AlreadyCompleted(Appointment),
}

/// Clinical fields a doctor may edit. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct NotesUpdate {
    pub notes: Option<String>,
    pub prescription: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoctorView {
    All,
    Today,
    /// Today or later, still Pending or Confirmed.
    Upcoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HospitalView {
    All,
    Today,
    Status(AppointmentStatus),
}

/// Hospitals `doctor` serves through active assignments, oldest first.
/// The first one is the doctor's primary hospital.
pub(super) fn serving_hospitals(repo: &dyn Repository, doctor: Uuid) -> Result<Vec<Uuid>, CareError> {
    Ok(repo
        .assignments_for_doctor(doctor)?
        .into_iter()
        .filter(|a| a.active)
        .map(|a| a.hospital_id)
        .collect())
}

/// Discharge the admission opened for an emergency appointment, if still open.
pub(super) fn close_emergency_admission(
    repo: &dyn Repository,
    appointment: &Appointment,
    now: DateTime<Utc>,
) -> Result<(), CareError> {
    if !appointment.emergency {
        return Ok(());
    }
    if let Some(mut admission) = repo.admission_for_appointment(appointment.id)? {
        if admission.discharge_time.is_none() {
            admission.discharge_time = Some(now.max(admission.admission_time));
            repo.update_admission(&admission)?;
            #[cfg(feature = "metrics")]
            METRICS.record_discharge();
            log::info!(
                "closed admission {} with cancelled appointment {}",
                admission.id,
                appointment.id
            );
        }
    }
    Ok(())
}

fn set_status(
    repo: &dyn Repository,
    appointment: &mut Appointment,
    status: AppointmentStatus,
    now: DateTime<Utc>,
) -> Result<(), CareError> {
    let from = appointment.status;
    appointment.status = status;
    appointment.updated_at = now;
    repo.update_appointment(appointment)?;
    #[cfg(feature = "metrics")]
    METRICS.record_transition(status.as_str());
    log::info!("appointment {} {} -> {}", appointment.id, from, status);
    Ok(())
}

/// Load an appointment that `owner` holds in `role`; anything else is NotFound.
fn owned_appointment(
    repo: &dyn Repository,
    owner: &Identity,
    appointment: Uuid,
) -> Result<Appointment, CareError> {
    let found = repo
        .appointment(appointment)?
        .ok_or(CareError::NotFound("appointment"))?;
    let holder = match owner.role {
        Role::Doctor => found.doctor_id,
        _ => found.patient_id,
    };
    if holder != owner.id {
        return Err(CareError::NotFound("appointment"));
    }
    Ok(found)
}

impl<S: CareStore, C: Clock> CareService<S, C> {
    pub fn book(&self, patient: Uuid, request: BookingRequest) -> Result<Appointment, CareError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::operation_span("book_appointment").entered();

        let reason = required("reason", &request.reason)?;
        let now = self.clock.now();
        let local = self.clock.local_now();
        if request.date < local.date() {
            return Err(CareError::validation(
                "appointment_date",
                "cannot book appointments in the past",
            ));
        }
        if request.date == local.date() && request.time <= local.time() {
            return Err(CareError::validation(
                "appointment_time",
                "must be later than the current time",
            ));
        }

        let result = self.store.atomically(|repo| {
            authorized(repo, patient, guard::PATIENT)?;

            let doctor = repo
                .identity(request.doctor)?
                .filter(|i| i.role == Role::Doctor)
                .ok_or(CareError::NotFound("doctor"))?;
            if !doctor.active || !doctor.approved {
                return Err(CareError::Conflict(
                    "doctor is not accepting appointments".to_string(),
                ));
            }
            let profile = doctor_profile(repo, doctor.id)?;
            if repo.leave_dates(doctor.id)?.contains(&request.date) {
                return Err(CareError::Conflict("doctor is on leave that day".to_string()));
            }
            if !profile.schedule.offers(request.time) {
                return Err(CareError::validation(
                    "appointment_time",
                    "is not a slot on the doctor's schedule",
                ));
            }

            let hospitals = serving_hospitals(repo, doctor.id)?;
            let hospital = match request.hospital {
                Some(h) if hospitals.contains(&h) => h,
                Some(_) => {
                    return Err(CareError::validation(
                        "hospital",
                        "doctor does not work at this hospital",
                    ))
                }
                None => *hospitals.first().ok_or_else(|| {
                    CareError::Conflict("doctor has no hospital affiliation".to_string())
                })?,
            };

            if booked_times(repo, doctor.id, request.date)?.contains(&request.time) {
                return Err(CareError::SlotTaken {
                    doctor: doctor.id,
                    date: request.date,
                    time: request.time,
                });
            }

            let appointment = Appointment::pending(
                patient,
                doctor.id,
                Some(hospital),
                request.date,
                request.time,
                reason,
                now,
            );
            repo.insert_appointment(&appointment)?;
            Ok(appointment)
        });

        match &result {
            Ok(appointment) => {
                #[cfg(feature = "metrics")]
                METRICS.record_booking();
                log::info!(
                    "booked {} with doctor {} on {} at {}",
                    appointment.id,
                    appointment.doctor_id,
                    appointment.date,
                    appointment.time.format("%H:%M")
                );
            }
            Err(err @ CareError::SlotTaken { .. }) => {
                #[cfg(feature = "metrics")]
                METRICS.record_booking_conflict();
                log::warn!("booking rejected: {err}");
            }
            Err(_) => {}
        }
        result
    }

    pub fn appointment(&self, id: Uuid) -> Result<Appointment, CareError> {
        self.store
            .appointment(id)?
            .ok_or(CareError::NotFound("appointment"))
    }

    pub fn doctor_approve(&self, doctor: Uuid, appointment: Uuid) -> Result<Appointment, CareError> {
        self.doctor_decide(doctor, appointment, AppointmentStatus::Confirmed)
    }

    pub fn doctor_reject(&self, doctor: Uuid, appointment: Uuid) -> Result<Appointment, CareError> {
        self.doctor_decide(doctor, appointment, AppointmentStatus::Cancelled)
    }

    /// Confirm or reject; only a Pending appointment can be decided.
    fn doctor_decide(
        &self,
        doctor: Uuid,
        appointment: Uuid,
        to: AppointmentStatus,
    ) -> Result<Appointment, CareError> {
        let now = self.clock.now();
        self.store.atomically(|repo| {
            let actor = authorized(repo, doctor, guard::DOCTOR)?;
            let mut found = owned_appointment(repo, &actor, appointment)?;
            if found.status != AppointmentStatus::Pending {
                return Err(CareError::InvalidTransition {
                    from: found.status,
                    to,
                });
            }
            set_status(repo, &mut found, to, now)?;
            Ok(found)
        })
    }

    /// Mark a Pending or Confirmed appointment complete once its time has come.
    pub fn doctor_complete(&self, doctor: Uuid, appointment: Uuid) -> Result<CompletionOutcome, CareError> {
        let now = self.clock.now();
        let local = self.clock.local_now();
        self.store.atomically(|repo| {
            let actor = authorized(repo, doctor, guard::DOCTOR)?;
            let mut found = owned_appointment(repo, &actor, appointment)?;
            match found.status {
                AppointmentStatus::Completed => return Ok(CompletionOutcome::AlreadyCompleted(found)),
                status if status.is_active() => {}
                status => {
                    return Err(CareError::InvalidTransition {
                        from: status,
                        to: AppointmentStatus::Completed,
                    })
                }
            }
            if found.scheduled_at() > local {
                return Err(CareError::Conflict(
                    "appointment has not taken place yet".to_string(),
                ));
            }
            set_status(repo, &mut found, AppointmentStatus::Completed, now)?;
            Ok(CompletionOutcome::Completed(found))
        })
    }

    pub fn doctor_update_notes(
        &self,
        doctor: Uuid,
        appointment: Uuid,
        update: NotesUpdate,
    ) -> Result<Appointment, CareError> {
        let now = self.clock.now();
        self.store.atomically(|repo| {
            let actor = authorized(repo, doctor, guard::DOCTOR)?;
            let mut found = owned_appointment(repo, &actor, appointment)?;
            if let Some(notes) = update.notes {
                found.notes = Some(notes);
            }
            if let Some(prescription) = update.prescription {
                found.prescription = Some(prescription);
            }
            found.updated_at = now;
            repo.update_appointment(&found)?;
            log::debug!("doctor {doctor} updated notes on {appointment}");
            Ok(found)
        })
    }

    pub fn patient_cancel(&self, patient: Uuid, appointment: Uuid) -> Result<Appointment, CareError> {
        let now = self.clock.now();
        self.store.atomically(|repo| {
            let actor = authorized(repo, patient, guard::PATIENT)?;
            let mut found = owned_appointment(repo, &actor, appointment)?;
            if !found.status.is_active() {
                return Err(CareError::InvalidTransition {
                    from: found.status,
                    to: AppointmentStatus::Cancelled,
                });
            }
            set_status(repo, &mut found, AppointmentStatus::Cancelled, now)?;
            close_emergency_admission(repo, &found, now)?;
            Ok(found)
        })
    }

    /// Move an appointment at the administrator's hospital along the transition table.
    pub fn hospital_override_status(
        &self,
        hospital_admin: Uuid,
        appointment: Uuid,
        to: AppointmentStatus,
    ) -> Result<Appointment, CareError> {
        let now = self.clock.now();
        self.store.atomically(|repo| {
            authorized(repo, hospital_admin, guard::HOSPITAL_ADMIN)?;
            let hospital = repo
                .hospital_by_admin(hospital_admin)?
                .ok_or(CareError::NotFound("hospital"))?;
            let mut found = repo
                .appointment(appointment)?
                .filter(|a| a.hospital_id == Some(hospital.id))
                .ok_or(CareError::NotFound("appointment"))?;
            if let Err(err) = found.status.ensure_transition(to) {
                log::warn!("hospital {} override refused: {err}", hospital.id);
                return Err(err);
            }
            set_status(repo, &mut found, to, now)?;
            if to == AppointmentStatus::Cancelled {
                close_emergency_admission(repo, &found, now)?;
            }
            Ok(found)
        })
    }

    /// Pending or Confirmed appointments dated today or later.
    pub fn patient_upcoming(&self, patient: Uuid) -> Result<Vec<Appointment>, CareError> {
        authorized(&self.store, patient, guard::PATIENT)?;
        self.store.appointments(
            &AppointmentQuery::for_patient(patient)
                .from(self.clock.today())
                .active(),
        )
    }

    /// Every appointment dated before today, newest first.
    pub fn patient_past(&self, patient: Uuid) -> Result<Vec<Appointment>, CareError> {
        authorized(&self.store, patient, guard::PATIENT)?;
        let mut past = self
            .store
            .appointments(&AppointmentQuery::for_patient(patient).before(self.clock.today()))?;
        past.reverse();
        Ok(past)
    }

    pub fn doctor_appointments(&self, doctor: Uuid, view: DoctorView) -> Result<Vec<Appointment>, CareError> {
        authorized(&self.store, doctor, guard::DOCTOR)?;
        let today = self.clock.today();
        let query = AppointmentQuery::for_doctor(doctor);
        let query = match view {
            DoctorView::All => query,
            DoctorView::Today => query.on(today),
            DoctorView::Upcoming => query.from(today).active(),
        };
        self.store.appointments(&query)
    }

    /// Appointments at the administrator's hospital, newest first.
    pub fn hospital_appointments(
        &self,
        hospital_admin: Uuid,
        view: HospitalView,
    ) -> Result<Vec<Appointment>, CareError> {
        let hospital = self.managed_hospital(hospital_admin)?;
        let query = AppointmentQuery::for_hospital(hospital.id);
        let query = match view {
            HospitalView::All => query,
            HospitalView::Today => query.on(self.clock.today()),
            HospitalView::Status(status) => query.with_statuses(&[status]),
        };
        let mut appointments = self.store.appointments(&query)?;
        appointments.reverse();
        Ok(appointments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::service::fixtures::*;
    use chrono::Duration;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    struct World {
        svc: TestService,
        manager: Uuid,
        hospital: Uuid,
        doctor: Uuid,
        patient: Uuid,
    }

    fn world() -> World {
        let svc = service();
        let admin = admin(&svc);
        let (manager, hospital) = hospital(&svc, admin, "North", 5);
        let doctor = doctor(&svc, admin, manager, hospital.id, "doc@example.com");
        let patient = patient(&svc, "pat@example.com");
        World {
            svc,
            manager,
            hospital: hospital.id,
            doctor,
            patient,
        }
    }

    fn request(w: &World, date: NaiveDate, time: NaiveTime) -> BookingRequest {
        BookingRequest {
            doctor: w.doctor,
            hospital: None,
            date,
            time,
            reason: "checkup".to_string(),
        }
    }

    #[test]
    fn test_booking_uses_primary_hospital_and_starts_pending() {
        let w = world();
        let booked = w.svc.book(w.patient, request(&w, day(3), t(10, 0))).unwrap();
        assert_eq!(booked.status, AppointmentStatus::Pending);
        assert_eq!(booked.hospital_id, Some(w.hospital));
    }

    #[test]
    fn test_booking_validation() {
        let w = world();
        let mut blank = request(&w, day(3), t(10, 0));
        blank.reason = "  ".to_string();
        assert!(matches!(
            w.svc.book(w.patient, blank),
            Err(CareError::Validation { field: "reason", .. })
        ));
        assert!(matches!(
            w.svc.book(w.patient, request(&w, day(1), t(10, 0))),
            Err(CareError::Validation { field: "appointment_date", .. })
        ));
        assert!(matches!(
            w.svc.book(w.patient, request(&w, day(2), t(8, 0))),
            Err(CareError::Validation { field: "appointment_time", .. })
        ));
        assert!(matches!(
            w.svc.book(w.patient, request(&w, day(3), t(10, 10))),
            Err(CareError::Validation { field: "appointment_time", .. })
        ));
        let mut elsewhere = request(&w, day(3), t(10, 0));
        elsewhere.hospital = Some(Uuid::new_v4());
        assert!(matches!(
            w.svc.book(w.patient, elsewhere),
            Err(CareError::Validation { field: "hospital", .. })
        ));
    }

    #[test]
    fn test_double_booking_is_rejected() {
        let w = world();
        w.svc.book(w.patient, request(&w, day(3), t(10, 0))).unwrap();
        let other = patient(&w.svc, "other@example.com");
        let err = w.svc.book(other, request(&w, day(3), t(10, 0))).unwrap_err();
        assert!(matches!(err, CareError::SlotTaken { .. }));
        assert_eq!(err.to_string(), "time slot 2026-03-03 at 10:00 is already booked");
    }

    #[test]
    fn test_cancelled_slot_can_be_rebooked() {
        let w = world();
        let first = w.svc.book(w.patient, request(&w, day(3), t(10, 0))).unwrap();
        w.svc.patient_cancel(w.patient, first.id).unwrap();
        let other = patient(&w.svc, "other@example.com");
        assert!(w.svc.book(other, request(&w, day(3), t(10, 0))).is_ok());
    }

    #[test]
    fn test_doctor_decides_only_own_pending_appointments() {
        let w = world();
        let booked = w.svc.book(w.patient, request(&w, day(3), t(10, 0))).unwrap();

        let admin = w.svc.store().identities_by_role(Role::Admin).unwrap()[0].id;
        let stranger = doctor(&w.svc, admin, w.manager, w.hospital, "stranger@example.com");
        assert!(matches!(
            w.svc.doctor_approve(stranger, booked.id),
            Err(CareError::NotFound("appointment"))
        ));

        let confirmed = w.svc.doctor_approve(w.doctor, booked.id).unwrap();
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
        let err = w.svc.doctor_reject(w.doctor, booked.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_complete_waits_for_the_appointment_time() {
        let w = world();
        let booked = w.svc.book(w.patient, request(&w, day(3), t(10, 0))).unwrap();
        assert!(matches!(
            w.svc.doctor_complete(w.doctor, booked.id),
            Err(CareError::Conflict(_))
        ));

        w.svc.clock().advance(Duration::days(1) + Duration::hours(3));
        assert!(matches!(
            w.svc.doctor_complete(w.doctor, booked.id).unwrap(),
            CompletionOutcome::Completed(_)
        ));
        assert!(matches!(
            w.svc.doctor_complete(w.doctor, booked.id).unwrap(),
            CompletionOutcome::AlreadyCompleted(_)
        ));
    }

    #[test]
    fn test_terminal_statuses_admit_no_transition() {
        let w = world();
        let booked = w.svc.book(w.patient, request(&w, day(3), t(10, 0))).unwrap();
        w.svc.patient_cancel(w.patient, booked.id).unwrap();

        for to in AppointmentStatus::ALL.iter().copied() {
            let err = w
                .svc
                .hospital_override_status(w.manager, booked.id, to)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Conflict);
        }
        assert!(w.svc.patient_cancel(w.patient, booked.id).is_err());
        assert!(w.svc.doctor_approve(w.doctor, booked.id).is_err());
        assert_eq!(
            w.svc.appointment(booked.id).unwrap().status,
            AppointmentStatus::Cancelled
        );
    }

    #[test]
    fn test_hospital_override_follows_the_table() {
        let w = world();
        let booked = w.svc.book(w.patient, request(&w, day(3), t(10, 0))).unwrap();
        let err = w
            .svc
            .hospital_override_status(w.manager, booked.id, AppointmentStatus::Completed)
            .unwrap_err();
        assert!(matches!(err, CareError::InvalidTransition { .. }));

        let confirmed = w
            .svc
            .hospital_override_status(w.manager, booked.id, AppointmentStatus::Confirmed)
            .unwrap();
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
    }

    #[test]
    fn test_notes_keep_absent_fields() {
        let w = world();
        let booked = w.svc.book(w.patient, request(&w, day(3), t(10, 0))).unwrap();
        w.svc
            .doctor_update_notes(
                w.doctor,
                booked.id,
                NotesUpdate {
                    notes: Some("bring results".to_string()),
                    prescription: Some("rest".to_string()),
                },
            )
            .unwrap();
        let updated = w
            .svc
            .doctor_update_notes(
                w.doctor,
                booked.id,
                NotesUpdate {
                    notes: None,
                    prescription: Some("more rest".to_string()),
                },
            )
            .unwrap();
        assert_eq!(updated.notes.as_deref(), Some("bring results"));
        assert_eq!(updated.prescription.as_deref(), Some("more rest"));
    }

    #[test]
    fn test_listings() {
        let w = world();
        let booked = w.svc.book(w.patient, request(&w, day(3), t(10, 0))).unwrap();
        w.svc.book(w.patient, request(&w, day(4), t(11, 0))).unwrap();

        assert_eq!(w.svc.patient_upcoming(w.patient).unwrap().len(), 2);
        assert!(w.svc.patient_past(w.patient).unwrap().is_empty());
        assert_eq!(
            w.svc
                .doctor_appointments(w.doctor, DoctorView::Upcoming)
                .unwrap()
                .len(),
            2
        );

        w.svc.clock().advance(Duration::days(1));
        assert_eq!(
            w.svc
                .doctor_appointments(w.doctor, DoctorView::Today)
                .unwrap()
                .first()
                .map(|a| a.id),
            Some(booked.id)
        );
        assert_eq!(
            w.svc
                .hospital_appointments(w.manager, HospitalView::Status(AppointmentStatus::Pending))
                .unwrap()
                .len(),
            2
        );

        w.svc.clock().advance(Duration::days(1));
        assert_eq!(w.svc.patient_past(w.patient).unwrap().len(), 1);
        assert_eq!(w.svc.patient_upcoming(w.patient).unwrap().len(), 1);
    }
}
