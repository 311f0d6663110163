//! Emergency booking, admissions and discharges.
//!
//! Free beds are never stored: they are `total_beds` minus the admissions
//! whose stay covers the instant asked about. Writers take the hospital row
//! lock first so two emergency bookings cannot both claim the last bed.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

use super::availability::booked_times;
use super::{authorized, CareService};
use crate::clock::Clock;
use crate::error::CareError;
use crate::guard;
use crate::model::{
    available_count, Admission, Appointment, AppointmentQuery, BedSummary, Hospital, Role,
};
use crate::store::{CareStore, Repository};

const DEFAULT_EMERGENCY_REASON: &str = "Emergency";

#[derive(Debug, Clone)]
pub struct EmergencyRequest {
    pub hospital: Uuid,
    /// Blank or absent becomes "Emergency".
    pub reason: Option<String>,
    pub expected_discharge: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct AdmissionRequest {
    pub patient: Uuid,
    pub doctor: Option<Uuid>,
    pub appointment: Option<Uuid>,
    pub expected_discharge: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HospitalDashboard {
    pub hospital: Hospital,
    pub beds: BedSummary,
    pub total_appointments: usize,
    /// Pending or Confirmed, dated today.
    pub today_active: usize,
    /// Pending or Confirmed, dated today or later.
    pub upcoming_active: usize,
    pub admitted: usize,
}

fn check_expected_discharge(
    expected: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), CareError> {
    match expected {
        Some(at) if at <= now => Err(CareError::validation(
            "expected_discharge",
            "must be in the future",
        )),
        _ => Ok(()),
    }
}

/// Lock the hospital row and fail unless a bed is free at `now`.
fn claim_bed(repo: &dyn Repository, hospital: Uuid, now: DateTime<Utc>) -> Result<Hospital, CareError> {
    let locked = repo
        .lock_hospital(hospital)?
        .ok_or(CareError::NotFound("hospital"))?;
    let occupied = repo.occupied_beds(hospital, now)?;
    if available_count(locked.total_beds, occupied) <= 0 {
        log::warn!("hospital {hospital} has no free bed ({occupied}/{})", locked.total_beds);
        return Err(CareError::NoBedsAvailable { hospital });
    }
    Ok(locked)
}

/// First approved, active doctor at `hospital` free at `date` `time`.
fn emergency_doctor(
    repo: &dyn Repository,
    hospital: Uuid,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<Option<Uuid>, CareError> {
    for assignment in repo.assignments_for_hospital(hospital)? {
        if !assignment.active {
            continue;
        }
        let Some(doctor) = repo.identity(assignment.doctor_id)? else {
            continue;
        };
        if !(doctor.active && doctor.approved) {
            continue;
        }
        if !booked_times(repo, doctor.id, date)?.contains(&time) {
            return Ok(Some(doctor.id));
        }
    }
    Ok(None)
}

impl<S: CareStore, C: Clock> CareService<S, C> {
    /// Book an emergency appointment together with a bed.
    ///
    /// Either both the appointment and the admission are created, or neither.
    pub fn emergency_book(
        &self,
        patient: Uuid,
        request: EmergencyRequest,
    ) -> Result<(Appointment, Admission), CareError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::operation_span("emergency_booking").entered();

        let now = self.clock.now();
        let local = self.clock.local_now();
        check_expected_discharge(request.expected_discharge, now)?;
        let reason = request
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_EMERGENCY_REASON)
            .to_string();

        let (appointment, admission) = self.store.atomically(|repo| {
            authorized(repo, patient, guard::PATIENT)?;
            let hospital = claim_bed(repo, request.hospital, now)?;

            let (date, time) = (local.date(), local.time());
            let doctor = emergency_doctor(repo, hospital.id, date, time)?.ok_or_else(|| {
                CareError::Conflict("no doctor available at this hospital".to_string())
            })?;
            let mut appointment =
                Appointment::pending(patient, doctor, Some(hospital.id), date, time, reason, now);
            appointment.emergency = true;
            repo.insert_appointment(&appointment)?;

            let mut admission = Admission::new(hospital.id, patient, now);
            admission.doctor_id = Some(appointment.doctor_id);
            admission.appointment_id = Some(appointment.id);
            admission.expected_discharge = request.expected_discharge;
            repo.insert_admission(&admission)?;
            Ok((appointment, admission))
        })?;

        #[cfg(feature = "metrics")]
        METRICS.record_emergency_admission();
        log::info!(
            "emergency admission {} at hospital {} for patient {patient}",
            admission.id,
            admission.hospital_id
        );
        Ok((appointment, admission))
    }

    /// Admit a patient directly, without a booking.
    pub fn admit(&self, hospital_admin: Uuid, request: AdmissionRequest) -> Result<Admission, CareError> {
        let now = self.clock.now();
        check_expected_discharge(request.expected_discharge, now)?;

        let admission = self.store.atomically(|repo| {
            authorized(repo, hospital_admin, guard::HOSPITAL_ADMIN)?;
            let managed = repo
                .hospital_by_admin(hospital_admin)?
                .ok_or(CareError::NotFound("hospital"))?;

            repo.identity(request.patient)?
                .filter(|i| i.role == Role::Patient)
                .ok_or(CareError::NotFound("patient"))?;
            if let Some(doctor) = request.doctor {
                let serves = repo
                    .assignment(doctor, managed.id)?
                    .is_some_and(|a| a.active);
                if !serves {
                    return Err(CareError::validation(
                        "doctor",
                        "is not affiliated with this hospital",
                    ));
                }
            }
            if let Some(appointment) = request.appointment {
                repo.appointment(appointment)?
                    .filter(|a| a.hospital_id == Some(managed.id))
                    .ok_or(CareError::NotFound("appointment"))?;
            }

            let hospital = claim_bed(repo, managed.id, now)?;
            let mut admission = Admission::new(hospital.id, request.patient, now);
            admission.doctor_id = request.doctor;
            admission.appointment_id = request.appointment;
            admission.expected_discharge = request.expected_discharge;
            admission.notes = request.notes.clone();
            repo.insert_admission(&admission)?;
            Ok(admission)
        })?;

        log::info!(
            "admitted patient {} to hospital {}",
            admission.patient_id,
            admission.hospital_id
        );
        Ok(admission)
    }

    /// Close an admission at `at`, which may not precede the admission itself.
    pub fn discharge(
        &self,
        hospital_admin: Uuid,
        admission: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Admission, CareError> {
        let discharged = self.store.atomically(|repo| {
            authorized(repo, hospital_admin, guard::HOSPITAL_ADMIN)?;
            let managed = repo
                .hospital_by_admin(hospital_admin)?
                .ok_or(CareError::NotFound("hospital"))?;
            let mut found = repo
                .admission(admission)?
                .filter(|a| a.hospital_id == managed.id)
                .ok_or(CareError::NotFound("admission"))?;
            if found.discharge_time.is_some() {
                return Err(CareError::Conflict("patient already discharged".to_string()));
            }
            if at < found.admission_time {
                return Err(CareError::validation(
                    "discharge_time",
                    "cannot be before the admission time",
                ));
            }
            found.discharge_time = Some(at);
            repo.update_admission(&found)?;
            Ok(found)
        })?;

        #[cfg(feature = "metrics")]
        METRICS.record_discharge();
        log::info!("discharged admission {}", discharged.id);
        Ok(discharged)
    }

    pub fn update_total_beds(&self, hospital_admin: Uuid, total: i32) -> Result<Hospital, CareError> {
        if total < 0 {
            return Err(CareError::validation("total_beds", "cannot be negative"));
        }
        self.store.atomically(|repo| {
            authorized(repo, hospital_admin, guard::HOSPITAL_ADMIN)?;
            let managed = repo
                .hospital_by_admin(hospital_admin)?
                .ok_or(CareError::NotFound("hospital"))?;
            let mut hospital = repo
                .lock_hospital(managed.id)?
                .ok_or(CareError::NotFound("hospital"))?;
            hospital.total_beds = total;
            repo.update_hospital(&hospital)?;
            log::info!("hospital {} now has {total} beds", hospital.id);
            Ok(hospital)
        })
    }

    pub fn bed_summary(&self, hospital: Uuid, at: DateTime<Utc>) -> Result<BedSummary, CareError> {
        let found = self
            .store
            .hospital(hospital)?
            .ok_or(CareError::NotFound("hospital"))?;
        let occupied = self.store.occupied_beds(hospital, at)?;
        Ok(BedSummary::new(found.total_beds, occupied))
    }

    /// Hospitals with at least one free bed at `at`, by name.
    pub fn hospitals_with_beds(&self, at: DateTime<Utc>) -> Result<Vec<(Hospital, BedSummary)>, CareError> {
        let mut open = Vec::new();
        for hospital in self.store.hospitals()? {
            let summary = BedSummary::new(hospital.total_beds, self.store.occupied_beds(hospital.id, at)?);
            if summary.available > 0 {
                open.push((hospital, summary));
            }
        }
        log::debug!("{} hospitals accept emergencies", open.len());
        Ok(open)
    }

    pub fn hospital_admissions(&self, hospital_admin: Uuid) -> Result<Vec<Admission>, CareError> {
        let hospital = self.managed_hospital(hospital_admin)?;
        let mut admissions = self.store.admissions_for_hospital(hospital.id)?;
        admissions.reverse();
        Ok(admissions)
    }

    pub fn hospital_dashboard(&self, hospital_admin: Uuid) -> Result<HospitalDashboard, CareError> {
        let hospital = self.managed_hospital(hospital_admin)?;
        let now = self.clock.now();
        let today = self.clock.today();
        let appointments = self
            .store
            .appointments(&AppointmentQuery::for_hospital(hospital.id))?;
        let admitted = self.store.occupied_beds(hospital.id, now)?;

        Ok(HospitalDashboard {
            beds: BedSummary::new(hospital.total_beds, admitted),
            total_appointments: appointments.len(),
            today_active: appointments
                .iter()
                .filter(|a| a.date == today && a.status.is_active())
                .count(),
            upcoming_active: appointments
                .iter()
                .filter(|a| a.date >= today && a.status.is_active())
                .count(),
            admitted: usize::try_from(admitted).unwrap_or_default(),
            hospital,
        })
    }
}
