//! In-process store.
//!
//! Used by the test suites and by embedders that do not need durability.
//! Transactions are serialized: [`MemoryStore::atomically`] runs the closure
//! against a private copy of the state and swaps it in only on success.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::{CareStore, Repository, StoreResult};
use crate::error::CareError;
use crate::model::{
    occupied_count, Admission, AffiliationRequest, Appointment, AppointmentQuery, Assignment,
    ChangeRequest, DoctorProfile, Hospital, HospitalReview, Identity, RequestStatus, Role,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    identities: HashMap<Uuid, Identity>,
    hospitals: HashMap<Uuid, Hospital>,
    doctors: HashMap<Uuid, DoctorProfile>,
    leave: BTreeSet<(Uuid, NaiveDate)>,
    affiliation_requests: HashMap<Uuid, AffiliationRequest>,
    assignments: HashMap<Uuid, Assignment>,
    appointments: HashMap<Uuid, Appointment>,
    admissions: HashMap<Uuid, Admission>,
    change_requests: HashMap<Uuid, ChangeRequest>,
    reviews: HashMap<Uuid, HospitalReview>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    writer: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sorted<T: Clone, K: Ord>(
        items: impl Iterator<Item = T>,
        key: impl Fn(&T) -> K,
    ) -> Vec<T> {
        let mut out: Vec<T> = items.collect();
        out.sort_by_key(|item| key(item));
        out
    }
}

fn replace<T>(map: &mut HashMap<Uuid, T>, id: Uuid, value: T, entity: &'static str) -> StoreResult<()> {
    match map.get_mut(&id) {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(CareError::NotFound(entity)),
    }
}

fn ensure_slot_free(state: &MemoryState, appointment: &Appointment) -> StoreResult<()> {
    if state
        .appointments
        .values()
        .any(|existing| existing.collides_with(appointment))
    {
        return Err(CareError::SlotTaken {
            doctor: appointment.doctor_id,
            date: appointment.date,
            time: appointment.time,
        });
    }
    Ok(())
}

impl Repository for MemoryStore {
    fn insert_identity(&self, identity: &Identity) -> StoreResult<()> {
        let mut state = self.state();
        if state.identities.values().any(|i| i.email == identity.email) {
            return Err(CareError::Conflict("email already registered".to_string()));
        }
        state.identities.insert(identity.id, identity.clone());
        Ok(())
    }

    fn identity(&self, id: Uuid) -> StoreResult<Option<Identity>> {
        Ok(self.state().identities.get(&id).cloned())
    }

    fn identity_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        Ok(self
            .state()
            .identities
            .values()
            .find(|i| i.email == email)
            .cloned())
    }

    fn identities_by_role(&self, role: Role) -> StoreResult<Vec<Identity>> {
        let state = self.state();
        Ok(Self::sorted(
            state.identities.values().filter(|i| i.role == role).cloned(),
            |i| i.created_at,
        ))
    }

    fn update_identity(&self, identity: &Identity) -> StoreResult<()> {
        replace(&mut self.state().identities, identity.id, identity.clone(), "identity")
    }

    fn delete_identity(&self, id: Uuid) -> StoreResult<()> {
        self.state().identities.remove(&id);
        Ok(())
    }

    fn insert_hospital(&self, hospital: &Hospital) -> StoreResult<()> {
        let mut state = self.state();
        if state.hospitals.values().any(|h| h.admin_id == hospital.admin_id) {
            return Err(CareError::Conflict(
                "administrator already manages a hospital".to_string(),
            ));
        }
        state.hospitals.insert(hospital.id, hospital.clone());
        Ok(())
    }

    fn hospital(&self, id: Uuid) -> StoreResult<Option<Hospital>> {
        Ok(self.state().hospitals.get(&id).cloned())
    }

    fn lock_hospital(&self, id: Uuid) -> StoreResult<Option<Hospital>> {
        self.hospital(id)
    }

    fn hospital_by_admin(&self, admin: Uuid) -> StoreResult<Option<Hospital>> {
        Ok(self
            .state()
            .hospitals
            .values()
            .find(|h| h.admin_id == admin)
            .cloned())
    }

    fn hospitals(&self) -> StoreResult<Vec<Hospital>> {
        let state = self.state();
        Ok(Self::sorted(state.hospitals.values().cloned(), |h| h.name.clone()))
    }

    fn update_hospital(&self, hospital: &Hospital) -> StoreResult<()> {
        replace(&mut self.state().hospitals, hospital.id, hospital.clone(), "hospital")
    }

    fn delete_hospital(&self, id: Uuid) -> StoreResult<()> {
        self.state().hospitals.remove(&id);
        Ok(())
    }

    fn insert_doctor(&self, doctor: &DoctorProfile) -> StoreResult<()> {
        self.state().doctors.insert(doctor.id, doctor.clone());
        Ok(())
    }

    fn doctor(&self, id: Uuid) -> StoreResult<Option<DoctorProfile>> {
        Ok(self.state().doctors.get(&id).cloned())
    }

    fn update_doctor(&self, doctor: &DoctorProfile) -> StoreResult<()> {
        replace(&mut self.state().doctors, doctor.id, doctor.clone(), "doctor")
    }

    fn delete_doctor(&self, id: Uuid) -> StoreResult<()> {
        let mut state = self.state();
        state.doctors.remove(&id);
        state.leave.retain(|(doctor, _)| *doctor != id);
        Ok(())
    }

    fn leave_dates(&self, doctor: Uuid) -> StoreResult<Vec<NaiveDate>> {
        Ok(self
            .state()
            .leave
            .iter()
            .filter(|(d, _)| *d == doctor)
            .map(|(_, date)| *date)
            .collect())
    }

    fn insert_leave(&self, doctor: Uuid, date: NaiveDate) -> StoreResult<bool> {
        Ok(self.state().leave.insert((doctor, date)))
    }

    fn delete_leave(&self, doctor: Uuid, date: NaiveDate) -> StoreResult<bool> {
        Ok(self.state().leave.remove(&(doctor, date)))
    }

    fn insert_affiliation_request(&self, request: &AffiliationRequest) -> StoreResult<()> {
        let mut state = self.state();
        if state
            .affiliation_requests
            .values()
            .any(|r| r.doctor_id == request.doctor_id && r.hospital_id == request.hospital_id)
        {
            return Err(CareError::Conflict(
                "affiliation request already exists".to_string(),
            ));
        }
        state.affiliation_requests.insert(request.id, request.clone());
        Ok(())
    }

    fn affiliation_request(&self, id: Uuid) -> StoreResult<Option<AffiliationRequest>> {
        Ok(self.state().affiliation_requests.get(&id).cloned())
    }

    fn affiliation_request_for(
        &self,
        doctor: Uuid,
        hospital: Uuid,
    ) -> StoreResult<Option<AffiliationRequest>> {
        Ok(self
            .state()
            .affiliation_requests
            .values()
            .find(|r| r.doctor_id == doctor && r.hospital_id == hospital)
            .cloned())
    }

    fn affiliation_requests_for_hospital(
        &self,
        hospital: Uuid,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<AffiliationRequest>> {
        let state = self.state();
        Ok(Self::sorted(
            state
                .affiliation_requests
                .values()
                .filter(|r| r.hospital_id == hospital && status.map_or(true, |s| r.status == s))
                .cloned(),
            |r| r.created_at,
        ))
    }

    fn update_affiliation_request(&self, request: &AffiliationRequest) -> StoreResult<()> {
        replace(
            &mut self.state().affiliation_requests,
            request.id,
            request.clone(),
            "affiliation request",
        )
    }

    fn insert_assignment(&self, assignment: &Assignment) -> StoreResult<()> {
        let mut state = self.state();
        if state
            .assignments
            .values()
            .any(|a| a.doctor_id == assignment.doctor_id && a.hospital_id == assignment.hospital_id)
        {
            return Err(CareError::Conflict("assignment already exists".to_string()));
        }
        state.assignments.insert(assignment.id, assignment.clone());
        Ok(())
    }

    fn assignment(&self, doctor: Uuid, hospital: Uuid) -> StoreResult<Option<Assignment>> {
        Ok(self
            .state()
            .assignments
            .values()
            .find(|a| a.doctor_id == doctor && a.hospital_id == hospital)
            .cloned())
    }

    fn assignments_for_doctor(&self, doctor: Uuid) -> StoreResult<Vec<Assignment>> {
        let state = self.state();
        Ok(Self::sorted(
            state.assignments.values().filter(|a| a.doctor_id == doctor).cloned(),
            |a| a.created_at,
        ))
    }

    fn assignments_for_hospital(&self, hospital: Uuid) -> StoreResult<Vec<Assignment>> {
        let state = self.state();
        Ok(Self::sorted(
            state
                .assignments
                .values()
                .filter(|a| a.hospital_id == hospital)
                .cloned(),
            |a| a.created_at,
        ))
    }

    fn update_assignment(&self, assignment: &Assignment) -> StoreResult<()> {
        replace(
            &mut self.state().assignments,
            assignment.id,
            assignment.clone(),
            "assignment",
        )
    }

    fn insert_appointment(&self, appointment: &Appointment) -> StoreResult<()> {
        let mut state = self.state();
        ensure_slot_free(&state, appointment)?;
        state.appointments.insert(appointment.id, appointment.clone());
        Ok(())
    }

    fn appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>> {
        Ok(self.state().appointments.get(&id).cloned())
    }

    fn appointments(&self, query: &AppointmentQuery) -> StoreResult<Vec<Appointment>> {
        let state = self.state();
        Ok(Self::sorted(
            state.appointments.values().filter(|a| query.matches(a)).cloned(),
            |a| (a.date, a.time, a.created_at),
        ))
    }

    fn update_appointment(&self, appointment: &Appointment) -> StoreResult<()> {
        let mut state = self.state();
        ensure_slot_free(&state, appointment)?;
        replace(
            &mut state.appointments,
            appointment.id,
            appointment.clone(),
            "appointment",
        )
    }

    fn insert_admission(&self, admission: &Admission) -> StoreResult<()> {
        self.state().admissions.insert(admission.id, admission.clone());
        Ok(())
    }

    fn admission(&self, id: Uuid) -> StoreResult<Option<Admission>> {
        Ok(self.state().admissions.get(&id).cloned())
    }

    fn admission_for_appointment(&self, appointment: Uuid) -> StoreResult<Option<Admission>> {
        Ok(self
            .state()
            .admissions
            .values()
            .find(|a| a.appointment_id == Some(appointment))
            .cloned())
    }

    fn admissions_for_hospital(&self, hospital: Uuid) -> StoreResult<Vec<Admission>> {
        let state = self.state();
        Ok(Self::sorted(
            state
                .admissions
                .values()
                .filter(|a| a.hospital_id == hospital)
                .cloned(),
            |a| a.admission_time,
        ))
    }

    fn occupied_beds(&self, hospital: Uuid, at: DateTime<Utc>) -> StoreResult<i64> {
        Ok(occupied_count(self.state().admissions.values(), hospital, at))
    }

    fn update_admission(&self, admission: &Admission) -> StoreResult<()> {
        replace(
            &mut self.state().admissions,
            admission.id,
            admission.clone(),
            "admission",
        )
    }

    fn insert_change_request(&self, request: &ChangeRequest) -> StoreResult<()> {
        self.state().change_requests.insert(request.id, request.clone());
        Ok(())
    }

    fn change_request(&self, id: Uuid) -> StoreResult<Option<ChangeRequest>> {
        Ok(self.state().change_requests.get(&id).cloned())
    }

    fn change_requests(
        &self,
        doctor: Option<Uuid>,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<ChangeRequest>> {
        let state = self.state();
        Ok(Self::sorted(
            state
                .change_requests
                .values()
                .filter(|r| {
                    doctor.map_or(true, |d| r.doctor_id == d)
                        && status.map_or(true, |s| r.status == s)
                })
                .cloned(),
            |r| r.created_at,
        ))
    }

    fn update_change_request(&self, request: &ChangeRequest) -> StoreResult<()> {
        replace(
            &mut self.state().change_requests,
            request.id,
            request.clone(),
            "change request",
        )
    }

    fn insert_review(&self, review: &HospitalReview) -> StoreResult<()> {
        let mut state = self.state();
        if state
            .reviews
            .values()
            .any(|r| r.hospital_id == review.hospital_id && r.patient_id == review.patient_id)
        {
            return Err(CareError::AlreadyReviewed);
        }
        state.reviews.insert(review.id, review.clone());
        Ok(())
    }

    fn reviews_for_hospital(&self, hospital: Uuid) -> StoreResult<Vec<HospitalReview>> {
        let state = self.state();
        let mut reviews = Self::sorted(
            state.reviews.values().filter(|r| r.hospital_id == hospital).cloned(),
            |r| r.created_at,
        );
        reviews.reverse();
        Ok(reviews)
    }
}

impl CareStore for MemoryStore {
    fn atomically<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&dyn Repository) -> StoreResult<T>,
    {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let scratch = MemoryStore {
            state: Mutex::new(self.state().clone()),
            writer: Mutex::new(()),
        };
        let out = f(&scratch)?;
        let committed = scratch
            .state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        *self.state() = committed;
        Ok(out)
    }
}
