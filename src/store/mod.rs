//! Persistence contract used by the services.
//!
//! [`Repository`] is object safe so that a transactional view can be handed
//! to service closures as `&dyn Repository`. [`CareStore`] adds
//! [`atomically`](CareStore::atomically): everything the closure writes is
//! committed together or not at all.
//!
//! Both stores enforce the same uniqueness rules: one active booking per
//! doctor slot, one affiliation request and one assignment per
//! (doctor, hospital), one review per (hospital, patient), unique emails.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::CareError;
use crate::model::{
    Admission, AffiliationRequest, Appointment, AppointmentQuery, Assignment, ChangeRequest,
    DoctorProfile, Hospital, HospitalReview, Identity, RequestStatus, Role,
};

pub type StoreResult<T> = Result<T, CareError>;

pub trait Repository {
    // identities
    fn insert_identity(&self, identity: &Identity) -> StoreResult<()>;
    fn identity(&self, id: Uuid) -> StoreResult<Option<Identity>>;
    fn identity_by_email(&self, email: &str) -> StoreResult<Option<Identity>>;
    fn identities_by_role(&self, role: Role) -> StoreResult<Vec<Identity>>;
    fn update_identity(&self, identity: &Identity) -> StoreResult<()>;
    fn delete_identity(&self, id: Uuid) -> StoreResult<()>;

    // hospitals
    fn insert_hospital(&self, hospital: &Hospital) -> StoreResult<()>;
    fn hospital(&self, id: Uuid) -> StoreResult<Option<Hospital>>;
    /// Like [`hospital`](Repository::hospital) but serializes concurrent
    /// bed allocation for the rest of the transaction.
    fn lock_hospital(&self, id: Uuid) -> StoreResult<Option<Hospital>>;
    fn hospital_by_admin(&self, admin: Uuid) -> StoreResult<Option<Hospital>>;
    fn hospitals(&self) -> StoreResult<Vec<Hospital>>;
    fn update_hospital(&self, hospital: &Hospital) -> StoreResult<()>;
    fn delete_hospital(&self, id: Uuid) -> StoreResult<()>;

    // doctor profiles and leave
    fn insert_doctor(&self, doctor: &DoctorProfile) -> StoreResult<()>;
    fn doctor(&self, id: Uuid) -> StoreResult<Option<DoctorProfile>>;
    fn update_doctor(&self, doctor: &DoctorProfile) -> StoreResult<()>;
    fn delete_doctor(&self, id: Uuid) -> StoreResult<()>;
    fn leave_dates(&self, doctor: Uuid) -> StoreResult<Vec<NaiveDate>>;
    /// Returns false when the date was already recorded.
    fn insert_leave(&self, doctor: Uuid, date: NaiveDate) -> StoreResult<bool>;
    /// Returns false when there was nothing to remove.
    fn delete_leave(&self, doctor: Uuid, date: NaiveDate) -> StoreResult<bool>;

    // affiliation
    fn insert_affiliation_request(&self, request: &AffiliationRequest) -> StoreResult<()>;
    fn affiliation_request(&self, id: Uuid) -> StoreResult<Option<AffiliationRequest>>;
    fn affiliation_request_for(
        &self,
        doctor: Uuid,
        hospital: Uuid,
    ) -> StoreResult<Option<AffiliationRequest>>;
    fn affiliation_requests_for_hospital(
        &self,
        hospital: Uuid,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<AffiliationRequest>>;
    fn update_affiliation_request(&self, request: &AffiliationRequest) -> StoreResult<()>;
    fn insert_assignment(&self, assignment: &Assignment) -> StoreResult<()>;
    fn assignment(&self, doctor: Uuid, hospital: Uuid) -> StoreResult<Option<Assignment>>;
    /// Oldest first.
    fn assignments_for_doctor(&self, doctor: Uuid) -> StoreResult<Vec<Assignment>>;
    fn assignments_for_hospital(&self, hospital: Uuid) -> StoreResult<Vec<Assignment>>;
    fn update_assignment(&self, assignment: &Assignment) -> StoreResult<()>;

    // appointments
    /// Fails with [`CareError::SlotTaken`] if an active booking holds the slot.
    fn insert_appointment(&self, appointment: &Appointment) -> StoreResult<()>;
    fn appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>>;
    /// Ordered by date, then time.
    fn appointments(&self, query: &AppointmentQuery) -> StoreResult<Vec<Appointment>>;
    fn update_appointment(&self, appointment: &Appointment) -> StoreResult<()>;

    // admissions
    fn insert_admission(&self, admission: &Admission) -> StoreResult<()>;
    fn admission(&self, id: Uuid) -> StoreResult<Option<Admission>>;
    fn admission_for_appointment(&self, appointment: Uuid) -> StoreResult<Option<Admission>>;
    fn admissions_for_hospital(&self, hospital: Uuid) -> StoreResult<Vec<Admission>>;
    fn occupied_beds(&self, hospital: Uuid, at: DateTime<Utc>) -> StoreResult<i64>;
    fn update_admission(&self, admission: &Admission) -> StoreResult<()>;

    // profile change requests
    fn insert_change_request(&self, request: &ChangeRequest) -> StoreResult<()>;
    fn change_request(&self, id: Uuid) -> StoreResult<Option<ChangeRequest>>;
    fn change_requests(
        &self,
        doctor: Option<Uuid>,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<ChangeRequest>>;
    fn update_change_request(&self, request: &ChangeRequest) -> StoreResult<()>;

    // reviews
    /// Fails with [`CareError::AlreadyReviewed`] on a second review.
    fn insert_review(&self, review: &HospitalReview) -> StoreResult<()>;
    fn reviews_for_hospital(&self, hospital: Uuid) -> StoreResult<Vec<HospitalReview>>;
}

pub trait CareStore: Repository {
    /// Runs `f` in one transaction: commit on `Ok`, roll back on `Err`.
    fn atomically<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&dyn Repository) -> StoreResult<T>;
}
