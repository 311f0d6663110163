//! Doctor to hospital affiliation: request, review, removal.
//!
//! There is one request row and at most one assignment row per
//! (doctor, hospital). Asking again after a rejection, or after being
//! removed, reopens the existing request instead of adding another.

use rust_decimal::Decimal;
use uuid::Uuid;

use super::appointments::serving_hospitals;
use super::{authorized, CareService};
use crate::clock::Clock;
use crate::error::CareError;
use crate::guard;
use crate::model::{
    AffiliationRequest, AppointmentQuery, Assignment, DoctorProfile, Hospital, RequestStatus,
};
use crate::store::{CareStore, Repository};

/// What [`CareService::request_affiliation`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AffiliationOutcome {
    Requested(AffiliationRequest),
    /// A rejected or lapsed request went back to Pending.
    Reopened(AffiliationRequest),
    /// Nothing changed; a request is already waiting.
    AlreadyPending(AffiliationRequest),
    /// Nothing changed; the doctor already works there.
    AlreadyAffiliated(AffiliationRequest),
}

impl AffiliationOutcome {
    pub fn request(&self) -> &AffiliationRequest {
        match self {
            AffiliationOutcome::Requested(r)
            | AffiliationOutcome::Reopened(r)
            | AffiliationOutcome::AlreadyPending(r)
            | AffiliationOutcome::AlreadyAffiliated(r) => r,
        }
    }
}

/// A Pending request addressed to the hospital run by `hospital_admin`.
fn pending_request_for_admin(
    repo: &dyn Repository,
    hospital_admin: Uuid,
    request: Uuid,
) -> Result<AffiliationRequest, CareError> {
    authorized(repo, hospital_admin, guard::HOSPITAL_ADMIN)?;
    let hospital = repo
        .hospital_by_admin(hospital_admin)?
        .ok_or(CareError::NotFound("hospital"))?;
    repo.affiliation_request(request)?
        .filter(|r| r.hospital_id == hospital.id && r.status == RequestStatus::Pending)
        .ok_or(CareError::NotFound("affiliation request"))
}

impl<S: CareStore, C: Clock> CareService<S, C> {
    pub fn request_affiliation(
        &self,
        doctor: Uuid,
        hospital: Uuid,
        compensation: Decimal,
    ) -> Result<AffiliationOutcome, CareError> {
        if compensation < Decimal::ZERO {
            return Err(CareError::validation("compensation", "cannot be negative"));
        }
        let now = self.clock.now();

        let outcome = self.store.atomically(|repo| {
            authorized(repo, doctor, guard::DOCTOR)?;
            repo.hospital(hospital)?
                .ok_or(CareError::NotFound("hospital"))?;

            let Some(mut existing) = repo.affiliation_request_for(doctor, hospital)? else {
                let request = AffiliationRequest::new(doctor, hospital, compensation, now);
                repo.insert_affiliation_request(&request)?;
                return Ok(AffiliationOutcome::Requested(request));
            };

            let serving = repo
                .assignment(doctor, hospital)?
                .is_some_and(|a| a.active);
            match existing.status {
                RequestStatus::Pending => Ok(AffiliationOutcome::AlreadyPending(existing)),
                RequestStatus::Approved if serving => {
                    Ok(AffiliationOutcome::AlreadyAffiliated(existing))
                }
                RequestStatus::Approved | RequestStatus::Rejected => {
                    existing.status = RequestStatus::Pending;
                    existing.compensation = compensation;
                    existing.updated_at = now;
                    repo.update_affiliation_request(&existing)?;
                    Ok(AffiliationOutcome::Reopened(existing))
                }
            }
        })?;

        match &outcome {
            AffiliationOutcome::Requested(r) | AffiliationOutcome::Reopened(r) => {
                log::info!("doctor {doctor} asked to join hospital {hospital} ({})", r.id)
            }
            _ => log::debug!("affiliation request by doctor {doctor} changed nothing"),
        }
        Ok(outcome)
    }

    /// Requests addressed to the admin's hospital, oldest first.
    pub fn affiliation_requests(
        &self,
        hospital_admin: Uuid,
        status: Option<RequestStatus>,
    ) -> Result<Vec<AffiliationRequest>, CareError> {
        let hospital = self.managed_hospital(hospital_admin)?;
        self.store.affiliation_requests_for_hospital(hospital.id, status)
    }

    /// Approve a pending request and give the doctor an active assignment
    /// at the proposed compensation.
    pub fn approve_affiliation(&self, hospital_admin: Uuid, request: Uuid) -> Result<Assignment, CareError> {
        let now = self.clock.now();
        self.store.atomically(|repo| {
            let mut found = pending_request_for_admin(repo, hospital_admin, request)?;
            found.status = RequestStatus::Approved;
            found.updated_at = now;
            repo.update_affiliation_request(&found)?;

            let assignment = match repo.assignment(found.doctor_id, found.hospital_id)? {
                Some(mut existing) => {
                    existing.active = true;
                    existing.compensation = found.compensation;
                    repo.update_assignment(&existing)?;
                    existing
                }
                None => {
                    let fresh = Assignment::new(found.doctor_id, found.hospital_id, found.compensation, now);
                    repo.insert_assignment(&fresh)?;
                    fresh
                }
            };
            log::info!(
                "doctor {} joined hospital {} at {}",
                assignment.doctor_id,
                assignment.hospital_id,
                assignment.compensation
            );
            Ok(assignment)
        })
    }

    pub fn reject_affiliation(&self, hospital_admin: Uuid, request: Uuid) -> Result<AffiliationRequest, CareError> {
        let now = self.clock.now();
        self.store.atomically(|repo| {
            let mut found = pending_request_for_admin(repo, hospital_admin, request)?;
            found.status = RequestStatus::Rejected;
            found.updated_at = now;
            repo.update_affiliation_request(&found)?;
            log::info!("rejected affiliation request {}", found.id);
            Ok(found)
        })
    }

    /// Deactivate the doctor's assignment at the admin's hospital.
    ///
    /// Refused while the doctor still has Pending or Confirmed appointments
    /// there dated today or later.
    pub fn remove_doctor(&self, hospital_admin: Uuid, doctor: Uuid) -> Result<Assignment, CareError> {
        let today = self.clock.today();
        self.store.atomically(|repo| {
            authorized(repo, hospital_admin, guard::HOSPITAL_ADMIN)?;
            let hospital = repo
                .hospital_by_admin(hospital_admin)?
                .ok_or(CareError::NotFound("hospital"))?;
            let mut assignment = repo
                .assignment(doctor, hospital.id)?
                .filter(|a| a.active)
                .ok_or(CareError::NotFound("doctor"))?;

            let upcoming = repo.appointments(
                &AppointmentQuery::for_doctor(doctor)
                    .at_hospital(hospital.id)
                    .from(today)
                    .active(),
            )?;
            if !upcoming.is_empty() {
                return Err(CareError::Conflict(format!(
                    "doctor has {} pending or upcoming appointments",
                    upcoming.len()
                )));
            }

            assignment.active = false;
            repo.update_assignment(&assignment)?;
            log::info!("removed doctor {doctor} from hospital {}", hospital.id);
            Ok(assignment)
        })
    }

    /// Hospitals the doctor actively serves, primary first.
    pub fn affiliated_hospitals(&self, doctor: Uuid) -> Result<Vec<Hospital>, CareError> {
        serving_hospitals(&self.store, doctor)?
            .into_iter()
            .map(|id| self.store.hospital(id)?.ok_or(CareError::NotFound("hospital")))
            .collect()
    }

    pub fn primary_hospital(&self, doctor: Uuid) -> Result<Option<Hospital>, CareError> {
        Ok(self.affiliated_hospitals(doctor)?.into_iter().next())
    }

    /// Profiles of the doctors with an active assignment at `hospital`.
    pub fn hospital_doctors(&self, hospital: Uuid) -> Result<Vec<DoctorProfile>, CareError> {
        let mut doctors = Vec::new();
        for assignment in self.store.assignments_for_hospital(hospital)? {
            if !assignment.active {
                continue;
            }
            if let Some(profile) = self.store.doctor(assignment.doctor_id)? {
                doctors.push(profile);
            }
        }
        Ok(doctors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::service::fixtures::*;
    use crate::service::{BookingRequest, Registration};
    use crate::model::{NewDoctor, Specialization};
    use chrono::NaiveTime;

    fn unaffiliated_doctor(svc: &TestService, admin: Uuid) -> Uuid {
        let doctor = svc
            .register(
                "new@example.com",
                "Dr New",
                Registration::Doctor(NewDoctor {
                    specialization: Specialization::Neurology,
                    qualification: "MD".to_string(),
                    license_number: "LIC-9".to_string(),
                    verification_document: None,
                }),
            )
            .unwrap();
        svc.approve_identity(admin, doctor.id).unwrap();
        doctor.id
    }

    #[test]
    fn test_second_pending_request_is_a_no_op() {
        let svc = service();
        let admin = admin(&svc);
        let (manager, hospital) = hospital(&svc, admin, "North", 5);
        let doc = unaffiliated_doctor(&svc, admin);

        let first = svc.request_affiliation(doc, hospital.id, Decimal::new(500, 0)).unwrap();
        assert!(matches!(first, AffiliationOutcome::Requested(_)));
        let second = svc.request_affiliation(doc, hospital.id, Decimal::new(900, 0)).unwrap();
        assert!(matches!(second, AffiliationOutcome::AlreadyPending(_)));
        assert_eq!(second.request().compensation, Decimal::new(500, 0));
        assert_eq!(svc.affiliation_requests(manager, None).unwrap().len(), 1);
    }

    #[test]
    fn test_negative_compensation_is_rejected() {
        let svc = service();
        let admin = admin(&svc);
        let (_, hospital) = hospital(&svc, admin, "North", 5);
        let doc = unaffiliated_doctor(&svc, admin);
        let err = svc
            .request_affiliation(doc, hospital.id, Decimal::new(-1, 0))
            .unwrap_err();
        assert!(matches!(err, CareError::Validation { field: "compensation", .. }));
    }

    #[test]
    fn test_rejected_request_reopens_the_same_row() {
        let svc = service();
        let admin = admin(&svc);
        let (manager, hospital) = hospital(&svc, admin, "North", 5);
        let doc = unaffiliated_doctor(&svc, admin);

        let first = svc.request_affiliation(doc, hospital.id, Decimal::ONE).unwrap();
        svc.reject_affiliation(manager, first.request().id).unwrap();
        let again = svc.request_affiliation(doc, hospital.id, Decimal::TEN).unwrap();
        assert!(matches!(again, AffiliationOutcome::Reopened(_)));
        assert_eq!(again.request().id, first.request().id);
        assert_eq!(again.request().compensation, Decimal::TEN);
        assert_eq!(
            svc.affiliation_requests(manager, Some(RequestStatus::Pending))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_approval_is_scoped_to_the_admins_hospital() {
        let svc = service();
        let admin = admin(&svc);
        let (north_admin, north) = hospital(&svc, admin, "North", 5);
        let (south_admin, _) = hospital(&svc, admin, "South", 5);
        let doc = unaffiliated_doctor(&svc, admin);
        let outcome = svc.request_affiliation(doc, north.id, Decimal::ONE).unwrap();

        assert!(matches!(
            svc.approve_affiliation(south_admin, outcome.request().id),
            Err(CareError::NotFound(_))
        ));
        let assignment = svc.approve_affiliation(north_admin, outcome.request().id).unwrap();
        assert!(assignment.active);
        assert_eq!(svc.primary_hospital(doc).unwrap().map(|h| h.id), Some(north.id));

        // approving twice finds no pending request
        assert!(matches!(
            svc.approve_affiliation(north_admin, outcome.request().id),
            Err(CareError::NotFound(_))
        ));
        let again = svc.request_affiliation(doc, north.id, Decimal::ONE).unwrap();
        assert!(matches!(again, AffiliationOutcome::AlreadyAffiliated(_)));
    }

    #[test]
    fn test_multi_hospital_doctor_keeps_join_order() {
        let svc = service();
        let admin = admin(&svc);
        let (north_admin, north) = hospital(&svc, admin, "North", 5);
        let (south_admin, south) = hospital(&svc, admin, "South", 5);
        let doc = doctor(&svc, admin, north_admin, north.id, "doc@example.com");
        let outcome = svc.request_affiliation(doc, south.id, Decimal::ONE).unwrap();
        svc.approve_affiliation(south_admin, outcome.request().id).unwrap();

        let ids: Vec<Uuid> = svc.affiliated_hospitals(doc).unwrap().iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![north.id, south.id]);
        assert_eq!(svc.hospital_doctors(south.id).unwrap().len(), 1);
    }

    #[test]
    fn test_remove_blocked_by_upcoming_appointment() {
        let svc = service();
        let admin = admin(&svc);
        let (manager, hospital) = hospital(&svc, admin, "North", 5);
        let doc = doctor(&svc, admin, manager, hospital.id, "doc@example.com");
        let pat = patient(&svc, "pat@example.com");
        let booked = svc
            .book(
                pat,
                BookingRequest {
                    doctor: doc,
                    hospital: None,
                    date: day(3),
                    time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                    reason: "checkup".to_string(),
                },
            )
            .unwrap();

        let err = svc.remove_doctor(manager, doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        svc.patient_cancel(pat, booked.id).unwrap();
        svc.remove_doctor(manager, doc).unwrap();
        assert!(svc.affiliated_hospitals(doc).unwrap().is_empty());
        assert!(svc.hospital_doctors(hospital.id).unwrap().is_empty());

        // a removed doctor may ask to come back
        let back = svc.request_affiliation(doc, hospital.id, Decimal::ONE).unwrap();
        assert!(matches!(back, AffiliationOutcome::Reopened(_)));
    }

    #[test]
    fn test_pending_doctor_cannot_request() {
        let svc = service();
        let admin = admin(&svc);
        let (_, hospital) = hospital(&svc, admin, "North", 5);
        let doctor = svc
            .register(
                "wait@example.com",
                "Dr Wait",
                Registration::Doctor(NewDoctor {
                    specialization: Specialization::General,
                    qualification: "MD".to_string(),
                    license_number: "LIC-2".to_string(),
                    verification_document: None,
                }),
            )
            .unwrap();
        let err = svc
            .request_affiliation(doctor.id, hospital.id, Decimal::ONE)
            .unwrap_err();
        assert_eq!(err.to_string(), "permission denied: pending approval");
    }
}
