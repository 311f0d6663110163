use uuid::Uuid;

use super::availability::doctor_profile;
use super::{authorized, CareService};
use crate::clock::Clock;
use crate::error::CareError;
use crate::guard;
use crate::model::{
    ChangeRequest, ContactUpdate, DoctorProfile, ProfileChanges, ProfileField, RequestStatus,
};
use crate::store::{CareStore, Repository};

impl<S: CareStore, C: Clock> CareService<S, C> {
    /// Contact details and photo are applied without review.
    pub fn update_contact(&self, doctor: Uuid, update: ContactUpdate) -> Result<DoctorProfile, CareError> {
        self.store.atomically(|repo| {
            authorized(repo, doctor, guard::DOCTOR)?;
            let mut profile = doctor_profile(repo, doctor)?;
            profile.apply_contact(update);
            repo.update_doctor(&profile)?;
            Ok(profile)
        })
    }

    /// Queue one Pending request per credential field that would change.
    pub fn propose_changes(
        &self,
        doctor: Uuid,
        changes: ProfileChanges,
    ) -> Result<Vec<ChangeRequest>, CareError> {
        let now = self.clock.now();
        let proposed = changes.proposed();
        for (field, value) in &proposed {
            if value.is_empty() && *field != ProfileField::VerificationDocument {
                return Err(CareError::validation(field.as_str(), "cannot be blank"));
            }
        }

        let queued = self.store.atomically(|repo| {
            authorized(repo, doctor, guard::DOCTOR)?;
            let profile = doctor_profile(repo, doctor)?;
            let mut queued = Vec::new();
            for (field, value) in proposed {
                let current = profile.field_value(field);
                if current.as_deref() == Some(value.as_str()) {
                    continue;
                }
                let request = ChangeRequest::new(doctor, field, current, value, now);
                repo.insert_change_request(&request)?;
                queued.push(request);
            }
            Ok(queued)
        })?;

        if !queued.is_empty() {
            log::info!("doctor {doctor} proposed {} profile changes", queued.len());
        }
        Ok(queued)
    }

    /// Copy the proposed value into the live profile.
    pub fn approve_change(&self, admin: Uuid, request: Uuid) -> Result<ChangeRequest, CareError> {
        self.review_change(admin, request, RequestStatus::Approved)
    }

    /// Close the request without touching the profile.
    pub fn reject_change(&self, admin: Uuid, request: Uuid) -> Result<ChangeRequest, CareError> {
        self.review_change(admin, request, RequestStatus::Rejected)
    }

    fn review_change(
        &self,
        admin: Uuid,
        request: Uuid,
        decision: RequestStatus,
    ) -> Result<ChangeRequest, CareError> {
        let now = self.clock.now();
        self.store.atomically(|repo| {
            authorized(repo, admin, guard::ADMIN)?;
            let mut found = repo
                .change_request(request)?
                .ok_or(CareError::NotFound("change request"))?;
            if found.status != RequestStatus::Pending {
                return Err(CareError::Conflict(format!(
                    "change request already {}",
                    found.status.as_str().to_lowercase()
                )));
            }

            if decision == RequestStatus::Approved {
                let mut profile = doctor_profile(repo, found.doctor_id)?;
                profile.apply_field(found.field, &found.new_value)?;
                repo.update_doctor(&profile)?;
            }
            found.status = decision;
            found.reviewed_at = Some(now);
            found.reviewed_by = Some(admin);
            repo.update_change_request(&found)?;
            log::info!(
                "{} {} change for doctor {}",
                decision.as_str().to_lowercase(),
                found.field,
                found.doctor_id
            );
            Ok(found)
        })
    }

    /// The admin review queue, oldest first.
    pub fn pending_changes(&self, admin: Uuid) -> Result<Vec<ChangeRequest>, CareError> {
        authorized(&self.store, admin, guard::ADMIN)?;
        self.store.change_requests(None, Some(RequestStatus::Pending))
    }

    pub fn pending_changes_for(&self, doctor: Uuid) -> Result<Vec<ChangeRequest>, CareError> {
        authorized(&self.store, doctor, guard::DOCTOR)?;
        self.store
            .change_requests(Some(doctor), Some(RequestStatus::Pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Specialization;
    use crate::service::fixtures::*;

    fn setup() -> (TestService, Uuid, Uuid) {
        let svc = service();
        let admin = admin(&svc);
        let (manager, hospital) = hospital(&svc, admin, "North", 5);
        let doc = doctor(&svc, admin, manager, hospital.id, "doc@example.com");
        (svc, admin, doc)
    }

    #[test]
    fn test_contact_changes_apply_immediately() {
        let (svc, _, doc) = setup();
        let profile = svc
            .update_contact(
                doc,
                ContactUpdate {
                    phone: Some("555-0100".to_string()),
                    ..ContactUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(profile.phone.as_deref(), Some("555-0100"));
        assert!(svc.pending_changes_for(doc).unwrap().is_empty());
    }

    #[test]
    fn test_unchanged_fields_are_skipped() {
        let (svc, admin, doc) = setup();
        let queued = svc
            .propose_changes(
                doc,
                ProfileChanges {
                    qualification: Some("MBBS".to_string()),
                    license_number: Some("LIC-77".to_string()),
                    ..ProfileChanges::default()
                },
            )
            .unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].field, ProfileField::LicenseNumber);
        assert_eq!(queued[0].old_value.as_deref(), Some("LIC-1"));
        assert_eq!(svc.pending_changes(admin).unwrap().len(), 1);

        // the live profile is untouched until review
        let profile = svc.store().doctor(doc).unwrap().unwrap();
        assert_eq!(profile.license_number, "LIC-1");
    }

    #[test]
    fn test_approve_copies_value_and_stamps_reviewer() {
        let (svc, admin, doc) = setup();
        let queued = svc
            .propose_changes(
                doc,
                ProfileChanges {
                    specialization: Some(Specialization::Oncology),
                    ..ProfileChanges::default()
                },
            )
            .unwrap();

        let reviewed = svc.approve_change(admin, queued[0].id).unwrap();
        assert_eq!(reviewed.status, RequestStatus::Approved);
        assert_eq!(reviewed.reviewed_by, Some(admin));
        assert!(reviewed.reviewed_at.is_some());

        let profile = svc.store().doctor(doc).unwrap().unwrap();
        assert_eq!(profile.specialization, Specialization::Oncology);

        let err = svc.reject_change(admin, queued[0].id).unwrap_err();
        assert!(matches!(err, CareError::Conflict(_)));
        assert_eq!(err.to_string(), "change request already approved");
    }

    #[test]
    fn test_reject_leaves_profile_alone() {
        let (svc, admin, doc) = setup();
        let queued = svc
            .propose_changes(
                doc,
                ProfileChanges {
                    qualification: Some("PhD".to_string()),
                    ..ProfileChanges::default()
                },
            )
            .unwrap();
        svc.reject_change(admin, queued[0].id).unwrap();
        let profile = svc.store().doctor(doc).unwrap().unwrap();
        assert_eq!(profile.qualification, "MBBS");
        assert!(svc.pending_changes(admin).unwrap().is_empty());
    }

    #[test]
    fn test_blank_credential_is_invalid_and_doctors_cannot_review() {
        let (svc, _, doc) = setup();
        let err = svc
            .propose_changes(
                doc,
                ProfileChanges {
                    license_number: Some("  ".to_string()),
                    ..ProfileChanges::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, CareError::Validation { field: "license_number", .. }));

        let queued = svc
            .propose_changes(
                doc,
                ProfileChanges {
                    qualification: Some("PhD".to_string()),
                    ..ProfileChanges::default()
                },
            )
            .unwrap();
        assert!(matches!(
            svc.approve_change(doc, queued[0].id),
            Err(CareError::PermissionDenied(_))
        ));
    }
}
