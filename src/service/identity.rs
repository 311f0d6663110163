//! Registration, sign-in checks and the admin approval workflow.

use uuid::Uuid;

use super::{authorized, required, CareService};
use crate::clock::Clock;
use crate::error::CareError;
use crate::guard::{self, authorize};
use crate::model::{DoctorProfile, Hospital, Identity, NewDoctor, NewHospital, Role};
use crate::store::{CareStore, Repository};

/// What a new account is registering as, with the role-specific details.
#[derive(Debug, Clone)]
pub enum Registration {
    Admin,
    Patient,
    Doctor(NewDoctor),
    HospitalAdmin(NewHospital),
}

impl Registration {
    pub fn role(&self) -> Role {
        match self {
            Registration::Admin => Role::Admin,
            Registration::Patient => Role::Patient,
            Registration::Doctor(_) => Role::Doctor,
            Registration::HospitalAdmin(_) => Role::HospitalAdmin,
        }
    }
}

fn validate_email(email: &str) -> Result<(), CareError> {
    match email.trim().split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(CareError::validation("email", "must look like name@domain")),
    }
}

impl<S: CareStore, C: Clock> CareService<S, C> {
    /// Create an account. Doctors also get a profile with the default
    /// schedule; hospital administrators get their hospital.
    pub fn register(
        &self,
        email: &str,
        display_name: &str,
        registration: Registration,
    ) -> Result<Identity, CareError> {
        validate_email(email)?;
        let name = required("display_name", display_name)?;
        let now = self.clock.now();
        let identity = Identity::new(registration.role(), email, &name, now);

        let schedule = self.default_schedule()?;
        let created = self.store.atomically(|repo| {
            if repo.identity_by_email(&identity.email)?.is_some() {
                return Err(CareError::Conflict("email already registered".to_string()));
            }
            repo.insert_identity(&identity)?;
            match &registration {
                Registration::Doctor(details) => {
                    required("qualification", &details.qualification)?;
                    required("license_number", &details.license_number)?;
                    let profile = DoctorProfile::new(identity.id, details.clone(), schedule, now);
                    repo.insert_doctor(&profile)?;
                }
                Registration::HospitalAdmin(details) => {
                    required("hospital_name", &details.name)?;
                    required("address", &details.address)?;
                    if details.total_beds < 0 {
                        return Err(CareError::validation("total_beds", "cannot be negative"));
                    }
                    repo.insert_hospital(&Hospital::new(identity.id, details.clone(), now))?;
                }
                Registration::Admin | Registration::Patient => {}
            }
            Ok(identity.clone())
        })?;

        log::info!("registered {} {}", created.role, created.id);
        Ok(created)
    }

    pub fn identity(&self, id: Uuid) -> Result<Identity, CareError> {
        self.store.identity(id)?.ok_or(CareError::NotFound("identity"))
    }

    /// The checks applied at sign-in: blocked first, then pending approval.
    pub fn sign_in_check(&self, email: &str) -> Result<Identity, CareError> {
        let identity = self
            .store
            .identity_by_email(&email.trim().to_lowercase())?
            .ok_or(CareError::NotFound("account"))?;
        authorize(&identity, guard::SIGN_IN)?;
        Ok(identity)
    }

    pub fn can_access_dashboard(&self, id: Uuid) -> Result<bool, CareError> {
        let identity = self.identity(id)?;
        Ok(identity.active && identity.can_access_dashboard())
    }

    /// Doctors and hospital administrators waiting for an admin decision.
    pub fn pending_identities(&self, admin: Uuid) -> Result<Vec<Identity>, CareError> {
        authorized(&self.store, admin, guard::ADMIN)?;
        let mut pending = Vec::new();
        for role in [Role::Doctor, Role::HospitalAdmin] {
            pending.extend(
                self.store
                    .identities_by_role(role)?
                    .into_iter()
                    .filter(Identity::is_pending_approval),
            );
        }
        pending.sort_by_key(|i| i.created_at);
        Ok(pending)
    }

    pub fn approve_identity(&self, admin: Uuid, target: Uuid) -> Result<Identity, CareError> {
        self.store.atomically(|repo| {
            authorized(repo, admin, guard::ADMIN)?;
            let mut identity = repo.identity(target)?.ok_or(CareError::NotFound("identity"))?;
            if !identity.role.requires_approval() {
                return Err(CareError::Conflict(format!(
                    "{} accounts do not need approval",
                    identity.role
                )));
            }
            if !identity.approved {
                identity.approved = true;
                repo.update_identity(&identity)?;
                log::info!("approved {} {}", identity.role, identity.id);
            }
            Ok(identity)
        })
    }

    /// Delete a pending doctor or hospital administrator along with the
    /// profile or hospital created at registration.
    pub fn reject_identity(&self, admin: Uuid, target: Uuid) -> Result<(), CareError> {
        self.store.atomically(|repo| {
            authorized(repo, admin, guard::ADMIN)?;
            let identity = repo.identity(target)?.ok_or(CareError::NotFound("identity"))?;
            if !identity.is_pending_approval() {
                return Err(CareError::Conflict(
                    "only pending accounts can be rejected".to_string(),
                ));
            }
            match identity.role {
                Role::Doctor => repo.delete_doctor(identity.id)?,
                Role::HospitalAdmin => {
                    if let Some(hospital) = repo.hospital_by_admin(identity.id)? {
                        repo.delete_hospital(hospital.id)?;
                    }
                }
                Role::Admin | Role::Patient => {}
            }
            repo.delete_identity(identity.id)?;
            log::info!("rejected {} {}", identity.role, identity.id);
            Ok(())
        })
    }

    pub fn block_identity(&self, admin: Uuid, target: Uuid) -> Result<Identity, CareError> {
        self.set_active(admin, target, false)
    }

    pub fn unblock_identity(&self, admin: Uuid, target: Uuid) -> Result<Identity, CareError> {
        self.set_active(admin, target, true)
    }

    fn set_active(&self, admin: Uuid, target: Uuid, active: bool) -> Result<Identity, CareError> {
        self.store.atomically(|repo| {
            authorized(repo, admin, guard::ADMIN)?;
            let mut identity = repo.identity(target)?.ok_or(CareError::NotFound("identity"))?;
            if identity.role == Role::Admin {
                return Err(CareError::Conflict(
                    "administrators cannot be blocked".to_string(),
                ));
            }
            if identity.active != active {
                identity.active = active;
                repo.update_identity(&identity)?;
                log::info!(
                    "{} {} {}",
                    if active { "unblocked" } else { "blocked" },
                    identity.role,
                    identity.id
                );
            }
            Ok(identity)
        })
    }

    /// The hospital run by `hospital_admin`.
    pub fn managed_hospital(&self, hospital_admin: Uuid) -> Result<Hospital, CareError> {
        authorized(&self.store, hospital_admin, guard::HOSPITAL_ADMIN)?;
        self.store
            .hospital_by_admin(hospital_admin)?
            .ok_or(CareError::NotFound("hospital"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::Specialization;
    use crate::service::fixtures::*;

    fn doctor_details() -> NewDoctor {
        NewDoctor {
            specialization: Specialization::Cardiology,
            qualification: "MD".to_string(),
            license_number: "LIC-42".to_string(),
            verification_document: None,
        }
    }

    #[test]
    fn test_register_validates_email_and_name() {
        let svc = service();
        let err = svc.register("nobody", "Name", Registration::Patient).unwrap_err();
        assert!(matches!(err, CareError::Validation { field: "email", .. }));
        let err = svc.register("a@b.c", "   ", Registration::Patient).unwrap_err();
        assert!(matches!(err, CareError::Validation { field: "display_name", .. }));
    }

    #[test]
    fn test_duplicate_email_is_a_conflict() {
        let svc = service();
        patient(&svc, "pat@example.com");
        let err = svc
            .register("PAT@example.com", "Other", Registration::Patient)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_doctor_starts_pending_with_default_schedule() {
        let svc = service();
        let doctor = svc
            .register("doc@example.com", "Doc", Registration::Doctor(doctor_details()))
            .unwrap();
        assert!(doctor.is_pending_approval());
        assert!(!svc.can_access_dashboard(doctor.id).unwrap());

        let profile = svc.store().doctor(doctor.id).unwrap().unwrap();
        assert_eq!(profile.schedule.slot_minutes(), 30);

        let err = svc.sign_in_check("doc@example.com").unwrap_err();
        assert_eq!(err.to_string(), "permission denied: pending approval");
    }

    #[test]
    fn test_approve_then_block_then_unblock() {
        let svc = service();
        let admin = admin(&svc);
        let doctor = svc
            .register("doc@example.com", "Doc", Registration::Doctor(doctor_details()))
            .unwrap();
        assert_eq!(svc.pending_identities(admin).unwrap().len(), 1);

        svc.approve_identity(admin, doctor.id).unwrap();
        assert!(svc.sign_in_check("doc@example.com").is_ok());
        assert!(svc.pending_identities(admin).unwrap().is_empty());

        svc.block_identity(admin, doctor.id).unwrap();
        let err = svc.sign_in_check("doc@example.com").unwrap_err();
        assert_eq!(err.to_string(), "permission denied: account blocked");

        svc.unblock_identity(admin, doctor.id).unwrap();
        assert!(svc.sign_in_check("doc@example.com").is_ok());
    }

    #[test]
    fn test_admins_cannot_be_blocked_and_patients_need_no_approval() {
        let svc = service();
        let admin = admin(&svc);
        let other = svc
            .register("root@example.com", "Root", Registration::Admin)
            .unwrap();
        assert!(matches!(
            svc.block_identity(admin, other.id),
            Err(CareError::Conflict(_))
        ));
        let pat = patient(&svc, "p@example.com");
        assert!(matches!(
            svc.approve_identity(admin, pat),
            Err(CareError::Conflict(_))
        ));
    }

    #[test]
    fn test_reject_removes_pending_hospital_admin_and_hospital() {
        let svc = service();
        let admin = admin(&svc);
        let manager = svc
            .register(
                "mgr@example.com",
                "Manager",
                Registration::HospitalAdmin(NewHospital {
                    name: "General".to_string(),
                    address: "2 Side Road".to_string(),
                    phone: None,
                    email: None,
                    total_beds: 10,
                }),
            )
            .unwrap();
        assert_eq!(svc.store().hospitals().unwrap().len(), 1);

        svc.reject_identity(admin, manager.id).unwrap();
        assert!(svc.store().hospitals().unwrap().is_empty());
        assert!(matches!(svc.identity(manager.id), Err(CareError::NotFound(_))));
    }

    #[test]
    fn test_non_admin_cannot_approve() {
        let svc = service();
        let pat = patient(&svc, "p@example.com");
        let err = svc.approve_identity(pat, pat).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }
}
