use uuid::Uuid;

use super::{authorized, CareService};
use crate::clock::Clock;
use crate::error::CareError;
use crate::guard;
use crate::model::{AppointmentQuery, AppointmentStatus, HospitalReview, RatingSummary};
use crate::store::{CareStore, Repository};

impl<S: CareStore, C: Clock> CareService<S, C> {
    /// One review per patient and hospital, after a completed visit there.
    pub fn submit_review(
        &self,
        patient: Uuid,
        hospital: Uuid,
        rating: i16,
        comment: &str,
    ) -> Result<HospitalReview, CareError> {
        if !(1..=5).contains(&rating) {
            return Err(CareError::validation("rating", "must be between 1 and 5"));
        }
        let now = self.clock.now();

        let review = self.store.atomically(|repo| {
            authorized(repo, patient, guard::PATIENT)?;
            repo.hospital(hospital)?
                .ok_or(CareError::NotFound("hospital"))?;
            let visited = !repo
                .appointments(
                    &AppointmentQuery::for_patient(patient)
                        .at_hospital(hospital)
                        .with_statuses(&[AppointmentStatus::Completed]),
                )?
                .is_empty();
            if !visited {
                return Err(CareError::Conflict(
                    "only patients with a completed appointment can review".to_string(),
                ));
            }

            let review = HospitalReview {
                id: Uuid::new_v4(),
                hospital_id: hospital,
                patient_id: patient,
                rating,
                comment: comment.trim().to_string(),
                created_at: now,
            };
            repo.insert_review(&review)?;
            Ok(review)
        })?;

        log::info!("patient {patient} rated hospital {hospital} {rating}/5");
        Ok(review)
    }

    /// Newest first.
    pub fn hospital_reviews(&self, hospital: Uuid) -> Result<Vec<HospitalReview>, CareError> {
        self.store.reviews_for_hospital(hospital)
    }

    pub fn hospital_rating(&self, hospital: Uuid) -> Result<RatingSummary, CareError> {
        Ok(RatingSummary::of(&self.store.reviews_for_hospital(hospital)?))
    }
}
