use chrono::{NaiveDate, NaiveTime};
use std::collections::HashSet;
use uuid::Uuid;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

use super::{authorized, CareService};
use crate::availability::{available_slots, bookable_dates};
use crate::clock::Clock;
use crate::error::CareError;
use crate::guard;
use crate::model::{AppointmentQuery, DoctorProfile, Schedule};
use crate::store::{CareStore, Repository};

/// Times held by Pending/Confirmed bookings of `doctor` on `date`, at any hospital.
pub(super) fn booked_times(
    repo: &dyn Repository,
    doctor: Uuid,
    date: NaiveDate,
) -> Result<HashSet<NaiveTime>, CareError> {
    Ok(repo
        .appointments(&AppointmentQuery::for_doctor(doctor).on(date).active())?
        .into_iter()
        .map(|a| a.time)
        .collect())
}

pub(super) fn doctor_profile(repo: &dyn Repository, doctor: Uuid) -> Result<DoctorProfile, CareError> {
    repo.doctor(doctor)?.ok_or(CareError::NotFound("doctor"))
}

impl<S: CareStore, C: Clock> CareService<S, C> {
    /// Dates offered for booking: today plus the configured horizon, minus leave.
    pub fn bookable_dates(&self, doctor: Uuid) -> Result<Vec<NaiveDate>, CareError> {
        doctor_profile(&self.store, doctor)?;
        let leave: HashSet<_> = self.store.leave_dates(doctor)?.into_iter().collect();
        Ok(bookable_dates(
            self.clock.today(),
            self.scheduling.booking_horizon_days,
            &leave,
        ))
    }

    /// Open slot start times for `doctor` on `date`.
    pub fn slots_for_date(&self, doctor: Uuid, date: NaiveDate) -> Result<Vec<NaiveTime>, CareError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::operation_span("available_slots").entered();

        let profile = doctor_profile(&self.store, doctor)?;
        if self.store.leave_dates(doctor)?.contains(&date) {
            log::debug!("doctor {doctor} is on leave {date}");
            return Ok(Vec::new());
        }
        let booked = booked_times(&self.store, doctor, date)?;
        let slots = available_slots(&profile.schedule, date, &booked, self.clock.local_now());
        log::debug!("doctor {doctor} has {} open slots on {date}", slots.len());
        Ok(slots)
    }

    pub fn update_schedule(
        &self,
        doctor: Uuid,
        from: NaiveTime,
        to: NaiveTime,
        slot_minutes: u32,
    ) -> Result<DoctorProfile, CareError> {
        let schedule = Schedule::new(from, to, slot_minutes)?;
        self.store.atomically(|repo| {
            authorized(repo, doctor, guard::DOCTOR)?;
            let mut profile = doctor_profile(repo, doctor)?;
            profile.schedule = schedule;
            repo.update_doctor(&profile)?;
            log::info!(
                "doctor {doctor} schedule now {}-{} every {} minutes",
                from.format("%H:%M"),
                to.format("%H:%M"),
                slot_minutes
            );
            Ok(profile)
        })
    }

    /// Returns false when the date was already a leave day.
    pub fn add_leave(&self, doctor: Uuid, date: NaiveDate) -> Result<bool, CareError> {
        if date < self.clock.today() {
            return Err(CareError::validation(
                "leave_date",
                "must be today or in the future",
            ));
        }
        self.store.atomically(|repo| {
            authorized(repo, doctor, guard::DOCTOR)?;
            doctor_profile(repo, doctor)?;
            let added = repo.insert_leave(doctor, date)?;
            if added {
                log::info!("doctor {doctor} on leave {date}");
            }
            Ok(added)
        })
    }

    /// Returns false when there was no leave on that date.
    pub fn remove_leave(&self, doctor: Uuid, date: NaiveDate) -> Result<bool, CareError> {
        self.store.atomically(|repo| {
            authorized(repo, doctor, guard::DOCTOR)?;
            repo.delete_leave(doctor, date)
        })
    }

    pub fn leave_dates(&self, doctor: Uuid) -> Result<Vec<NaiveDate>, CareError> {
        self.store.leave_dates(doctor)
    }
}
