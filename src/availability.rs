//! Doctor availability engine.
//!
//! Pure functions over a [`Schedule`], the booked times of one doctor on one
//! date, and the current moment. The booked set must contain every
//! Pending/Confirmed booking of the doctor on that date regardless of
//! hospital: a doctor has one calendar even when serving several hospitals.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashSet;

use crate::model::Schedule;

/// Open slot start times for `date`, in order.
///
/// Slots start at `from` and advance by the slot length while the cursor is
/// before `to`, so a last slot that starts in the window is offered even if
/// it runs past the end. On `now`'s date every slot at or before the current
/// time is skipped. Past dates have no slots. Leave days are filtered by the
/// caller.
pub fn available_slots(
    schedule: &Schedule,
    date: NaiveDate,
    booked: &HashSet<NaiveTime>,
    now: NaiveDateTime,
) -> Vec<NaiveTime> {
    let today = now.date();
    if date < today {
        return Vec::new();
    }
    let step = Duration::minutes(i64::from(schedule.slot_minutes()));

    let mut slots = Vec::new();
    let mut cursor = schedule.from();
    while cursor < schedule.to() {
        let passed = date == today && cursor <= now.time();
        if !passed && !booked.contains(&cursor) {
            slots.push(cursor);
        }
        let (next, wrapped) = cursor.overflowing_add_signed(step);
        if wrapped != 0 {
            break;
        }
        cursor = next;
    }
    slots
}

/// `horizon` consecutive dates starting at `today`, minus leave days.
pub fn bookable_dates(today: NaiveDate, horizon: u32, leave: &HashSet<NaiveDate>) -> Vec<NaiveDate> {
    today
        .iter_days()
        .take(horizon as usize)
        .filter(|d| !leave.contains(d))
        .collect()
}
