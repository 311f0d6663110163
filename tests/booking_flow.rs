//! Booking and the appointment lifecycle, end to end on the in-memory store.

mod common;

use caregate::model::AppointmentStatus;
use caregate::service::{BookingRequest, CompletionOutcome, DoctorView, HospitalView, NotesUpdate};
use caregate::{CareError, ErrorKind, Repository};
use chrono::Duration;
use common::*;

fn request(doctor: uuid::Uuid, date: chrono::NaiveDate, h: u32, m: u32, reason: &str) -> BookingRequest {
    BookingRequest {
        doctor,
        hospital: None,
        date,
        time: at(h, m),
        reason: reason.to_string(),
    }
}

#[test]
fn test_book_confirm_and_reject_second_booking() {
    let c = clinic(5);
    let first = patient(&c.svc);
    let second = patient(&c.svc);
    let tomorrow = day(3);

    let booked = c.svc.book(first, request(c.doctor, tomorrow, 10, 0, "Checkup")).unwrap();
    assert_eq!(booked.status, AppointmentStatus::Pending);
    assert!(!booked.emergency);
    assert_eq!(booked.hospital_id, Some(c.hospital.id));

    let confirmed = c.svc.doctor_approve(c.doctor, booked.id).unwrap();
    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);

    let err = c
        .svc
        .book(second, request(c.doctor, tomorrow, 10, 0, "Checkup"))
        .unwrap_err();
    assert!(matches!(err, CareError::SlotTaken { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(c.svc.patient_upcoming(second).unwrap().is_empty());
    assert_eq!(c.svc.doctor_appointments(c.doctor, DoctorView::All).unwrap().len(), 1);
}

#[test]
fn test_default_day_has_sixteen_slots_and_bookings_remove_them() {
    let c = clinic(5);
    let pat = patient(&c.svc);
    let slots = c.svc.slots_for_date(c.doctor, day(3)).unwrap();
    assert_eq!(slots.len(), 16);
    assert_eq!(slots.first(), Some(&at(9, 0)));
    assert_eq!(slots.last(), Some(&at(16, 30)));

    c.svc.book(pat, request(c.doctor, day(3), 9, 30, "Follow-up")).unwrap();
    let slots = c.svc.slots_for_date(c.doctor, day(3)).unwrap();
    assert_eq!(slots.len(), 15);
    assert!(!slots.contains(&at(9, 30)));
}

#[test]
fn test_fractional_second_is_not_a_slot() {
    let c = clinic(5);
    let first = patient(&c.svc);
    let second = patient(&c.svc);
    let mut off_grid = request(c.doctor, day(3), 9, 0, "Checkup");
    off_grid.time = chrono::NaiveTime::from_hms_milli_opt(9, 0, 0, 500).unwrap();

    let err = c.svc.book(first, off_grid).unwrap_err();
    assert!(matches!(err, CareError::Validation { field: "appointment_time", .. }));
    assert!(c.svc.slots_for_date(c.doctor, day(3)).unwrap().contains(&at(9, 0)));

    // the listed slot and the stored booking stay the same instant
    c.svc.book(second, request(c.doctor, day(3), 9, 0, "Checkup")).unwrap();
    assert!(!c.svc.slots_for_date(c.doctor, day(3)).unwrap().contains(&at(9, 0)));
    let err = c.svc.book(first, request(c.doctor, day(3), 9, 0, "Checkup")).unwrap_err();
    assert!(matches!(err, CareError::SlotTaken { .. }));
}

#[test]
fn test_cancelled_slot_becomes_bookable_again() {
    let c = clinic(5);
    let first = patient(&c.svc);
    let second = patient(&c.svc);
    let booked = c.svc.book(first, request(c.doctor, day(4), 11, 0, "Rash")).unwrap();
    c.svc.patient_cancel(first, booked.id).unwrap();

    assert!(c.svc.slots_for_date(c.doctor, day(4)).unwrap().contains(&at(11, 0)));
    c.svc.book(second, request(c.doctor, day(4), 11, 0, "Rash")).unwrap();
}

#[test]
fn test_input_validation_comes_before_state() {
    let c = clinic(5);
    let pat = patient(&c.svc);

    let err = c.svc.book(pat, request(c.doctor, day(1), 10, 0, "Late")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = c.svc.book(pat, request(c.doctor, day(3), 10, 0, "   ")).unwrap_err();
    assert!(matches!(err, CareError::Validation { field: "reason", .. }));

    // today, but already past
    let err = c.svc.book(pat, request(c.doctor, day(2), 7, 30, "Early")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = c.svc.book(pat, request(c.doctor, day(3), 10, 10, "Odd time")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_terminal_states_never_move() {
    let c = clinic(5);
    let pat = patient(&c.svc);
    let booked = c.svc.book(pat, request(c.doctor, day(2), 9, 0, "Cough")).unwrap();
    c.svc.doctor_approve(c.doctor, booked.id).unwrap();

    c.svc.clock().advance(Duration::hours(2));
    let done = c.svc.doctor_complete(c.doctor, booked.id).unwrap();
    assert!(matches!(done, CompletionOutcome::Completed(_)));
    let again = c.svc.doctor_complete(c.doctor, booked.id).unwrap();
    assert!(matches!(again, CompletionOutcome::AlreadyCompleted(_)));

    for to in [AppointmentStatus::Pending, AppointmentStatus::Confirmed, AppointmentStatus::Cancelled] {
        let err = c
            .svc
            .hospital_override_status(c.manager, booked.id, to)
            .unwrap_err();
        assert!(matches!(err, CareError::InvalidTransition { .. }));
    }
    let err = c.svc.patient_cancel(pat, booked.id).unwrap_err();
    assert!(matches!(err, CareError::InvalidTransition { .. }));
    assert_eq!(
        c.svc.store().appointment(booked.id).unwrap().unwrap().status,
        AppointmentStatus::Completed
    );
}

#[test]
fn test_other_doctors_and_patients_see_not_found() {
    let c = clinic(5);
    let other_doctor = doctor(&c.svc, c.admin, c.manager, c.hospital.id);
    let owner = patient(&c.svc);
    let stranger = patient(&c.svc);
    let booked = c.svc.book(owner, request(c.doctor, day(3), 10, 0, "Checkup")).unwrap();

    assert!(matches!(
        c.svc.doctor_approve(other_doctor, booked.id),
        Err(CareError::NotFound(_))
    ));
    assert!(matches!(
        c.svc.patient_cancel(stranger, booked.id),
        Err(CareError::NotFound(_))
    ));
    assert!(matches!(
        c.svc.doctor_update_notes(other_doctor, booked.id, NotesUpdate::default()),
        Err(CareError::NotFound(_))
    ));
}

#[test]
fn test_listings_split_by_date() {
    let c = clinic(5);
    let pat = patient(&c.svc);
    let today = c.svc.book(pat, request(c.doctor, day(2), 15, 0, "Today")).unwrap();
    let later = c.svc.book(pat, request(c.doctor, day(5), 15, 0, "Later")).unwrap();

    let todays = c.svc.doctor_appointments(c.doctor, DoctorView::Today).unwrap();
    assert_eq!(todays.iter().map(|a| a.id).collect::<Vec<_>>(), vec![today.id]);

    let newest_first = c.svc.hospital_appointments(c.manager, HospitalView::All).unwrap();
    assert_eq!(newest_first[0].id, later.id);

    c.svc.clock().set(day(3).and_hms_opt(8, 0, 0).unwrap().and_utc());
    let past = c.svc.patient_past(pat).unwrap();
    assert_eq!(past.iter().map(|a| a.id).collect::<Vec<_>>(), vec![today.id]);
    let upcoming = c.svc.patient_upcoming(pat).unwrap();
    assert_eq!(upcoming.iter().map(|a| a.id).collect::<Vec<_>>(), vec![later.id]);
}
