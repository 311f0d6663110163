//! Shared setup for the integration tests.

#![allow(dead_code)]

use caregate::model::{Hospital, NewDoctor, NewHospital, Specialization};
use caregate::service::Registration;
use caregate::{CareService, FixedClock, MemoryStore};
use chrono::{Duration, NaiveDate, NaiveTime};
use fake::faker::address::en::StreetName;
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;
use rust_decimal::Decimal;
use uuid::Uuid;

pub type Service = CareService<MemoryStore, FixedClock>;

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

pub fn at(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// In-memory service with the clock at 2026-03-02 08:00 UTC.
pub fn service() -> Service {
    let _ = env_logger::builder().is_test(true).try_init();
    CareService::new(MemoryStore::new(), FixedClock::at(day(2), 8, 0))
}

fn unique_email() -> String {
    let email: String = SafeEmail().fake();
    format!("{}.{email}", Uuid::new_v4().simple())
}

fn name() -> String {
    Name().fake()
}

fn tick(svc: &Service) {
    svc.clock().advance(Duration::seconds(1));
}

pub fn admin(svc: &Service) -> Uuid {
    let id = svc.register(&unique_email(), &name(), Registration::Admin).unwrap().id;
    tick(svc);
    id
}

pub fn patient(svc: &Service) -> Uuid {
    let id = svc.register(&unique_email(), &name(), Registration::Patient).unwrap().id;
    tick(svc);
    id
}

pub fn doctor_details() -> NewDoctor {
    NewDoctor {
        specialization: Specialization::General,
        qualification: "MBBS".to_string(),
        license_number: format!("LIC-{}", (1000..9999).fake::<u32>()),
        verification_document: None,
    }
}

/// An approved hospital administrator and their hospital.
pub fn hospital(svc: &Service, admin: Uuid, beds: i32) -> (Uuid, Hospital) {
    let manager = svc
        .register(
            &unique_email(),
            &name(),
            Registration::HospitalAdmin(NewHospital {
                name: CompanyName().fake(),
                address: StreetName().fake(),
                phone: None,
                email: None,
                total_beds: beds,
            }),
        )
        .unwrap();
    svc.approve_identity(admin, manager.id).unwrap();
    tick(svc);
    let hospital = svc.managed_hospital(manager.id).unwrap();
    (manager.id, hospital)
}

/// An approved doctor with an active assignment at `hospital`.
pub fn doctor(svc: &Service, admin: Uuid, manager: Uuid, hospital: Uuid) -> Uuid {
    let doctor = svc
        .register(&unique_email(), &name(), Registration::Doctor(doctor_details()))
        .unwrap();
    svc.approve_identity(admin, doctor.id).unwrap();
    join(svc, doctor.id, manager, hospital);
    doctor.id
}

/// Request and approve an affiliation in one go.
pub fn join(svc: &Service, doctor: Uuid, manager: Uuid, hospital: Uuid) {
    let outcome = svc
        .request_affiliation(doctor, hospital, Decimal::new(250_000, 2))
        .unwrap();
    svc.approve_affiliation(manager, outcome.request().id).unwrap();
    tick(svc);
}

/// One administrator, one hospital, one doctor working there.
pub struct Clinic {
    pub svc: Service,
    pub admin: Uuid,
    pub manager: Uuid,
    pub hospital: Hospital,
    pub doctor: Uuid,
}

pub fn clinic(beds: i32) -> Clinic {
    let svc = service();
    let admin = admin(&svc);
    let (manager, hospital) = hospital(&svc, admin, beds);
    let doctor = doctor(&svc, admin, manager, hospital.id);
    Clinic {
        svc,
        admin,
        manager,
        hospital,
        doctor,
    }
}
