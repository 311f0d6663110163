//! PostgreSQL store.
//!
//! Plain SQL over any [`Executor`]. `PgStore<PgPool>` checks out one pooled
//! session per [`atomically`](CareStore::atomically) call, opens a
//! [`Transaction`](crate::transaction::Transaction) on it and hands the
//! closure a `PgStore` bound to that transaction. Concurrent callers never
//! share a session, so row locks taken inside the closure hold against them.
//!
//! Uniqueness is enforced by the schema (see [`crate::migration::schema`]);
//! violations are mapped back to domain errors by constraint name.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use may_postgres::types::{FromSql, ToSql};
use may_postgres::Row;
use std::str::FromStr;
use uuid::Uuid;

use super::{CareStore, Repository, StoreResult};
use crate::error::CareError;
use crate::executor::{DbError, Executor};
use crate::pool::PgPool;
use crate::model::{
    Admission, AffiliationRequest, Appointment, AppointmentQuery, Assignment, ChangeRequest,
    DoctorProfile, Hospital, HospitalReview, Identity, RequestStatus, Role, Schedule,
    UnknownVariant,
};

pub const ACTIVE_SLOT_CONSTRAINT: &str = "uq_appointments_active_slot";
const IDENTITY_EMAIL_CONSTRAINT: &str = "uq_identities_email";
const HOSPITAL_ADMIN_CONSTRAINT: &str = "uq_hospitals_admin";
const REQUEST_PAIR_CONSTRAINT: &str = "uq_affiliation_requests_pair";
const ASSIGNMENT_PAIR_CONSTRAINT: &str = "uq_assignments_pair";
const REVIEW_CONSTRAINT: &str = "uq_hospital_reviews_patient";

const IDENTITY_COLUMNS: &str = "id, role, email, display_name, active, approved, created_at";
const HOSPITAL_COLUMNS: &str =
    "id, admin_id, name, address, phone, email, total_beds, created_at";
const DOCTOR_COLUMNS: &str = "id, specialization, qualification, license_number, \
     verification_document, phone, bio, photo_ref, available_from, available_to, \
     slot_minutes, created_at";
const REQUEST_COLUMNS: &str =
    "id, doctor_id, hospital_id, compensation, status, created_at, updated_at";
const ASSIGNMENT_COLUMNS: &str = "id, doctor_id, hospital_id, compensation, active, created_at";
const APPOINTMENT_COLUMNS: &str = "id, patient_id, doctor_id, hospital_id, appointment_date, \
     appointment_time, status, reason, notes, prescription, is_emergency, created_at, updated_at";
const ADMISSION_COLUMNS: &str = "id, hospital_id, patient_id, doctor_id, appointment_id, \
     admission_time, expected_discharge, discharge_time, notes";
const CHANGE_COLUMNS: &str =
    "id, doctor_id, field, old_value, new_value, status, created_at, reviewed_at, reviewed_by";
const REVIEW_COLUMNS: &str = "id, hospital_id, patient_id, rating, comment, created_at";

pub struct PgStore<E> {
    executor: E,
}

impl<E: Executor> PgStore<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    fn fetch_opt<T>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        map: fn(&Row) -> Result<T, DbError>,
    ) -> StoreResult<Option<T>> {
        let row = self.executor.query_opt(sql, params)?;
        Ok(row.as_ref().map(map).transpose()?)
    }

    fn fetch_all<T>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        map: fn(&Row) -> Result<T, DbError>,
    ) -> StoreResult<Vec<T>> {
        let rows = self.executor.query_all(sql, params)?;
        Ok(rows.iter().map(map).collect::<Result<Vec<_>, _>>()?)
    }

    /// Executes a write that must touch a row, reporting `entity` as missing otherwise.
    fn update_one(&self, sql: &str, params: &[&dyn ToSql], entity: &'static str) -> StoreResult<()> {
        match self.executor.execute(sql, params)? {
            0 => Err(CareError::NotFound(entity)),
            _ => Ok(()),
        }
    }
}

fn column<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> Result<T, DbError> {
    row.try_get(name)
        .map_err(|e| DbError::ParseError(format!("column {name}: {e}")))
}

fn text_column<T: FromStr<Err = UnknownVariant>>(row: &Row, name: &str) -> Result<T, DbError> {
    let raw: String = column(row, name)?;
    raw.parse()
        .map_err(|e: UnknownVariant| DbError::ParseError(e.to_string()))
}

fn conflict_on(constraint: &'static str, err: DbError, mapped: impl FnOnce() -> CareError) -> CareError {
    if err.is_unique_violation(constraint) {
        mapped()
    } else {
        CareError::Storage(err)
    }
}

fn identity_from_row(row: &Row) -> Result<Identity, DbError> {
    Ok(Identity {
        id: column(row, "id")?,
        role: text_column::<Role>(row, "role")?,
        email: column(row, "email")?,
        display_name: column(row, "display_name")?,
        active: column(row, "active")?,
        approved: column(row, "approved")?,
        created_at: column(row, "created_at")?,
    })
}

fn hospital_from_row(row: &Row) -> Result<Hospital, DbError> {
    Ok(Hospital {
        id: column(row, "id")?,
        admin_id: column(row, "admin_id")?,
        name: column(row, "name")?,
        address: column(row, "address")?,
        phone: column(row, "phone")?,
        email: column(row, "email")?,
        total_beds: column(row, "total_beds")?,
        created_at: column(row, "created_at")?,
    })
}

fn doctor_from_row(row: &Row) -> Result<DoctorProfile, DbError> {
    let from: NaiveTime = column(row, "available_from")?;
    let to: NaiveTime = column(row, "available_to")?;
    let slot: i32 = column(row, "slot_minutes")?;
    let slot = u32::try_from(slot)
        .map_err(|_| DbError::ParseError(format!("negative slot_minutes {slot}")))?;
    let schedule =
        Schedule::new(from, to, slot).map_err(|e| DbError::ParseError(e.to_string()))?;

    Ok(DoctorProfile {
        id: column(row, "id")?,
        specialization: text_column(row, "specialization")?,
        qualification: column(row, "qualification")?,
        license_number: column(row, "license_number")?,
        verification_document: column(row, "verification_document")?,
        phone: column(row, "phone")?,
        bio: column(row, "bio")?,
        photo_ref: column(row, "photo_ref")?,
        schedule,
        created_at: column(row, "created_at")?,
    })
}

fn request_from_row(row: &Row) -> Result<AffiliationRequest, DbError> {
    Ok(AffiliationRequest {
        id: column(row, "id")?,
        doctor_id: column(row, "doctor_id")?,
        hospital_id: column(row, "hospital_id")?,
        compensation: column(row, "compensation")?,
        status: text_column(row, "status")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn assignment_from_row(row: &Row) -> Result<Assignment, DbError> {
    Ok(Assignment {
        id: column(row, "id")?,
        doctor_id: column(row, "doctor_id")?,
        hospital_id: column(row, "hospital_id")?,
        compensation: column(row, "compensation")?,
        active: column(row, "active")?,
        created_at: column(row, "created_at")?,
    })
}

fn appointment_from_row(row: &Row) -> Result<Appointment, DbError> {
    Ok(Appointment {
        id: column(row, "id")?,
        patient_id: column(row, "patient_id")?,
        doctor_id: column(row, "doctor_id")?,
        hospital_id: column(row, "hospital_id")?,
        date: column(row, "appointment_date")?,
        time: column(row, "appointment_time")?,
        status: text_column(row, "status")?,
        reason: column(row, "reason")?,
        notes: column(row, "notes")?,
        prescription: column(row, "prescription")?,
        emergency: column(row, "is_emergency")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn admission_from_row(row: &Row) -> Result<Admission, DbError> {
    Ok(Admission {
        id: column(row, "id")?,
        hospital_id: column(row, "hospital_id")?,
        patient_id: column(row, "patient_id")?,
        doctor_id: column(row, "doctor_id")?,
        appointment_id: column(row, "appointment_id")?,
        admission_time: column(row, "admission_time")?,
        expected_discharge: column(row, "expected_discharge")?,
        discharge_time: column(row, "discharge_time")?,
        notes: column(row, "notes")?,
    })
}

fn change_from_row(row: &Row) -> Result<ChangeRequest, DbError> {
    Ok(ChangeRequest {
        id: column(row, "id")?,
        doctor_id: column(row, "doctor_id")?,
        field: text_column(row, "field")?,
        old_value: column(row, "old_value")?,
        new_value: column(row, "new_value")?,
        status: text_column(row, "status")?,
        created_at: column(row, "created_at")?,
        reviewed_at: column(row, "reviewed_at")?,
        reviewed_by: column(row, "reviewed_by")?,
    })
}

fn review_from_row(row: &Row) -> Result<HospitalReview, DbError> {
    Ok(HospitalReview {
        id: column(row, "id")?,
        hospital_id: column(row, "hospital_id")?,
        patient_id: column(row, "patient_id")?,
        rating: column(row, "rating")?,
        comment: column(row, "comment")?,
        created_at: column(row, "created_at")?,
    })
}

/// Renders an [`AppointmentQuery`] as a WHERE clause plus its parameters.
fn appointment_filter(query: &AppointmentQuery) -> (String, Vec<Box<dyn ToSql>>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();
    let mut push = |clause: &str, param: Box<dyn ToSql>| {
        params.push(param);
        clauses.push(format!("{clause} ${}", params.len()));
    };

    if let Some(doctor) = query.doctor {
        push("doctor_id =", Box::new(doctor));
    }
    if let Some(patient) = query.patient {
        push("patient_id =", Box::new(patient));
    }
    if let Some(hospital) = query.hospital {
        push("hospital_id =", Box::new(hospital));
    }
    if let Some(on) = query.on {
        push("appointment_date =", Box::new(on));
    }
    if let Some(from) = query.from {
        push("appointment_date >=", Box::new(from));
    }
    if let Some(before) = query.before {
        push("appointment_date <", Box::new(before));
    }
    if let Some(statuses) = &query.statuses {
        let names: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        params.push(Box::new(names));
        clauses.push(format!("status = ANY(${})", params.len()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (where_sql, params)
}

impl<E: Executor> Repository for PgStore<E> {
    fn insert_identity(&self, i: &Identity) -> StoreResult<()> {
        self.executor
            .execute(
                "INSERT INTO identities (id, role, email, display_name, active, approved, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &i.id,
                    &i.role.as_str(),
                    &i.email,
                    &i.display_name,
                    &i.active,
                    &i.approved,
                    &i.created_at,
                ],
            )
            .map_err(|e| {
                conflict_on(IDENTITY_EMAIL_CONSTRAINT, e, || {
                    CareError::Conflict("email already registered".to_string())
                })
            })?;
        Ok(())
    }

    fn identity(&self, id: Uuid) -> StoreResult<Option<Identity>> {
        self.fetch_opt(
            &format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = $1"),
            &[&id],
            identity_from_row,
        )
    }

    fn identity_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        self.fetch_opt(
            &format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE email = $1"),
            &[&email],
            identity_from_row,
        )
    }

    fn identities_by_role(&self, role: Role) -> StoreResult<Vec<Identity>> {
        self.fetch_all(
            &format!(
                "SELECT {IDENTITY_COLUMNS} FROM identities WHERE role = $1 ORDER BY created_at"
            ),
            &[&role.as_str()],
            identity_from_row,
        )
    }

    fn update_identity(&self, i: &Identity) -> StoreResult<()> {
        self.update_one(
            "UPDATE identities SET display_name = $2, active = $3, approved = $4 WHERE id = $1",
            &[&i.id, &i.display_name, &i.active, &i.approved],
            "identity",
        )
    }

    fn delete_identity(&self, id: Uuid) -> StoreResult<()> {
        self.executor
            .execute("DELETE FROM identities WHERE id = $1", &[&id])?;
        Ok(())
    }

    fn insert_hospital(&self, h: &Hospital) -> StoreResult<()> {
        self.executor
            .execute(
                "INSERT INTO hospitals (id, admin_id, name, address, phone, email, total_beds, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                &[
                    &h.id,
                    &h.admin_id,
                    &h.name,
                    &h.address,
                    &h.phone,
                    &h.email,
                    &h.total_beds,
                    &h.created_at,
                ],
            )
            .map_err(|e| {
                conflict_on(HOSPITAL_ADMIN_CONSTRAINT, e, || {
                    CareError::Conflict("administrator already manages a hospital".to_string())
                })
            })?;
        Ok(())
    }

    fn hospital(&self, id: Uuid) -> StoreResult<Option<Hospital>> {
        self.fetch_opt(
            &format!("SELECT {HOSPITAL_COLUMNS} FROM hospitals WHERE id = $1"),
            &[&id],
            hospital_from_row,
        )
    }

    fn lock_hospital(&self, id: Uuid) -> StoreResult<Option<Hospital>> {
        self.fetch_opt(
            &format!("SELECT {HOSPITAL_COLUMNS} FROM hospitals WHERE id = $1 FOR UPDATE"),
            &[&id],
            hospital_from_row,
        )
    }

    fn hospital_by_admin(&self, admin: Uuid) -> StoreResult<Option<Hospital>> {
        self.fetch_opt(
            &format!("SELECT {HOSPITAL_COLUMNS} FROM hospitals WHERE admin_id = $1"),
            &[&admin],
            hospital_from_row,
        )
    }

    fn hospitals(&self) -> StoreResult<Vec<Hospital>> {
        self.fetch_all(
            &format!("SELECT {HOSPITAL_COLUMNS} FROM hospitals ORDER BY name"),
            &[],
            hospital_from_row,
        )
    }

    fn update_hospital(&self, h: &Hospital) -> StoreResult<()> {
        self.update_one(
            "UPDATE hospitals SET name = $2, address = $3, phone = $4, email = $5, total_beds = $6 \
             WHERE id = $1",
            &[&h.id, &h.name, &h.address, &h.phone, &h.email, &h.total_beds],
            "hospital",
        )
    }

    fn delete_hospital(&self, id: Uuid) -> StoreResult<()> {
        self.executor
            .execute("DELETE FROM hospitals WHERE id = $1", &[&id])?;
        Ok(())
    }

    fn insert_doctor(&self, d: &DoctorProfile) -> StoreResult<()> {
        let slot = d.schedule.slot_minutes() as i32;
        self.executor.execute(
            "INSERT INTO doctor_profiles (id, specialization, qualification, license_number, \
             verification_document, phone, bio, photo_ref, available_from, available_to, \
             slot_minutes, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            &[
                &d.id,
                &d.specialization.as_str(),
                &d.qualification,
                &d.license_number,
                &d.verification_document,
                &d.phone,
                &d.bio,
                &d.photo_ref,
                &d.schedule.from(),
                &d.schedule.to(),
                &slot,
                &d.created_at,
            ],
        )?;
        Ok(())
    }

    fn doctor(&self, id: Uuid) -> StoreResult<Option<DoctorProfile>> {
        self.fetch_opt(
            &format!("SELECT {DOCTOR_COLUMNS} FROM doctor_profiles WHERE id = $1"),
            &[&id],
            doctor_from_row,
        )
    }

    fn update_doctor(&self, d: &DoctorProfile) -> StoreResult<()> {
        let slot = d.schedule.slot_minutes() as i32;
        self.update_one(
            "UPDATE doctor_profiles SET specialization = $2, qualification = $3, \
             license_number = $4, verification_document = $5, phone = $6, bio = $7, \
             photo_ref = $8, available_from = $9, available_to = $10, slot_minutes = $11 \
             WHERE id = $1",
            &[
                &d.id,
                &d.specialization.as_str(),
                &d.qualification,
                &d.license_number,
                &d.verification_document,
                &d.phone,
                &d.bio,
                &d.photo_ref,
                &d.schedule.from(),
                &d.schedule.to(),
                &slot,
            ],
            "doctor",
        )
    }

    fn delete_doctor(&self, id: Uuid) -> StoreResult<()> {
        self.executor
            .execute("DELETE FROM doctor_profiles WHERE id = $1", &[&id])?;
        Ok(())
    }

    fn leave_dates(&self, doctor: Uuid) -> StoreResult<Vec<NaiveDate>> {
        let rows = self.executor.query_all(
            "SELECT leave_date FROM doctor_leaves WHERE doctor_id = $1 ORDER BY leave_date",
            &[&doctor],
        )?;
        Ok(rows
            .iter()
            .map(|r| column(r, "leave_date"))
            .collect::<Result<Vec<_>, _>>()?)
    }

    fn insert_leave(&self, doctor: Uuid, date: NaiveDate) -> StoreResult<bool> {
        let inserted = self.executor.execute(
            "INSERT INTO doctor_leaves (doctor_id, leave_date) VALUES ($1, $2) \
             ON CONFLICT (doctor_id, leave_date) DO NOTHING",
            &[&doctor, &date],
        )?;
        Ok(inserted > 0)
    }

    fn delete_leave(&self, doctor: Uuid, date: NaiveDate) -> StoreResult<bool> {
        let deleted = self.executor.execute(
            "DELETE FROM doctor_leaves WHERE doctor_id = $1 AND leave_date = $2",
            &[&doctor, &date],
        )?;
        Ok(deleted > 0)
    }

    fn insert_affiliation_request(&self, r: &AffiliationRequest) -> StoreResult<()> {
        self.executor
            .execute(
                "INSERT INTO affiliation_requests (id, doctor_id, hospital_id, compensation, status, \
                 created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &r.id,
                    &r.doctor_id,
                    &r.hospital_id,
                    &r.compensation,
                    &r.status.as_str(),
                    &r.created_at,
                    &r.updated_at,
                ],
            )
            .map_err(|e| {
                conflict_on(REQUEST_PAIR_CONSTRAINT, e, || {
                    CareError::Conflict("affiliation request already exists".to_string())
                })
            })?;
        Ok(())
    }

    fn affiliation_request(&self, id: Uuid) -> StoreResult<Option<AffiliationRequest>> {
        self.fetch_opt(
            &format!("SELECT {REQUEST_COLUMNS} FROM affiliation_requests WHERE id = $1"),
            &[&id],
            request_from_row,
        )
    }

    fn affiliation_request_for(
        &self,
        doctor: Uuid,
        hospital: Uuid,
    ) -> StoreResult<Option<AffiliationRequest>> {
        self.fetch_opt(
            &format!(
                "SELECT {REQUEST_COLUMNS} FROM affiliation_requests \
                 WHERE doctor_id = $1 AND hospital_id = $2"
            ),
            &[&doctor, &hospital],
            request_from_row,
        )
    }

    fn affiliation_requests_for_hospital(
        &self,
        hospital: Uuid,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<AffiliationRequest>> {
        let status = status.map(|s| s.as_str());
        self.fetch_all(
            &format!(
                "SELECT {REQUEST_COLUMNS} FROM affiliation_requests \
                 WHERE hospital_id = $1 AND ($2::TEXT IS NULL OR status = $2) ORDER BY created_at"
            ),
            &[&hospital, &status],
            request_from_row,
        )
    }

    fn update_affiliation_request(&self, r: &AffiliationRequest) -> StoreResult<()> {
        self.update_one(
            "UPDATE affiliation_requests SET compensation = $2, status = $3, updated_at = $4 \
             WHERE id = $1",
            &[&r.id, &r.compensation, &r.status.as_str(), &r.updated_at],
            "affiliation request",
        )
    }

    fn insert_assignment(&self, a: &Assignment) -> StoreResult<()> {
        self.executor
            .execute(
                "INSERT INTO assignments (id, doctor_id, hospital_id, compensation, active, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &a.id,
                    &a.doctor_id,
                    &a.hospital_id,
                    &a.compensation,
                    &a.active,
                    &a.created_at,
                ],
            )
            .map_err(|e| {
                conflict_on(ASSIGNMENT_PAIR_CONSTRAINT, e, || {
                    CareError::Conflict("assignment already exists".to_string())
                })
            })?;
        Ok(())
    }

    fn assignment(&self, doctor: Uuid, hospital: Uuid) -> StoreResult<Option<Assignment>> {
        self.fetch_opt(
            &format!(
                "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE doctor_id = $1 AND hospital_id = $2"
            ),
            &[&doctor, &hospital],
            assignment_from_row,
        )
    }

    fn assignments_for_doctor(&self, doctor: Uuid) -> StoreResult<Vec<Assignment>> {
        self.fetch_all(
            &format!(
                "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE doctor_id = $1 ORDER BY created_at"
            ),
            &[&doctor],
            assignment_from_row,
        )
    }

    fn assignments_for_hospital(&self, hospital: Uuid) -> StoreResult<Vec<Assignment>> {
        self.fetch_all(
            &format!(
                "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE hospital_id = $1 ORDER BY created_at"
            ),
            &[&hospital],
            assignment_from_row,
        )
    }

    fn update_assignment(&self, a: &Assignment) -> StoreResult<()> {
        self.update_one(
            "UPDATE assignments SET compensation = $2, active = $3 WHERE id = $1",
            &[&a.id, &a.compensation, &a.active],
            "assignment",
        )
    }

    fn insert_appointment(&self, a: &Appointment) -> StoreResult<()> {
        self.executor
            .execute(
                "INSERT INTO appointments (id, patient_id, doctor_id, hospital_id, appointment_date, \
                 appointment_time, status, reason, notes, prescription, is_emergency, created_at, \
                 updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
                &[
                    &a.id,
                    &a.patient_id,
                    &a.doctor_id,
                    &a.hospital_id,
                    &a.date,
                    &a.time,
                    &a.status.as_str(),
                    &a.reason,
                    &a.notes,
                    &a.prescription,
                    &a.emergency,
                    &a.created_at,
                    &a.updated_at,
                ],
            )
            .map_err(|e| {
                conflict_on(ACTIVE_SLOT_CONSTRAINT, e, || CareError::SlotTaken {
                    doctor: a.doctor_id,
                    date: a.date,
                    time: a.time,
                })
            })?;
        Ok(())
    }

    fn appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>> {
        self.fetch_opt(
            &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = $1"),
            &[&id],
            appointment_from_row,
        )
    }

    fn appointments(&self, query: &AppointmentQuery) -> StoreResult<Vec<Appointment>> {
        let (where_sql, params) = appointment_filter(query);
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        self.fetch_all(
            &format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments{where_sql} \
                 ORDER BY appointment_date, appointment_time, created_at"
            ),
            &refs,
            appointment_from_row,
        )
    }

    fn update_appointment(&self, a: &Appointment) -> StoreResult<()> {
        self.executor
            .execute(
                "UPDATE appointments SET hospital_id = $2, appointment_date = $3, \
                 appointment_time = $4, status = $5, reason = $6, notes = $7, prescription = $8, \
                 updated_at = $9 WHERE id = $1",
                &[
                    &a.id,
                    &a.hospital_id,
                    &a.date,
                    &a.time,
                    &a.status.as_str(),
                    &a.reason,
                    &a.notes,
                    &a.prescription,
                    &a.updated_at,
                ],
            )
            .map_err(|e| {
                conflict_on(ACTIVE_SLOT_CONSTRAINT, e, || CareError::SlotTaken {
                    doctor: a.doctor_id,
                    date: a.date,
                    time: a.time,
                })
            })
            .and_then(|n| match n {
                0 => Err(CareError::NotFound("appointment")),
                _ => Ok(()),
            })
    }

    fn insert_admission(&self, a: &Admission) -> StoreResult<()> {
        self.executor.execute(
            "INSERT INTO admissions (id, hospital_id, patient_id, doctor_id, appointment_id, \
             admission_time, expected_discharge, discharge_time, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            &[
                &a.id,
                &a.hospital_id,
                &a.patient_id,
                &a.doctor_id,
                &a.appointment_id,
                &a.admission_time,
                &a.expected_discharge,
                &a.discharge_time,
                &a.notes,
            ],
        )?;
        Ok(())
    }

    fn admission(&self, id: Uuid) -> StoreResult<Option<Admission>> {
        self.fetch_opt(
            &format!("SELECT {ADMISSION_COLUMNS} FROM admissions WHERE id = $1"),
            &[&id],
            admission_from_row,
        )
    }

    fn admission_for_appointment(&self, appointment: Uuid) -> StoreResult<Option<Admission>> {
        self.fetch_opt(
            &format!("SELECT {ADMISSION_COLUMNS} FROM admissions WHERE appointment_id = $1"),
            &[&appointment],
            admission_from_row,
        )
    }

    fn admissions_for_hospital(&self, hospital: Uuid) -> StoreResult<Vec<Admission>> {
        self.fetch_all(
            &format!(
                "SELECT {ADMISSION_COLUMNS} FROM admissions WHERE hospital_id = $1 \
                 ORDER BY admission_time"
            ),
            &[&hospital],
            admission_from_row,
        )
    }

    fn occupied_beds(&self, hospital: Uuid, at: DateTime<Utc>) -> StoreResult<i64> {
        let row = self.executor.query_one(
            "SELECT COUNT(*) AS occupied FROM admissions WHERE hospital_id = $1 \
             AND admission_time <= $2 AND (discharge_time IS NULL OR discharge_time > $2)",
            &[&hospital, &at],
        )?;
        Ok(column(&row, "occupied")?)
    }

    fn update_admission(&self, a: &Admission) -> StoreResult<()> {
        self.update_one(
            "UPDATE admissions SET doctor_id = $2, expected_discharge = $3, discharge_time = $4, \
             notes = $5 WHERE id = $1",
            &[
                &a.id,
                &a.doctor_id,
                &a.expected_discharge,
                &a.discharge_time,
                &a.notes,
            ],
            "admission",
        )
    }

    fn insert_change_request(&self, r: &ChangeRequest) -> StoreResult<()> {
        self.executor.execute(
            "INSERT INTO profile_change_requests (id, doctor_id, field, old_value, new_value, \
             status, created_at, reviewed_at, reviewed_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            &[
                &r.id,
                &r.doctor_id,
                &r.field.as_str(),
                &r.old_value,
                &r.new_value,
                &r.status.as_str(),
                &r.created_at,
                &r.reviewed_at,
                &r.reviewed_by,
            ],
        )?;
        Ok(())
    }

    fn change_request(&self, id: Uuid) -> StoreResult<Option<ChangeRequest>> {
        self.fetch_opt(
            &format!("SELECT {CHANGE_COLUMNS} FROM profile_change_requests WHERE id = $1"),
            &[&id],
            change_from_row,
        )
    }

    fn change_requests(
        &self,
        doctor: Option<Uuid>,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<ChangeRequest>> {
        let status = status.map(|s| s.as_str());
        self.fetch_all(
            &format!(
                "SELECT {CHANGE_COLUMNS} FROM profile_change_requests \
                 WHERE ($1::UUID IS NULL OR doctor_id = $1) AND ($2::TEXT IS NULL OR status = $2) \
                 ORDER BY created_at"
            ),
            &[&doctor, &status],
            change_from_row,
        )
    }

    fn update_change_request(&self, r: &ChangeRequest) -> StoreResult<()> {
        self.update_one(
            "UPDATE profile_change_requests SET status = $2, reviewed_at = $3, reviewed_by = $4 \
             WHERE id = $1",
            &[&r.id, &r.status.as_str(), &r.reviewed_at, &r.reviewed_by],
            "change request",
        )
    }

    fn insert_review(&self, r: &HospitalReview) -> StoreResult<()> {
        self.executor
            .execute(
                "INSERT INTO hospital_reviews (id, hospital_id, patient_id, rating, comment, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &r.id,
                    &r.hospital_id,
                    &r.patient_id,
                    &r.rating,
                    &r.comment,
                    &r.created_at,
                ],
            )
            .map_err(|e| conflict_on(REVIEW_CONSTRAINT, e, || CareError::AlreadyReviewed))?;
        Ok(())
    }

    fn reviews_for_hospital(&self, hospital: Uuid) -> StoreResult<Vec<HospitalReview>> {
        self.fetch_all(
            &format!(
                "SELECT {REVIEW_COLUMNS} FROM hospital_reviews WHERE hospital_id = $1 \
                 ORDER BY created_at DESC"
            ),
            &[&hospital],
            review_from_row,
        )
    }
}

impl CareStore for PgStore<PgPool> {
    fn atomically<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&dyn Repository) -> StoreResult<T>,
    {
        let session = self.executor.acquire().map_err(DbError::from)?;
        let tx = session.begin()?;
        let result = {
            let view = PgStore::new(&tx);
            f(&view)
        };
        match result {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback() {
                    log::error!("rollback failed after '{err}': {rollback}");
                    session.discard();
                }
                Err(err)
            }
        }
    }
}
