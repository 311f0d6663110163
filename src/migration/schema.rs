//! Built-in schema migrations.
//!
//! Tables are plain DDL; secondary indexes go through sea-query. The partial
//! unique index `uq_appointments_active_slot` is what keeps two concurrent
//! bookings out of the same doctor slot, and the store maps its violation to
//! `CareError::SlotTaken`.

use sea_query::{Index, PostgresQueryBuilder};

use crate::migration::calculate_checksum;

#[derive(Debug, Clone, Copy)]
pub struct SchemaMigration {
    /// Migration version (timestamp: YYYYMMDDHHMMSS)
    pub version: i64,
    pub name: &'static str,
    up: fn() -> Vec<String>,
    down: fn() -> Vec<String>,
}

impl SchemaMigration {
    pub const fn new(
        version: i64,
        name: &'static str,
        up: fn() -> Vec<String>,
        down: fn() -> Vec<String>,
    ) -> Self {
        Self {
            version,
            name,
            up,
            down,
        }
    }

    pub fn up_statements(&self) -> Vec<String> {
        (self.up)()
    }

    pub fn down_statements(&self) -> Vec<String> {
        (self.down)()
    }

    pub fn checksum(&self) -> String {
        calculate_checksum(&self.up_statements())
    }
}

/// All built-in migrations, oldest first.
pub fn migrations() -> Vec<SchemaMigration> {
    vec![
        SchemaMigration::new(
            20250601090000,
            "create_identities_and_hospitals",
            identities_and_hospitals_up,
            identities_and_hospitals_down,
        ),
        SchemaMigration::new(
            20250601090100,
            "create_doctor_profiles",
            doctor_profiles_up,
            doctor_profiles_down,
        ),
        SchemaMigration::new(
            20250601090200,
            "create_affiliations",
            affiliations_up,
            affiliations_down,
        ),
        SchemaMigration::new(
            20250601090300,
            "create_appointments_and_admissions",
            appointments_up,
            appointments_down,
        ),
        SchemaMigration::new(
            20250601090400,
            "create_change_requests_and_reviews",
            requests_and_reviews_up,
            requests_and_reviews_down,
        ),
    ]
}

fn index(name: &'static str, table: &'static str, columns: &[&'static str]) -> String {
    let mut statement = Index::create();
    statement.if_not_exists().name(name).table(table);
    for column in columns {
        statement.col(*column);
    }
    statement.build(PostgresQueryBuilder)
}

fn unique_index(name: &'static str, table: &'static str, columns: &[&'static str]) -> String {
    let mut statement = Index::create();
    statement.if_not_exists().unique().name(name).table(table);
    for column in columns {
        statement.col(*column);
    }
    statement.build(PostgresQueryBuilder)
}

fn drop_tables(tables: &[&str]) -> Vec<String> {
    tables
        .iter()
        .map(|t| format!("DROP TABLE IF EXISTS {t} CASCADE"))
        .collect()
}

fn identities_and_hospitals_up() -> Vec<String> {
    vec![
        r#"
        CREATE TABLE IF NOT EXISTS identities (
            id UUID PRIMARY KEY,
            role VARCHAR(20) NOT NULL
                CHECK (role IN ('ADMIN', 'DOCTOR', 'PATIENT', 'HOSPITAL_ADMIN')),
            email VARCHAR(255) NOT NULL,
            display_name VARCHAR(255) NOT NULL,
            active BOOLEAN NOT NULL DEFAULT true,
            approved BOOLEAN NOT NULL DEFAULT false,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#
        .to_string(),
        unique_index("uq_identities_email", "identities", &["email"]),
        index("idx_identities_role", "identities", &["role"]),
        r#"
        CREATE TABLE IF NOT EXISTS hospitals (
            id UUID PRIMARY KEY,
            admin_id UUID NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
            name VARCHAR(255) NOT NULL,
            address TEXT NOT NULL,
            phone VARCHAR(50),
            email VARCHAR(255),
            total_beds INTEGER NOT NULL DEFAULT 0 CHECK (total_beds >= 0),
            created_at TIMESTAMPTZ NOT NULL
        )
        "#
        .to_string(),
        unique_index("uq_hospitals_admin", "hospitals", &["admin_id"]),
        index("idx_hospitals_name", "hospitals", &["name"]),
    ]
}

fn identities_and_hospitals_down() -> Vec<String> {
    drop_tables(&["hospitals", "identities"])
}

fn doctor_profiles_up() -> Vec<String> {
    vec![
        r#"
        CREATE TABLE IF NOT EXISTS doctor_profiles (
            id UUID PRIMARY KEY REFERENCES identities(id) ON DELETE CASCADE,
            specialization VARCHAR(40) NOT NULL,
            qualification VARCHAR(255) NOT NULL,
            license_number VARCHAR(100) NOT NULL,
            verification_document TEXT,
            phone VARCHAR(50),
            bio TEXT,
            photo_ref TEXT,
            available_from TIME NOT NULL,
            available_to TIME NOT NULL,
            slot_minutes INTEGER NOT NULL CHECK (slot_minutes > 0),
            created_at TIMESTAMPTZ NOT NULL,
            CHECK (available_from < available_to)
        )
        "#
        .to_string(),
        r#"
        CREATE TABLE IF NOT EXISTS doctor_leaves (
            doctor_id UUID NOT NULL REFERENCES doctor_profiles(id) ON DELETE CASCADE,
            leave_date DATE NOT NULL,
            PRIMARY KEY (doctor_id, leave_date)
        )
        "#
        .to_string(),
    ]
}

fn doctor_profiles_down() -> Vec<String> {
    drop_tables(&["doctor_leaves", "doctor_profiles"])
}

fn affiliations_up() -> Vec<String> {
    vec![
        r#"
        CREATE TABLE IF NOT EXISTS affiliation_requests (
            id UUID PRIMARY KEY,
            doctor_id UUID NOT NULL REFERENCES doctor_profiles(id) ON DELETE CASCADE,
            hospital_id UUID NOT NULL REFERENCES hospitals(id) ON DELETE CASCADE,
            compensation NUMERIC(12, 2) NOT NULL CHECK (compensation >= 0),
            status VARCHAR(20) NOT NULL CHECK (status IN ('PENDING', 'APPROVED', 'REJECTED')),
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#
        .to_string(),
        unique_index(
            "uq_affiliation_requests_pair",
            "affiliation_requests",
            &["doctor_id", "hospital_id"],
        ),
        index(
            "idx_affiliation_requests_hospital_status",
            "affiliation_requests",
            &["hospital_id", "status"],
        ),
        r#"
        CREATE TABLE IF NOT EXISTS assignments (
            id UUID PRIMARY KEY,
            doctor_id UUID NOT NULL REFERENCES doctor_profiles(id) ON DELETE CASCADE,
            hospital_id UUID NOT NULL REFERENCES hospitals(id) ON DELETE CASCADE,
            compensation NUMERIC(12, 2) NOT NULL CHECK (compensation >= 0),
            active BOOLEAN NOT NULL DEFAULT true,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#
        .to_string(),
        unique_index("uq_assignments_pair", "assignments", &["doctor_id", "hospital_id"]),
        index("idx_assignments_hospital", "assignments", &["hospital_id"]),
    ]
}

fn affiliations_down() -> Vec<String> {
    drop_tables(&["assignments", "affiliation_requests"])
}

fn appointments_up() -> Vec<String> {
    vec![
        r#"
        CREATE TABLE IF NOT EXISTS appointments (
            id UUID PRIMARY KEY,
            patient_id UUID NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
            doctor_id UUID NOT NULL REFERENCES doctor_profiles(id) ON DELETE CASCADE,
            hospital_id UUID REFERENCES hospitals(id) ON DELETE SET NULL,
            appointment_date DATE NOT NULL,
            appointment_time TIME NOT NULL,
            status VARCHAR(20) NOT NULL
                CHECK (status IN ('PENDING', 'CONFIRMED', 'COMPLETED', 'CANCELLED', 'RESCHEDULED')),
            reason TEXT NOT NULL,
            notes TEXT,
            prescription TEXT,
            is_emergency BOOLEAN NOT NULL DEFAULT false,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#
        .to_string(),
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS uq_appointments_active_slot
            ON appointments (doctor_id, appointment_date, appointment_time)
            WHERE status IN ('PENDING', 'CONFIRMED')
        "#
        .to_string(),
        index("idx_appointments_patient", "appointments", &["patient_id"]),
        index(
            "idx_appointments_hospital_date",
            "appointments",
            &["hospital_id", "appointment_date"],
        ),
        r#"
        CREATE TABLE IF NOT EXISTS admissions (
            id UUID PRIMARY KEY,
            hospital_id UUID NOT NULL REFERENCES hospitals(id) ON DELETE CASCADE,
            patient_id UUID NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
            doctor_id UUID REFERENCES doctor_profiles(id) ON DELETE SET NULL,
            appointment_id UUID REFERENCES appointments(id) ON DELETE SET NULL,
            admission_time TIMESTAMPTZ NOT NULL,
            expected_discharge TIMESTAMPTZ,
            discharge_time TIMESTAMPTZ,
            notes TEXT,
            CHECK (discharge_time IS NULL OR discharge_time >= admission_time)
        )
        "#
        .to_string(),
        index(
            "idx_admissions_hospital_window",
            "admissions",
            &["hospital_id", "admission_time", "discharge_time"],
        ),
        index("idx_admissions_appointment", "admissions", &["appointment_id"]),
    ]
}

fn appointments_down() -> Vec<String> {
    drop_tables(&["admissions", "appointments"])
}

fn requests_and_reviews_up() -> Vec<String> {
    vec![
        r#"
        CREATE TABLE IF NOT EXISTS profile_change_requests (
            id UUID PRIMARY KEY,
            doctor_id UUID NOT NULL REFERENCES doctor_profiles(id) ON DELETE CASCADE,
            field VARCHAR(40) NOT NULL,
            old_value TEXT,
            new_value TEXT NOT NULL,
            status VARCHAR(20) NOT NULL CHECK (status IN ('PENDING', 'APPROVED', 'REJECTED')),
            created_at TIMESTAMPTZ NOT NULL,
            reviewed_at TIMESTAMPTZ,
            reviewed_by UUID REFERENCES identities(id) ON DELETE SET NULL
        )
        "#
        .to_string(),
        index(
            "idx_profile_change_requests_status",
            "profile_change_requests",
            &["status", "created_at"],
        ),
        r#"
        CREATE TABLE IF NOT EXISTS hospital_reviews (
            id UUID PRIMARY KEY,
            hospital_id UUID NOT NULL REFERENCES hospitals(id) ON DELETE CASCADE,
            patient_id UUID NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
            rating SMALLINT NOT NULL CHECK (rating BETWEEN 1 AND 5),
            comment TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#
        .to_string(),
        unique_index(
            "uq_hospital_reviews_patient",
            "hospital_reviews",
            &["hospital_id", "patient_id"],
        ),
    ]
}

fn requests_and_reviews_down() -> Vec<String> {
    drop_tables(&["hospital_reviews", "profile_change_requests"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_versions_are_unique_and_ascending() {
        let all = migrations();
        assert!(all.windows(2).all(|w| w[0].version < w[1].version));
        let names: HashSet<_> = all.iter().map(|m| m.name).collect();
        assert_eq!(names.len(), all.len());
    }

    #[test]
    fn test_checksums_are_deterministic() {
        for migration in migrations() {
            assert_eq!(migration.checksum(), migration.checksum());
        }
    }

    #[test]
    fn test_active_slot_index_is_partial_and_unique() {
        let sql = appointments_up().join("\n");
        assert!(sql.contains("CREATE UNIQUE INDEX IF NOT EXISTS uq_appointments_active_slot"));
        assert!(sql.contains("WHERE status IN ('PENDING', 'CONFIRMED')"));
    }

    #[test]
    fn test_unique_indexes_carry_constraint_names() {
        let sql: String = migrations()
            .iter()
            .flat_map(|m| m.up_statements())
            .collect::<Vec<_>>()
            .join("\n");
        for name in [
            "uq_identities_email",
            "uq_hospitals_admin",
            "uq_affiliation_requests_pair",
            "uq_assignments_pair",
            "uq_hospital_reviews_patient",
        ] {
            assert!(sql.contains(name), "missing {name}");
        }
    }

    #[test]
    fn test_down_drops_what_up_creates() {
        for migration in migrations() {
            let up = migration.up_statements().join("\n");
            for drop in migration.down_statements() {
                let table = drop
                    .trim_start_matches("DROP TABLE IF EXISTS ")
                    .trim_end_matches(" CASCADE");
                assert!(up.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")));
            }
        }
    }
}
