//! Admissions and the bed count derived from them.
//!
//! No bed counter is stored anywhere. A bed is occupied by an admission over
//! `[admission_time, discharge_time)`, an open discharge meaning still
//! occupied, and every count is recomputed from the admission rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    pub id: Uuid,
    pub hospital_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub admission_time: DateTime<Utc>,
    pub expected_discharge: Option<DateTime<Utc>>,
    pub discharge_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl Admission {
    pub fn new(hospital_id: Uuid, patient_id: Uuid, admission_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            hospital_id,
            patient_id,
            doctor_id: None,
            appointment_id: None,
            admission_time,
            expected_discharge: None,
            discharge_time: None,
            notes: None,
        }
    }

    pub fn occupies(&self, at: DateTime<Utc>) -> bool {
        self.admission_time <= at && self.discharge_time.map_or(true, |d| d > at)
    }
}

pub fn occupied_count<'a>(
    admissions: impl IntoIterator<Item = &'a Admission>,
    hospital: Uuid,
    at: DateTime<Utc>,
) -> i64 {
    admissions
        .into_iter()
        .filter(|a| a.hospital_id == hospital && a.occupies(at))
        .count() as i64
}

pub fn available_count(total_beds: i32, occupied: i64) -> i64 {
    (i64::from(total_beds) - occupied).max(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedSummary {
    pub total: i64,
    pub occupied: i64,
    pub available: i64,
}

impl BedSummary {
    pub fn new(total_beds: i32, occupied: i64) -> Self {
        Self {
            total: i64::from(total_beds),
            occupied,
            available: available_count(total_beds, occupied),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, h, 0, 0).unwrap()
    }

    #[test]
    fn test_occupancy_interval_is_half_open() {
        let mut adm = Admission::new(Uuid::new_v4(), Uuid::new_v4(), at(10));
        assert!(!adm.occupies(at(9)));
        assert!(adm.occupies(at(10)));
        assert!(adm.occupies(at(23)));

        adm.discharge_time = Some(at(12));
        assert!(adm.occupies(at(11)));
        assert!(!adm.occupies(at(12)));
    }

    #[test]
    fn test_counts_only_this_hospital() {
        let hospital = Uuid::new_v4();
        let rows = vec![
            Admission::new(hospital, Uuid::new_v4(), at(8)),
            Admission::new(hospital, Uuid::new_v4(), at(8) + Duration::hours(5)),
            Admission::new(Uuid::new_v4(), Uuid::new_v4(), at(8)),
        ];
        assert_eq!(occupied_count(&rows, hospital, at(9)), 1);
        assert_eq!(occupied_count(&rows, hospital, at(14)), 2);
    }

    #[test]
    fn test_available_count_clamps_at_zero() {
        assert_eq!(available_count(5, 4), 1);
        assert_eq!(available_count(5, 5), 0);
        assert_eq!(available_count(2, 3), 0);
        let summary = BedSummary::new(5, 2);
        assert_eq!((summary.total, summary.occupied, summary.available), (5, 2, 3));
    }
}
