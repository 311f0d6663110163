//! Domain error type.
//!
//! [`CareError`] separates malformed input ([`ErrorKind::Validation`]) from
//! well-formed requests the current state forbids ([`ErrorKind::Conflict`]).
//! Ownership failures are reported as [`CareError::NotFound`] so that an
//! unauthorized actor cannot confirm a record exists.

use crate::executor::DbError;
use crate::model::AppointmentStatus;
use crate::transaction::TransactionError;
use chrono::{NaiveDate, NaiveTime};
use std::fmt;
use uuid::Uuid;

#[derive(Debug)]
pub enum CareError {
    /// Malformed or missing input for `field`.
    Validation { field: &'static str, reason: String },
    /// The doctor already has an active booking at this date and time.
    SlotTaken {
        doctor: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    },
    NoBedsAvailable { hospital: Uuid },
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    AlreadyReviewed,
    Conflict(String),
    PermissionDenied(String),
    NotFound(&'static str),
    Storage(DbError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Authorization,
    NotFound,
    Storage,
}

impl CareError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        CareError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CareError::Validation { .. } => ErrorKind::Validation,
            CareError::SlotTaken { .. }
            | CareError::NoBedsAvailable { .. }
            | CareError::InvalidTransition { .. }
            | CareError::AlreadyReviewed
            | CareError::Conflict(_) => ErrorKind::Conflict,
            CareError::PermissionDenied(_) => ErrorKind::Authorization,
            CareError::NotFound(_) => ErrorKind::NotFound,
            CareError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl fmt::Display for CareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CareError::Validation { field, reason } => write!(f, "invalid {field}: {reason}"),
            CareError::SlotTaken { date, time, .. } => write!(
                f,
                "time slot {} at {} is already booked",
                date,
                time.format("%H:%M")
            ),
            CareError::NoBedsAvailable { .. } => write!(f, "no beds available"),
            CareError::InvalidTransition { from, to } => write!(
                f,
                "cannot move appointment from {} to {}",
                from.as_str(),
                to.as_str()
            ),
            CareError::AlreadyReviewed => write!(f, "already reviewed"),
            CareError::Conflict(reason) => write!(f, "{reason}"),
            CareError::PermissionDenied(reason) => write!(f, "permission denied: {reason}"),
            CareError::NotFound(entity) => write!(f, "{entity} not found"),
            CareError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for CareError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CareError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DbError> for CareError {
    fn from(err: DbError) -> Self {
        CareError::Storage(err)
    }
}

impl From<TransactionError> for CareError {
    fn from(err: TransactionError) -> Self {
        CareError::Storage(err.into())
    }
}
