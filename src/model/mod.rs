//! Domain records.
//!
//! Plain data plus the pure rules that belong to a single record type: the
//! appointment transition table, bed occupancy of an admission, schedule
//! validation. Persistence lives in [`crate::store`].

pub mod admission;
pub mod affiliation;
pub mod appointment;
pub mod change_request;
pub mod doctor;
pub mod hospital;
pub mod identity;
pub mod review;

pub use admission::{available_count, occupied_count, Admission, BedSummary};
pub use affiliation::{AffiliationRequest, Assignment};
pub use appointment::{Appointment, AppointmentQuery, AppointmentStatus};
pub use change_request::{ChangeRequest, ContactUpdate, ProfileChanges, ProfileField};
pub use doctor::{DoctorProfile, NewDoctor, Schedule, Specialization};
pub use hospital::{Hospital, NewHospital};
pub use identity::{Identity, Role};
pub use review::{HospitalReview, RatingSummary};

use std::fmt;

/// A stored text value that does not name any variant of `kind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Declares a fieldless enum stored as upper-case text.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident as $kind:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::model::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::model::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use text_enum;

text_enum! {
    /// Review state shared by affiliation requests and profile change requests.
    pub enum RequestStatus as "request status" {
        Pending => "PENDING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_status_text_round_trip() {
        for status in RequestStatus::ALL {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), *status);
        }
        let err = "MAYBE".parse::<RequestStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown request status 'MAYBE'");
    }
}
