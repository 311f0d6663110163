//! Composable access checks.
//!
//! A guard is an ordered list of [`Check`]s. [`authorize`] evaluates them in
//! order and stops at the first denial, so the reported reason is always the
//! most basic one (a blocked doctor hears "account blocked", not "pending
//! approval").

use crate::error::CareError;
use crate::model::{Identity, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// The account has not been blocked.
    Active,
    /// The account passed admin approval (always true for roles without it).
    Approved,
    /// The account holds one of these roles.
    Role(&'static [Role]),
}

impl Check {
    pub fn evaluate(&self, actor: &Identity) -> Result<(), String> {
        match self {
            Check::Active if !actor.active => Err("account blocked".to_string()),
            Check::Approved if !actor.approved => Err("pending approval".to_string()),
            Check::Role(roles) if !roles.contains(&actor.role) => Err(format!(
                "requires role {}",
                roles
                    .iter()
                    .map(|r| r.as_str())
                    .collect::<Vec<_>>()
                    .join(" or ")
            )),
            _ => Ok(()),
        }
    }
}

pub const PATIENT: &[Check] = &[Check::Active, Check::Role(&[Role::Patient])];
pub const DOCTOR: &[Check] = &[Check::Active, Check::Role(&[Role::Doctor]), Check::Approved];
pub const HOSPITAL_ADMIN: &[Check] = &[
    Check::Active,
    Check::Role(&[Role::HospitalAdmin]),
    Check::Approved,
];
pub const ADMIN: &[Check] = &[Check::Active, Check::Role(&[Role::Admin])];
/// Login: blocked first, then approval.
pub const SIGN_IN: &[Check] = &[Check::Active, Check::Approved];

pub fn authorize(actor: &Identity, checks: &[Check]) -> Result<(), CareError> {
    for check in checks {
        if let Err(reason) = check.evaluate(actor) {
            log::warn!("denied {} {}: {reason}", actor.role, actor.id);
            return Err(CareError::PermissionDenied(reason));
        }
    }
    Ok(())
}
