//! Bearer credentials for staff and OTP-verified applicants.

mod extract;
pub mod otp;
mod token;

pub use extract::{ApplicantUser, StaffUser};
pub use otp::{OtpError, OtpService, OTP_EXPIRY_MINUTES, OTP_MAX_ATTEMPTS, OTP_RESEND_COOLDOWN_SECS};
pub use token::{Claims, CredentialKind, TokenIssuer};

/// Authenticated staff member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffIdentity {
    pub email: String,
    pub name: String,
}

/// What an applicant credential may touch: one email and the enrollment ids
/// that belonged to it when the code was verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicantScope {
    pub email: String,
    pub name: String,
    pub enrollment_ids: Vec<String>,
}

impl ApplicantScope {
    pub fn covers(&self, enrollment_id: &str) -> bool {
        self.enrollment_ids.iter().any(|id| id == enrollment_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Staff(StaffIdentity),
    Applicant(ApplicantScope),
}

impl Credential {
    /// Identity written into changelog and upload metadata.
    pub fn actor(&self) -> &str {
        match self {
            Credential::Staff(staff) => &staff.email,
            Credential::Applicant(scope) => &scope.email,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("token has expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("token could not be issued: {0}")]
    Signing(String),
}
