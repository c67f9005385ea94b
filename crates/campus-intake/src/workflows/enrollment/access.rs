//! Ownership checks for applicant credentials.
//!
//! Staff credentials see every enrollment. Applicant credentials are bound to
//! the ids and email captured at OTP verification, and both must still hold
//! when the record is read.

use serde_json::{Map, Value};

use super::documents::SlotSource;
use super::domain::{normalize_email, ApplicantProfile, EnrollmentId, EnrollmentRecord};
use super::status::EnrollmentStatus;
use crate::auth::ApplicantScope;

/// Fields no applicant credential may write.
pub const PROTECTED_FIELDS: [&str; 5] =
    ["status", "documents", "email", "course", "certificate_issued"];

/// Bookkeeping fields maintained by the workflow itself.
pub const SYSTEM_FIELDS: [&str; 9] = [
    "id",
    "previous_status",
    "batch_id",
    "batch_start_date",
    "emails_sent",
    "changelog",
    "created_at",
    "updated_at",
    "role",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("You do not have access to this enrollment.")]
    OutOfScope,
    #[error("This enrollment no longer belongs to the verified email.")]
    EmailMismatch,
    #[error("Field '{0}' cannot be changed by the applicant.")]
    ProtectedField(String),
    #[error("Unknown field '{0}'.")]
    UnknownField(String),
    #[error("Details can no longer be edited once the application is {0}.")]
    NotEditable(EnrollmentStatus),
    #[error("Only applicant copies can be uploaded from the applicant portal.")]
    OfficialSlot,
    #[error("Documents can no longer be changed once the application is {0}.")]
    UploadsClosed(EnrollmentStatus),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AccessGuard;

impl AccessGuard {
    /// Checked before the record is fetched so unknown ids outside the scope
    /// are indistinguishable from foreign ones.
    pub fn check_scope(&self, scope: &ApplicantScope, id: &EnrollmentId) -> Result<(), AccessError> {
        if scope.covers(id.as_str()) {
            Ok(())
        } else {
            Err(AccessError::OutOfScope)
        }
    }

    pub fn check_owner(
        &self,
        scope: &ApplicantScope,
        record: &EnrollmentRecord,
    ) -> Result<(), AccessError> {
        if normalize_email(&record.email) == normalize_email(&scope.email) {
            Ok(())
        } else {
            Err(AccessError::EmailMismatch)
        }
    }

    /// Validate an applicant edit: only profile fields, only while editable.
    pub fn check_applicant_edit(
        &self,
        record: &EnrollmentRecord,
        fields: &Map<String, Value>,
    ) -> Result<(), AccessError> {
        let allowed = ApplicantProfile::field_names();
        for field in fields.keys() {
            if PROTECTED_FIELDS.contains(&field.as_str()) || SYSTEM_FIELDS.contains(&field.as_str())
            {
                return Err(AccessError::ProtectedField(field.clone()));
            }
            if !allowed.iter().any(|name| name == field) {
                return Err(AccessError::UnknownField(field.clone()));
            }
        }

        if !record.status.is_applicant_editable() {
            return Err(AccessError::NotEditable(record.status));
        }
        Ok(())
    }

    pub fn check_applicant_upload(
        &self,
        record: &EnrollmentRecord,
        source: SlotSource,
    ) -> Result<(), AccessError> {
        if source != SlotSource::Applicant {
            return Err(AccessError::OfficialSlot);
        }
        if !record.status.is_auto() {
            return Err(AccessError::UploadsClosed(record.status));
        }
        Ok(())
    }
}
