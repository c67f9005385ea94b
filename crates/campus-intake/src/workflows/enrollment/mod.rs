//! Enrollment lifecycle: the status engine, document slots, applicant access,
//! the audit trail, and the HTTP surface over them.

pub mod access;
pub mod applicant;
pub mod changelog;
pub mod documents;
pub mod domain;
mod locks;
pub mod notify;
pub mod repository;
pub mod router;
pub mod service;
pub mod status;

#[cfg(test)]
pub(crate) mod tests;

pub use access::{AccessError, AccessGuard, PROTECTED_FIELDS, SYSTEM_FIELDS};
pub use applicant::{ApplicantApplication, ApplicantEnrollmentView, OtpVerification, StudentClass};
pub use changelog::{ChangeRecorder, ChangelogEntry};
pub use documents::{
    applicant_folder, blob_path, DocumentEntry, DocumentError, DocumentKind, DocumentSet,
    ReviewDecision, ReviewState, Slot, SlotSource,
};
pub use domain::{
    is_plausible_email, normalize_email, Address, ApplicantProfile, EnrollmentId,
    EnrollmentRecord, EnrollmentSubmission, UserRecord, UserRole,
};
pub use locks::WriterLocks;
pub use notify::Notifier;
pub use repository::{EnrollmentFilter, EnrollmentRepository, EnrollmentUpdate, UserRepository};
pub use router::enrollment_router;
pub use service::{DocumentView, EnrollmentService, EnrollmentSettings, SlotView, UploadedFile};
pub(crate) use service::sign_slot;
pub use status::{derive_target, recompute, EnrollmentStatus, StatusDecision, UnknownStatus};
