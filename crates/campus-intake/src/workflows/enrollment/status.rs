//! Lifecycle status and the auto-advance rules derived from document review.
//!
//! [`recompute`] is a pure function of the current status and the document
//! set. Callers decide whether to persist what it returns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::documents::{DocumentKind, DocumentSet, ReviewState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    /// Legacy intake status kept for records created before document upload existed.
    Pending,
    PendingUpload,
    PendingReview,
    DocumentsRejected,
    InWaitlist,
    PhysicalDocsRequired,
    Completed,
    Archived,
}

impl EnrollmentStatus {
    pub const ALL: [Self; 8] = [
        Self::Pending,
        Self::PendingUpload,
        Self::PendingReview,
        Self::DocumentsRejected,
        Self::InWaitlist,
        Self::PhysicalDocsRequired,
        Self::Completed,
        Self::Archived,
    ];

    /// Statuses the recompute step may overwrite.
    pub const AUTO: [Self; 4] = [
        Self::Pending,
        Self::PendingUpload,
        Self::PendingReview,
        Self::DocumentsRejected,
    ];

    /// Statuses reachable only through an explicit action.
    pub const MANUAL_OVERRIDE: [Self; 3] =
        [Self::PhysicalDocsRequired, Self::Completed, Self::Archived];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PendingUpload => "pending_upload",
            Self::PendingReview => "pending_review",
            Self::DocumentsRejected => "documents_rejected",
            Self::InWaitlist => "in_waitlist",
            Self::PhysicalDocsRequired => "physical_docs_required",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }

    /// Human readable label used in applicant-facing mail.
    pub const fn display_label(self) -> &'static str {
        match self {
            Self::Pending | Self::PendingUpload => "Pending Document Upload",
            Self::PendingReview => "Documents Under Review",
            Self::DocumentsRejected => "Documents Need Attention",
            Self::InWaitlist => "In Waitlist",
            Self::PhysicalDocsRequired => "Physical Documents Required",
            Self::Completed => "Enrolled",
            Self::Archived => "Archived",
        }
    }

    pub const fn is_auto(self) -> bool {
        matches!(
            self,
            Self::Pending | Self::PendingUpload | Self::PendingReview | Self::DocumentsRejected
        )
    }

    pub const fn is_manual_override(self) -> bool {
        matches!(
            self,
            Self::PhysicalDocsRequired | Self::Completed | Self::Archived
        )
    }

    /// Applicants may edit their own details only before any upload has landed.
    pub const fn is_applicant_editable(self) -> bool {
        matches!(self, Self::Pending | Self::PendingUpload)
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown enrollment status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for EnrollmentStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.label() == normalized)
            .ok_or_else(|| UnknownStatus(value.to_string()))
    }
}

/// Outcome of re-deriving the status from the document set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusDecision {
    /// The derived status matches the stored one.
    Unchanged,
    /// The stored status is outside the auto subset and must not be touched.
    Frozen,
    Advance {
        from: EnrollmentStatus,
        to: EnrollmentStatus,
    },
}

impl StatusDecision {
    pub fn target(self) -> Option<EnrollmentStatus> {
        match self {
            StatusDecision::Advance { to, .. } => Some(to),
            StatusDecision::Unchanged | StatusDecision::Frozen => None,
        }
    }
}

/// Status implied by the review state of every required document.
pub fn derive_target(documents: &DocumentSet, required: &[DocumentKind]) -> EnrollmentStatus {
    let entries: Vec<_> = required.iter().map(|kind| documents.get(*kind)).collect();

    let all_have_files = entries
        .iter()
        .all(|entry| entry.is_some_and(|entry| entry.has_file()));
    if !all_have_files {
        return EnrollmentStatus::PendingUpload;
    }

    let review_states = entries.iter().flatten().map(|entry| &entry.review);
    let mut all_accepted = true;
    for review in review_states {
        match review {
            ReviewState::Rejected { .. } => return EnrollmentStatus::DocumentsRejected,
            ReviewState::Accepted { .. } => {}
            ReviewState::Pending | ReviewState::Uploaded => all_accepted = false,
        }
    }

    if all_accepted {
        EnrollmentStatus::InWaitlist
    } else {
        EnrollmentStatus::PendingReview
    }
}

/// Re-derive the status after a document upload, delete, or review.
pub fn recompute(
    current: EnrollmentStatus,
    documents: &DocumentSet,
    required: &[DocumentKind],
) -> StatusDecision {
    if !current.is_auto() {
        return StatusDecision::Frozen;
    }

    let target = derive_target(documents, required);
    if target == current {
        StatusDecision::Unchanged
    } else {
        StatusDecision::Advance {
            from: current,
            to: target,
        }
    }
}
