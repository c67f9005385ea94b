use chrono::{TimeZone, Utc};

use crate::workflows::enrollment::{
    derive_target, recompute, DocumentEntry, DocumentKind, DocumentSet, EnrollmentStatus,
    ReviewDecision, Slot, SlotSource, StatusDecision,
};

const REQUIRED: [DocumentKind; 3] = DocumentKind::REQUIRED;

fn slot(source: SlotSource) -> Slot {
    Slot {
        blob_path: format!("Dela_Cruz_Maria_1998-03-14/{}_scan.pdf", source.prefix()),
        original_filename: "scan.pdf".to_string(),
        content_type: "application/pdf".to_string(),
        uploaded_by: "registrar@brighthorizons.test".to_string(),
        uploaded_at: Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap(),
    }
}

fn uploaded() -> DocumentEntry {
    let mut entry = DocumentEntry::default();
    entry.place(SlotSource::Applicant, slot(SlotSource::Applicant));
    entry
}

fn reviewed(decision: ReviewDecision) -> DocumentEntry {
    let mut entry = uploaded();
    entry
        .review(decision, "registrar@brighthorizons.test", Utc::now())
        .expect("entry has a file");
    entry
}

fn rejected() -> DocumentEntry {
    reviewed(ReviewDecision::Reject {
        reason: "Blurry scan".to_string(),
    })
}

fn set(entries: &[(DocumentKind, DocumentEntry)]) -> DocumentSet {
    let mut documents = DocumentSet::default();
    for (kind, entry) in entries {
        documents.insert(*kind, entry.clone());
    }
    documents
}

fn all(entry: DocumentEntry) -> DocumentSet {
    set(&REQUIRED.map(|kind| (kind, entry.clone())))
}

#[test]
fn missing_required_file_means_pending_upload() {
    let documents = set(&[
        (DocumentKind::BirthCertificate, reviewed(ReviewDecision::Accept)),
        (DocumentKind::GovernmentId, reviewed(ReviewDecision::Accept)),
    ]);
    assert_eq!(
        derive_target(&documents, &REQUIRED),
        EnrollmentStatus::PendingUpload
    );
}

#[test]
fn any_rejection_wins_over_unreviewed_files() {
    let documents = set(&[
        (DocumentKind::BirthCertificate, rejected()),
        (DocumentKind::EducationalCredentials, uploaded()),
        (DocumentKind::GovernmentId, reviewed(ReviewDecision::Accept)),
    ]);
    assert_eq!(
        derive_target(&documents, &REQUIRED),
        EnrollmentStatus::DocumentsRejected
    );
}

#[test]
fn all_files_present_but_unreviewed_means_pending_review() {
    assert_eq!(
        derive_target(&all(uploaded()), &REQUIRED),
        EnrollmentStatus::PendingReview
    );
}

#[test]
fn all_required_accepted_means_waitlist() {
    assert_eq!(
        derive_target(&all(reviewed(ReviewDecision::Accept)), &REQUIRED),
        EnrollmentStatus::InWaitlist
    );
}

#[test]
fn optional_documents_do_not_affect_the_target() {
    let mut documents = all(reviewed(ReviewDecision::Accept));
    documents.insert(DocumentKind::MarriageCertificate, rejected());
    assert_eq!(
        derive_target(&documents, &REQUIRED),
        EnrollmentStatus::InWaitlist
    );
}

#[test]
fn official_scan_alone_counts_as_accepted() {
    let mut entry = DocumentEntry::default();
    entry.place(SlotSource::Official, slot(SlotSource::Official));
    assert_eq!(
        derive_target(&all(entry), &REQUIRED),
        EnrollmentStatus::InWaitlist
    );
}

#[test]
fn statuses_past_review_are_never_recomputed() {
    let documents = all(rejected());
    let settled = EnrollmentStatus::MANUAL_OVERRIDE
        .into_iter()
        .chain([EnrollmentStatus::InWaitlist]);
    for status in settled {
        assert_eq!(
            recompute(status, &documents, &REQUIRED),
            StatusDecision::Frozen,
            "{status} must be left alone"
        );
    }
}

#[test]
fn auto_statuses_advance_to_the_derived_target() {
    let documents = all(reviewed(ReviewDecision::Accept));
    for status in EnrollmentStatus::AUTO {
        assert_eq!(
            recompute(status, &documents, &REQUIRED),
            StatusDecision::Advance {
                from: status,
                to: EnrollmentStatus::InWaitlist,
            }
        );
    }
}

#[test]
fn recompute_is_idempotent() {
    let documents = all(uploaded());
    let first = recompute(EnrollmentStatus::PendingUpload, &documents, &REQUIRED);
    let settled = first.target().expect("status moves");
    assert_eq!(
        recompute(settled, &documents, &REQUIRED),
        StatusDecision::Unchanged
    );
}

#[test]
fn every_status_round_trips_through_its_label() {
    for status in EnrollmentStatus::ALL {
        assert_eq!(status.label().parse::<EnrollmentStatus>(), Ok(status));
    }
    assert!("enrolled".parse::<EnrollmentStatus>().is_err());
}

#[test]
fn applicants_edit_only_before_review_starts() {
    let editable: Vec<_> = EnrollmentStatus::ALL
        .into_iter()
        .filter(|status| status.is_applicant_editable())
        .collect();
    assert_eq!(
        editable,
        vec![EnrollmentStatus::Pending, EnrollmentStatus::PendingUpload]
    );
}
