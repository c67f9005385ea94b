use serde_json::{json, Map, Value};

use super::common::*;
use crate::auth::ApplicantScope;
use crate::error::ServiceError;
use crate::store::{FieldUpdate, RecordStore, ENROLLMENTS};
use crate::workflows::enrollment::{
    DocumentKind, EnrollmentFilter, EnrollmentStatus, ReviewDecision, ReviewState, SlotSource,
    UserRepository, UserRole,
};

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn scope_for(record_ids: &[&str]) -> ApplicantScope {
    ApplicantScope {
        email: APPLICANT_EMAIL.to_string(),
        name: "Maria".to_string(),
        enrollment_ids: record_ids.iter().map(|id| id.to_string()).collect(),
    }
}

#[tokio::test]
async fn submit_normalizes_email_and_sends_confirmation() {
    let harness = Harness::new();
    let record = harness.submit().await;

    assert_eq!(record.email, APPLICANT_EMAIL);
    assert_eq!(record.status, EnrollmentStatus::PendingUpload);
    assert_eq!(harness.mailer.templates(), vec!["application_submitted"]);
    assert_eq!(record.emails_sent.len(), 1);
    assert_eq!(record.emails_sent[0].template, "application_submitted");

    let user = UserRepository::new(harness.store.clone())
        .find_by_email(APPLICANT_EMAIL)
        .await
        .expect("lookup")
        .expect("applicant account created");
    assert_eq!(user.role, UserRole::Applicant);
}

#[tokio::test]
async fn submit_rejects_unknown_courses_and_bad_emails() {
    let harness = Harness::new();

    let mut unknown_course = submission();
    unknown_course.course = "Welding NC II".to_string();
    assert!(matches!(
        harness.enrollments.submit(unknown_course, CLIENT).await,
        Err(ServiceError::Validation(_))
    ));

    let mut bad_email = submission();
    bad_email.email = "not-an-email".to_string();
    assert!(matches!(
        harness.enrollments.submit(bad_email, CLIENT).await,
        Err(ServiceError::Validation(_))
    ));
}

#[tokio::test]
async fn enrollment_moves_from_upload_to_completion() {
    let harness = Harness::new();
    let record = harness.submit().await;
    let id = record.id.clone();

    let record = harness.upload_required(&id, SlotSource::Applicant).await;
    assert_eq!(record.status, EnrollmentStatus::PendingReview);

    let record = harness
        .enrollments
        .review_document(
            &id,
            DocumentKind::GovernmentId,
            ReviewDecision::Reject {
                reason: "ID is expired".to_string(),
            },
            &staff(),
        )
        .await
        .expect("reject");
    assert_eq!(record.status, EnrollmentStatus::DocumentsRejected);
    assert!(harness.mailer.templates().contains(&"document_rejected"));

    harness
        .enrollments
        .upload_document(
            &id,
            DocumentKind::GovernmentId,
            SlotSource::Applicant,
            pdf("renewed-id.pdf"),
            APPLICANT_EMAIL,
        )
        .await
        .expect("re-upload");
    assert_eq!(harness.fetch(&id).await.status, EnrollmentStatus::PendingReview);

    let record = harness.accept_required(&id).await;
    assert_eq!(record.status, EnrollmentStatus::InWaitlist);
    assert!(harness.mailer.templates().contains(&"in_waitlist"));

    let batch = harness.open_batch("bookkeeping-nc-iii").await;
    let record = harness
        .enrollments
        .send_interview_schedule(&id, &staff())
        .await
        .expect("interview schedule");
    assert_eq!(record.status, EnrollmentStatus::PhysicalDocsRequired);

    harness.upload_required(&id, SlotSource::Official).await;
    assert_eq!(
        harness.fetch(&id).await.status,
        EnrollmentStatus::PhysicalDocsRequired,
        "official scans never move a manually set status"
    );

    let record = harness
        .enrollments
        .complete(&id, &staff())
        .await
        .expect("complete");
    assert_eq!(record.status, EnrollmentStatus::Completed);
    assert_eq!(record.batch_id, Some(batch.id.clone()));
    assert_eq!(record.batch_start_date, Some(batch.start_date));

    let user = UserRepository::new(harness.store.clone())
        .find_by_email(APPLICANT_EMAIL)
        .await
        .expect("lookup")
        .expect("account");
    assert_eq!(user.role, UserRole::Student);

    assert_eq!(
        harness.mailer.templates(),
        vec![
            "application_submitted",
            "document_rejected",
            "in_waitlist",
            "interview_schedule",
            "enrollment_completed",
        ]
    );
    let statuses: Vec<_> = record
        .changelog
        .iter()
        .filter(|entry| entry.field == "status")
        .map(|entry| entry.new_value.clone())
        .collect();
    assert_eq!(
        statuses,
        vec![
            json!("pending_review"),
            json!("documents_rejected"),
            json!("pending_review"),
            json!("in_waitlist"),
            json!("physical_docs_required"),
            json!("completed"),
        ]
    );
}

#[tokio::test]
async fn interview_schedule_needs_an_active_batch() {
    let harness = Harness::new();
    let record = harness.waitlisted().await;

    let err = harness
        .enrollments
        .send_interview_schedule(&record.id, &staff())
        .await
        .expect_err("no batch yet");
    assert!(matches!(err, ServiceError::Validation(_)));
    assert_eq!(harness.fetch(&record.id).await.status, EnrollmentStatus::InWaitlist);
}

#[tokio::test]
async fn interview_schedule_is_refused_before_the_waitlist() {
    let harness = Harness::new();
    harness.open_batch("bookkeeping-nc-iii").await;
    let record = harness.submit().await;

    assert!(matches!(
        harness.enrollments.send_interview_schedule(&record.id, &staff()).await,
        Err(ServiceError::Validation(_))
    ));
}

#[tokio::test]
async fn completion_requires_every_official_scan() {
    let harness = Harness::new();
    let record = harness.waitlisted().await;
    harness.open_batch("bookkeeping-nc-iii").await;
    harness
        .enrollments
        .send_interview_schedule(&record.id, &staff())
        .await
        .expect("invite");

    harness
        .enrollments
        .upload_document(
            &record.id,
            DocumentKind::BirthCertificate,
            SlotSource::Official,
            pdf("psa.pdf"),
            &staff().email,
        )
        .await
        .expect("official scan");

    match harness.enrollments.complete(&record.id, &staff()).await {
        Err(ServiceError::Validation(message)) => {
            assert!(message.contains("Diploma / Transcript of Records"));
            assert!(message.contains("Valid Government ID"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn archive_and_unarchive_restore_the_previous_status() {
    let harness = Harness::new();
    let record = harness.waitlisted().await;

    let archived = harness
        .enrollments
        .archive(&record.id, &staff())
        .await
        .expect("archive");
    assert_eq!(archived.status, EnrollmentStatus::Archived);
    assert_eq!(archived.previous_status, Some(EnrollmentStatus::InWaitlist));

    assert!(matches!(
        harness.enrollments.archive(&record.id, &staff()).await,
        Err(ServiceError::Validation(_))
    ));

    let restored = harness
        .enrollments
        .unarchive(&record.id, &staff())
        .await
        .expect("unarchive");
    assert_eq!(restored.status, EnrollmentStatus::InWaitlist);
    assert_eq!(restored.previous_status, None);

    assert!(matches!(
        harness.enrollments.unarchive(&record.id, &staff()).await,
        Err(ServiceError::Validation(_))
    ));
}

#[tokio::test]
async fn deleting_a_document_removes_the_blob_and_reverts_status() {
    let harness = Harness::new();
    let record = harness.submit().await;
    let uploaded = harness.upload_required(&record.id, SlotSource::Applicant).await;
    assert_eq!(uploaded.status, EnrollmentStatus::PendingReview);

    let path = uploaded
        .documents
        .get(DocumentKind::BirthCertificate)
        .and_then(|entry| entry.applicant_upload.clone())
        .expect("slot")
        .blob_path;
    assert!(path.starts_with("Dela_Cruz_Maria_Santos_1998-03-14/applicant_"));
    assert!(harness.blobs.contains(&path));

    let record = harness
        .enrollments
        .delete_document(
            &record.id,
            DocumentKind::BirthCertificate,
            SlotSource::Applicant,
            &staff().email,
        )
        .await
        .expect("delete");

    assert!(!harness.blobs.contains(&path));
    assert_eq!(harness.blobs.len(), 2);
    assert_eq!(record.status, EnrollmentStatus::PendingUpload);
    assert_eq!(
        record
            .documents
            .get(DocumentKind::BirthCertificate)
            .map(|entry| entry.review.clone()),
        Some(ReviewState::Pending)
    );
}

#[tokio::test]
async fn deleting_an_empty_slot_is_not_found() {
    let harness = Harness::new();
    let record = harness.submit().await;

    assert!(matches!(
        harness
            .enrollments
            .delete_document(&record.id, DocumentKind::IdPhoto, SlotSource::Official, &staff().email)
            .await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn review_requires_a_file_and_a_reason() {
    let harness = Harness::new();
    let record = harness.submit().await;

    assert!(matches!(
        harness
            .enrollments
            .review_document(&record.id, DocumentKind::GovernmentId, ReviewDecision::Accept, &staff())
            .await,
        Err(ServiceError::NotFound(_))
    ));

    harness.upload_required(&record.id, SlotSource::Applicant).await;
    assert!(matches!(
        harness
            .enrollments
            .review_document(
                &record.id,
                DocumentKind::GovernmentId,
                ReviewDecision::Reject {
                    reason: "  ".to_string()
                },
                &staff(),
            )
            .await,
        Err(ServiceError::Validation(_))
    ));
}

#[tokio::test]
async fn admin_update_logs_each_changed_field() {
    let harness = Harness::new();
    let record = harness.submit().await;

    let updated = harness
        .enrollments
        .admin_update(
            &record.id,
            fields(json!({
                "contactNo": "09998887777",
                "firstName": "Maria",
                "course": "Events Management Services NC III",
                "certificate_issued": true,
            })),
            &staff(),
        )
        .await
        .expect("update");

    assert_eq!(updated.profile.contact_no, "09998887777");
    assert_eq!(updated.course, "Events Management Services NC III");
    assert!(updated.certificate_issued);

    let mut changed: Vec<_> = updated
        .changelog
        .iter()
        .map(|entry| entry.field.as_str())
        .collect();
    changed.sort_unstable();
    assert_eq!(changed, vec!["certificate_issued", "contactNo", "course"]);
    assert!(updated
        .changelog
        .iter()
        .all(|entry| entry.updated_by == staff().email));
}

#[tokio::test]
async fn admin_update_rejects_archiving_unknown_courses_and_unknown_fields() {
    let harness = Harness::new();
    let record = harness.submit().await;

    for body in [
        json!({ "status": "archived" }),
        json!({ "course": "Welding NC II" }),
        json!({ "nickname": "Mia" }),
        json!({ "status": "enrolled" }),
    ] {
        assert!(
            matches!(
                harness
                    .enrollments
                    .admin_update(&record.id, fields(body.clone()), &staff())
                    .await,
                Err(ServiceError::Validation(_))
            ),
            "{body} should be rejected"
        );
    }
    assert!(harness.fetch(&record.id).await.changelog.is_empty());
}

#[tokio::test]
async fn invited_applicants_are_not_pulled_back_by_review() {
    let harness = Harness::new();
    let record = harness.waitlisted().await;
    harness.open_batch("bookkeeping-nc-iii").await;
    harness
        .enrollments
        .send_interview_schedule(&record.id, &staff())
        .await
        .expect("invite");

    let record = harness
        .enrollments
        .review_document(
            &record.id,
            DocumentKind::GovernmentId,
            ReviewDecision::Reject {
                reason: "Expired ID".to_string(),
            },
            &staff(),
        )
        .await
        .expect("review");
    assert_eq!(record.status, EnrollmentStatus::PhysicalDocsRequired);
}

#[tokio::test]
async fn admin_status_edits_cannot_skip_manual_transitions() {
    let harness = Harness::new();
    let record = harness.submit().await;
    harness.open_batch("bookkeeping-nc-iii").await;

    for status in ["completed", "physical_docs_required", "in_waitlist"] {
        assert!(
            matches!(
                harness
                    .enrollments
                    .admin_update(&record.id, fields(json!({ "status": status })), &staff())
                    .await,
                Err(ServiceError::Validation(_))
            ),
            "{status} should be refused"
        );
    }

    let record = harness.fetch(&record.id).await;
    assert_eq!(record.status, EnrollmentStatus::PendingUpload);
    assert_eq!(record.batch_id, None);
    assert!(record.changelog.is_empty());
    let user = UserRepository::new(harness.store.clone())
        .find_by_email(APPLICANT_EMAIL)
        .await
        .expect("lookup")
        .expect("account");
    assert_eq!(user.role, UserRole::Applicant);
}

#[tokio::test]
async fn admin_auto_status_edits_are_rederived_from_documents() {
    let harness = Harness::new();
    let record = harness.submit().await;

    // Nothing uploaded yet, so review cannot be forced.
    let unchanged = harness
        .enrollments
        .admin_update(&record.id, fields(json!({ "status": "pending_review" })), &staff())
        .await
        .expect("edit");
    assert_eq!(unchanged.status, EnrollmentStatus::PendingUpload);
    assert!(unchanged.changelog.is_empty());

    let record = harness.waitlisted().await;
    harness.open_batch("bookkeeping-nc-iii").await;
    harness
        .enrollments
        .send_interview_schedule(&record.id, &staff())
        .await
        .expect("invite");

    let reverted = harness
        .enrollments
        .admin_update(&record.id, fields(json!({ "status": "in_waitlist" })), &staff())
        .await
        .expect("back to the waitlist");
    assert_eq!(reverted.status, EnrollmentStatus::InWaitlist);

    let reopened = harness
        .enrollments
        .admin_update(&record.id, fields(json!({ "status": "pending" })), &staff())
        .await
        .expect("back to the auto engine");
    assert_eq!(reopened.status, EnrollmentStatus::InWaitlist);
}

#[tokio::test]
async fn completing_a_reinvited_applicant_logs_the_prior_batch() {
    let harness = Harness::new();
    let record = harness.waitlisted().await;
    let batch = harness.open_batch("bookkeeping-nc-iii").await;
    harness
        .store
        .update(
            ENROLLMENTS,
            record.id.as_str(),
            vec![FieldUpdate::set("batch_id", json!("batch-2025-q3"))],
        )
        .await
        .expect("seed prior batch");
    harness
        .enrollments
        .send_interview_schedule(&record.id, &staff())
        .await
        .expect("invite");
    harness.upload_required(&record.id, SlotSource::Official).await;

    let record = harness
        .enrollments
        .complete(&record.id, &staff())
        .await
        .expect("complete");
    let entry = record
        .changelog
        .iter()
        .find(|entry| entry.field == "batch_id")
        .expect("batch change logged");
    assert_eq!(entry.old_value, json!("batch-2025-q3"));
    assert_eq!(entry.new_value, json!(batch.id.as_str()));
}

#[tokio::test]
async fn mail_failures_never_fail_the_transition() {
    let harness = Harness::with_mailer(FailingMailer);
    let record = harness
        .enrollments
        .submit(submission(), CLIENT)
        .await
        .expect("submission survives mail outage");
    harness.upload_required(&record.id, SlotSource::Applicant).await;
    let record = harness.accept_required(&record.id).await;

    assert_eq!(record.status, EnrollmentStatus::InWaitlist);
    assert!(record.emails_sent.is_empty());
}

#[tokio::test]
async fn document_view_signs_populated_slots() {
    let harness = Harness::new();
    let record = harness.submit().await;
    harness
        .enrollments
        .upload_document(
            &record.id,
            DocumentKind::IdPhoto,
            SlotSource::Applicant,
            pdf("photo.png"),
            APPLICANT_EMAIL,
        )
        .await
        .expect("upload");

    let views = harness.enrollments.documents(&record.id).await.expect("views");
    assert_eq!(views.len(), DocumentKind::ALL.len());

    let photo = views
        .iter()
        .find(|view| view.kind == DocumentKind::IdPhoto)
        .expect("photo entry");
    let upload = photo.applicant_upload.as_ref().expect("applicant copy");
    assert_eq!(
        upload.file_url.as_deref(),
        Some("memory://Dela_Cruz_Maria_Santos_1998-03-14/applicant_id_photo.png?ttl=15")
    );
    assert!(photo.official_scan.is_none());
    assert!(!photo.required);
}

#[tokio::test]
async fn export_writes_one_row_per_enrollment() {
    let harness = Harness::new();
    harness.submit().await;
    harness.submit().await;

    let csv = harness
        .enrollments
        .export_csv(&EnrollmentFilter::default())
        .await
        .expect("export");
    let lines: Vec<_> = csv.lines().collect();

    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("id,created_at,last_name,first_name"));
    assert!(lines[1].contains("Dela Cruz,Maria,Santos,maria.delacruz@example.com"));
}

#[tokio::test]
async fn otp_sign_in_lists_live_applications() {
    let harness = Harness::new();
    let kept = harness.submit().await;
    let archived = harness.submit().await;
    harness
        .enrollments
        .archive(&archived.id, &staff())
        .await
        .expect("archive");

    harness
        .enrollments
        .request_code("  MARIA.DELACRUZ@example.com")
        .await
        .expect("code sent");
    let code = harness.mailer.last_code(APPLICANT_EMAIL);
    assert_eq!(code.len(), 6);

    let verification = harness
        .enrollments
        .verify_code(APPLICANT_EMAIL, &code)
        .await
        .expect("verified");

    assert_eq!(verification.role, UserRole::Applicant);
    assert_eq!(verification.applications.len(), 1);
    assert_eq!(verification.applications[0].id, kept.id);

    let claims = harness.issuer.decode(&verification.token).expect("token");
    assert_eq!(claims.enrollment_ids, vec![kept.id.to_string()]);
}

#[tokio::test]
async fn otp_rejects_wrong_codes_and_unknown_emails() {
    let harness = Harness::new();
    harness.submit().await;

    assert!(matches!(
        harness.enrollments.request_code("nobody@example.com").await,
        Err(ServiceError::NotFound(_))
    ));

    harness
        .enrollments
        .request_code(APPLICANT_EMAIL)
        .await
        .expect("code sent");
    let code = harness.mailer.last_code(APPLICANT_EMAIL);
    let wrong = if code == "000000" { "111111" } else { "000000" };

    match harness.enrollments.verify_code(APPLICANT_EMAIL, wrong).await {
        Err(ServiceError::Validation(message)) => {
            assert_eq!(message, "Invalid code. 4 attempts remaining.")
        }
        other => panic!("expected validation error, got {other:?}"),
    }

    assert!(matches!(
        harness.enrollments.request_code(APPLICANT_EMAIL).await,
        Err(ServiceError::RateLimited(_))
    ));
}

#[tokio::test]
async fn otp_mail_failure_is_reported() {
    let harness = Harness::with_mailer(FailingMailer);
    harness
        .enrollments
        .submit(submission(), CLIENT)
        .await
        .expect("submit");

    assert!(matches!(
        harness.enrollments.request_code(APPLICANT_EMAIL).await,
        Err(ServiceError::Mail(_))
    ));
}

#[tokio::test]
async fn applicant_edits_respect_scope_and_status() {
    let harness = Harness::new();
    let record = harness.submit().await;
    let other = harness.submit().await;
    let scope = scope_for(&[record.id.as_str()]);

    let view = harness
        .enrollments
        .applicant_update(&scope, &record.id, fields(json!({ "contactNo": "09171112222" })))
        .await
        .expect("editable");
    assert_eq!(view.profile.contact_no, "09171112222");
    let changelog = harness.fetch(&record.id).await.changelog;
    assert_eq!(changelog.len(), 1);
    assert_eq!(changelog[0].updated_by, APPLICANT_EMAIL);

    assert!(matches!(
        harness
            .enrollments
            .applicant_update(&scope, &other.id, fields(json!({ "contactNo": "1" })))
            .await,
        Err(ServiceError::Forbidden(_))
    ));
    assert!(matches!(
        harness
            .enrollments
            .applicant_update(&scope, &record.id, fields(json!({ "status": "completed" })))
            .await,
        Err(ServiceError::Forbidden(_))
    ));

    harness.upload_required(&record.id, SlotSource::Applicant).await;
    assert!(matches!(
        harness
            .enrollments
            .applicant_update(&scope, &record.id, fields(json!({ "contactNo": "1" })))
            .await,
        Err(ServiceError::Forbidden(_))
    ));
}

#[tokio::test]
async fn my_classes_lists_completed_enrollments() {
    let harness = Harness::new();
    let record = harness.waitlisted().await;
    let pending = harness.submit().await;
    harness.open_batch("bookkeeping-nc-iii").await;
    harness
        .enrollments
        .send_interview_schedule(&record.id, &staff())
        .await
        .expect("invite");
    harness.upload_required(&record.id, SlotSource::Official).await;
    harness
        .enrollments
        .complete(&record.id, &staff())
        .await
        .expect("complete");

    let scope = scope_for(&[record.id.as_str(), pending.id.as_str()]);
    let classes = harness.enrollments.my_classes(&scope).await.expect("classes");

    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0].enrollment_id, record.id);
    assert_eq!(classes[0].instructor_name.as_deref(), Some("Ana Reyes"));
}
