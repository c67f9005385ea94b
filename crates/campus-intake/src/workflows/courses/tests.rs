use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;

use crate::error::ServiceError;
use crate::store::{FieldUpdate, RecordStore, ENROLLMENTS};
use crate::workflows::courses::{BatchPatch, BatchStatus, TBA};
use crate::workflows::enrollment::tests::common::*;
use crate::workflows::enrollment::{EnrollmentStatus, SlotSource};

const SLUG: &str = "bookkeeping-nc-iii";

#[tokio::test]
async fn a_course_has_at_most_one_open_batch() {
    let harness = Harness::new();
    harness.open_batch(SLUG).await;

    let err = harness
        .courses
        .create_batch(SLUG, batch_draft(), &staff())
        .await
        .expect_err("second open batch");
    assert!(matches!(err, ServiceError::Conflict(_)));

    // Other courses are unaffected.
    harness.open_batch("events-management-nc-iii").await;
}

#[tokio::test]
async fn deadline_after_start_is_rejected() {
    let harness = Harness::new();
    let mut draft = batch_draft();
    draft.enrollment_deadline = NaiveDate::from_ymd_opt(2026, 12, 1);

    assert!(matches!(
        harness.courses.create_batch(SLUG, draft, &staff()).await,
        Err(ServiceError::Validation(_))
    ));
}

#[tokio::test]
async fn unknown_course_slug_is_not_found() {
    let harness = Harness::new();
    assert!(matches!(
        harness.courses.create_batch("welding-nc-ii", batch_draft(), &staff()).await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn batch_writes_are_visible_on_the_next_read() {
    let harness = Harness::new();
    let before = harness.courses.course(SLUG).await.expect("course");
    assert_eq!(before.course.start_dates, vec![TBA.to_string()]);

    let batch = harness.open_batch(SLUG).await;
    let scheduled = harness.courses.course(SLUG).await.expect("course");
    assert_eq!(scheduled.start_date(), Some("2026-11-09"));
    assert_eq!(scheduled.batch_id, Some(batch.id.clone()));

    harness
        .courses
        .edit_batch(
            SLUG,
            &batch.id,
            BatchPatch {
                start_date: NaiveDate::from_ymd_opt(2026, 11, 16),
                ..BatchPatch::default()
            },
            &staff(),
        )
        .await
        .expect("edit");
    let moved = harness.courses.course(SLUG).await.expect("course");
    assert_eq!(moved.start_date(), Some("2026-11-16"));

    harness
        .courses
        .close_batch(SLUG, &batch.id, &staff())
        .await
        .expect("close");
    let closed = harness.courses.course(SLUG).await.expect("course");
    assert_eq!(closed.course.start_dates, vec![TBA.to_string()]);
    assert_eq!(closed.batch_id, None);
}

#[tokio::test]
async fn closing_enrollment_returns_invited_applicants_to_the_waitlist() {
    let harness = Harness::new();
    let invited = harness.waitlisted().await;
    let waiting = harness.waitlisted().await;
    let batch = harness.open_batch(SLUG).await;
    harness
        .enrollments
        .send_interview_schedule(&invited.id, &staff())
        .await
        .expect("invite");

    let closure = harness
        .courses
        .close_enrollment(SLUG, &batch.id, &staff())
        .await
        .expect("close enrollment");

    assert_eq!(closure.batch.status, BatchStatus::EnrollmentClosed);
    assert_eq!(closure.reverted, vec![invited.id.clone()]);

    let reverted = harness.fetch(&invited.id).await;
    assert_eq!(reverted.status, EnrollmentStatus::InWaitlist);
    let note = reverted
        .changelog
        .last()
        .and_then(|entry| entry.note.clone())
        .expect("closure note");
    assert!(note.contains("enrollment closed"));
    assert!(reverted
        .emails_sent
        .iter()
        .any(|mail| mail.template == "batch_removed"));

    assert_eq!(harness.fetch(&waiting.id).await.status, EnrollmentStatus::InWaitlist);

    // The closing batch still drives the schedule until it completes.
    let view = harness.courses.course(SLUG).await.expect("course");
    assert_eq!(view.batch_status, Some(BatchStatus::EnrollmentClosed));
}

#[tokio::test]
async fn completed_batches_cannot_be_edited_or_reclosed() {
    let harness = Harness::new();
    let batch = harness.open_batch(SLUG).await;
    harness
        .courses
        .close_batch(SLUG, &batch.id, &staff())
        .await
        .expect("close");

    assert!(matches!(
        harness
            .courses
            .edit_batch(SLUG, &batch.id, BatchPatch::default(), &staff())
            .await,
        Err(ServiceError::Validation(_))
    ));
    assert!(matches!(
        harness.courses.close_batch(SLUG, &batch.id, &staff()).await,
        Err(ServiceError::Validation(_))
    ));

    // A new intake may start once the previous one is done.
    harness.open_batch(SLUG).await;
}

#[tokio::test]
async fn summary_counts_enrollments_by_status() {
    let harness = Harness::new();
    harness.waitlisted().await;
    let pending = harness.submit().await;
    harness.upload_required(&pending.id, SlotSource::Applicant).await;
    harness.submit().await;

    let summary = harness.courses.summary().await.expect("summary");
    let bookkeeping = summary
        .iter()
        .find(|row| row.slug == SLUG)
        .expect("bookkeeping row");

    assert_eq!(bookkeeping.total, 3);
    assert_eq!(bookkeeping.status_counts.get("in_waitlist"), Some(&1));
    assert_eq!(bookkeeping.status_counts.get("pending_review"), Some(&1));
    assert_eq!(bookkeeping.status_counts.get("pending_upload"), Some(&1));
    assert!(bookkeeping.open_batch.is_none());
}

#[tokio::test]
async fn closure_leaves_records_that_moved_while_it_waited() {
    let harness = Harness::new();
    let invited = harness.waitlisted().await;
    let batch = harness.open_batch(SLUG).await;
    harness
        .enrollments
        .send_interview_schedule(&invited.id, &staff())
        .await
        .expect("invite");

    let held = harness.writers.acquire(&invited.id).await;
    let courses = Arc::clone(&harness.courses);
    let batch_id = batch.id.clone();
    let closing =
        tokio::spawn(async move { courses.close_enrollment(SLUG, &batch_id, &staff()).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!closing.is_finished());

    // The lock holder completes the enrollment before the closure gets its turn.
    harness
        .store
        .update(
            ENROLLMENTS,
            invited.id.as_str(),
            vec![FieldUpdate::set("status", json!("completed"))],
        )
        .await
        .expect("complete");
    drop(held);

    let closure = closing.await.expect("task").expect("close enrollment");
    assert!(closure.reverted.is_empty());
    let record = harness.fetch(&invited.id).await;
    assert_eq!(record.status, EnrollmentStatus::Completed);
    assert!(!harness.mailer.templates().contains(&"batch_removed"));
}

#[tokio::test]
async fn categories_are_distinct_and_filter_ignoring_case() {
    let harness = Harness::new();
    assert_eq!(
        harness.courses.categories(),
        vec!["Business & Finance".to_string(), "Tourism & Hospitality".to_string()]
    );

    let batch = harness.open_batch(SLUG).await;
    let business = harness
        .courses
        .courses_in_category(" business & FINANCE ")
        .await
        .expect("courses");
    assert_eq!(business.len(), 1);
    assert_eq!(business[0].course.slug, SLUG);
    assert_eq!(business[0].batch_id, Some(batch.id));

    assert!(harness
        .courses
        .courses_in_category("Welding")
        .await
        .expect("courses")
        .is_empty());
}
