use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use super::batches::{Batch, BatchDraft, BatchId, BatchPatch, BatchRepository, BatchStatus};
use super::catalog::{Catalog, CourseDefinition};
use super::overrides::{CourseOverrides, CourseView};
use crate::auth::StaffIdentity;
use crate::error::ServiceError;
use crate::notifications::{Mailer, Notification};
use crate::store::RecordStore;
use crate::workflows::enrollment::{
    ChangeRecorder, EnrollmentFilter, EnrollmentId, EnrollmentRepository, EnrollmentStatus,
    EnrollmentUpdate, Notifier, WriterLocks,
};

/// Per-course dashboard row.
#[derive(Debug, Clone, Serialize)]
pub struct CourseSummary {
    pub course: String,
    pub slug: String,
    pub open_batch: Option<Batch>,
    pub status_counts: BTreeMap<&'static str, usize>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentClosure {
    pub batch: Batch,
    pub reverted: Vec<EnrollmentId>,
}

/// Batch lifecycle and the public course read path.
pub struct CourseService<S, M> {
    catalog: Arc<Catalog>,
    batches: BatchRepository<S>,
    overrides: Arc<CourseOverrides<S>>,
    enrollments: EnrollmentRepository<S>,
    notifier: Notifier<M>,
    writers: Arc<WriterLocks>,
}

impl<S, M> CourseService<S, M>
where
    S: RecordStore,
    M: Mailer,
{
    pub fn new(
        store: Arc<S>,
        catalog: Arc<Catalog>,
        overrides: Arc<CourseOverrides<S>>,
        notifier: Notifier<M>,
        writers: Arc<WriterLocks>,
    ) -> Self {
        Self {
            catalog,
            batches: BatchRepository::new(Arc::clone(&store)),
            overrides,
            enrollments: EnrollmentRepository::new(store),
            notifier,
            writers,
        }
    }

    pub async fn courses(&self) -> Result<Vec<CourseView>, ServiceError> {
        Ok(self.overrides.views(&self.catalog).await?)
    }

    pub fn categories(&self) -> Vec<String> {
        self.catalog.categories()
    }

    /// Courses whose category matches ignoring case. Unknown categories list nothing.
    pub async fn courses_in_category(&self, category: &str) -> Result<Vec<CourseView>, ServiceError> {
        let wanted = category.trim().to_lowercase();
        Ok(self
            .courses()
            .await?
            .into_iter()
            .filter(|view| view.course.category.to_lowercase() == wanted)
            .collect())
    }

    pub async fn course(&self, slug: &str) -> Result<CourseView, ServiceError> {
        let course = self.course_definition(slug)?;
        self.overrides
            .view_by_title(&self.catalog, &course.title)
            .await?
            .ok_or_else(|| ServiceError::not_found("Course not found"))
    }

    pub async fn summary(&self) -> Result<Vec<CourseSummary>, ServiceError> {
        let mut rows = Vec::new();
        for course in self.catalog.courses() {
            let enrollments = self
                .enrollments
                .list(&EnrollmentFilter {
                    course: Some(course.title.clone()),
                    status: None,
                })
                .await?;
            let mut status_counts = BTreeMap::new();
            for record in &enrollments {
                *status_counts.entry(record.status.label()).or_insert(0) += 1;
            }
            rows.push(CourseSummary {
                course: course.title.clone(),
                slug: course.slug.clone(),
                open_batch: self.batches.open_for_course(&course.title).await?,
                status_counts,
                total: enrollments.len(),
            });
        }
        Ok(rows)
    }

    pub async fn batches(&self, slug: &str) -> Result<Vec<Batch>, ServiceError> {
        let course = self.course_definition(slug)?;
        Ok(self.batches.for_course(&course.title).await?)
    }

    pub async fn create_batch(
        &self,
        slug: &str,
        draft: BatchDraft,
        staff: &StaffIdentity,
    ) -> Result<Batch, ServiceError> {
        let course = self.course_definition(slug)?;
        check_dates(draft.start_date, draft.enrollment_deadline)?;

        if let Some(open) = self.batches.open_for_course(&course.title).await? {
            return Err(ServiceError::conflict(format!(
                "{} already has an open batch ({}). Close it before starting another.",
                course.title, open.id
            )));
        }

        let now = Utc::now();
        let batch = Batch {
            id: BatchId::generate(),
            course: course.title.clone(),
            course_slug: course.slug.clone(),
            status: BatchStatus::Active,
            start_date: draft.start_date,
            enrollment_deadline: draft.enrollment_deadline,
            instructor: draft.instructor,
            created_by: staff.email.clone(),
            created_at: now,
            updated_at: now,
            closed_at: None,
        };
        self.batches.save(&batch).await?;
        self.overrides.invalidate();

        tracing::info!(batch_id = %batch.id, course = %batch.course, by = %staff.email, "batch created");
        Ok(batch)
    }

    pub async fn edit_batch(
        &self,
        slug: &str,
        id: &BatchId,
        patch: BatchPatch,
        staff: &StaffIdentity,
    ) -> Result<Batch, ServiceError> {
        let mut batch = self.batch_for(slug, id).await?;
        if !batch.status.is_open() {
            return Err(ServiceError::validation("Completed batches cannot be edited."));
        }

        if let Some(start_date) = patch.start_date {
            batch.start_date = start_date;
        }
        if let Some(deadline) = patch.enrollment_deadline {
            batch.enrollment_deadline = Some(deadline);
        }
        if let Some(instructor) = patch.instructor {
            batch.instructor = Some(instructor);
        }
        check_dates(batch.start_date, batch.enrollment_deadline)?;
        batch.updated_at = Utc::now();

        self.batches.save(&batch).await?;
        self.overrides.invalidate();

        tracing::info!(batch_id = %batch.id, by = %staff.email, "batch updated");
        Ok(batch)
    }

    /// Stop admitting applicants into the batch. Applicants invited to bring
    /// physical documents lose their slot and return to the waitlist.
    pub async fn close_enrollment(
        &self,
        slug: &str,
        id: &BatchId,
        staff: &StaffIdentity,
    ) -> Result<EnrollmentClosure, ServiceError> {
        let mut batch = self.batch_for(slug, id).await?;
        if batch.status != BatchStatus::Active {
            return Err(ServiceError::validation(format!(
                "Only active batches can close enrollment (batch is {}).",
                batch.status.label()
            )));
        }

        batch.status = BatchStatus::EnrollmentClosed;
        batch.updated_at = Utc::now();
        self.batches.save(&batch).await?;
        self.overrides.invalidate();

        let invited = self
            .enrollments
            .by_course_and_status(&batch.course, EnrollmentStatus::PhysicalDocsRequired)
            .await?;

        let mut reverted = Vec::with_capacity(invited.len());
        for listed in invited {
            let _writer = self.writers.acquire(&listed.id).await;
            let Some(record) = self.enrollments.fetch(&listed.id).await? else {
                continue;
            };
            if record.status != EnrollmentStatus::PhysicalDocsRequired
                || record.course != batch.course
            {
                tracing::debug!(enrollment_id = %record.id, status = record.status.label(), "left in place by batch closure");
                continue;
            }
            let mut changes = ChangeRecorder::new(&staff.email);
            changes.record_with_note(
                "status",
                record.status.label(),
                EnrollmentStatus::InWaitlist.label(),
                "Batch enrollment closed; returned to waitlist",
            );
            self.enrollments
                .apply(
                    &record.id,
                    EnrollmentUpdate::new()
                        .status(EnrollmentStatus::InWaitlist)
                        .changelog(changes),
                )
                .await?;

            self.notifier
                .notify(
                    &self.enrollments,
                    &record,
                    Notification::BatchRemoved {
                        name: record.profile.first_name.clone(),
                        course: record.course.clone(),
                    },
                )
                .await;
            reverted.push(record.id);
        }

        tracing::info!(
            batch_id = %batch.id,
            reverted = reverted.len(),
            by = %staff.email,
            "batch enrollment closed"
        );
        Ok(EnrollmentClosure { batch, reverted })
    }

    /// Finish the batch. The course schedule falls back to TBA.
    pub async fn close_batch(
        &self,
        slug: &str,
        id: &BatchId,
        staff: &StaffIdentity,
    ) -> Result<Batch, ServiceError> {
        let mut batch = self.batch_for(slug, id).await?;
        if !batch.status.is_open() {
            return Err(ServiceError::validation("Batch is already completed."));
        }

        let now = Utc::now();
        batch.status = BatchStatus::Completed;
        batch.updated_at = now;
        batch.closed_at = Some(now);
        self.batches.save(&batch).await?;
        self.overrides.invalidate();

        tracing::info!(batch_id = %batch.id, by = %staff.email, "batch completed");
        Ok(batch)
    }

    fn course_definition(&self, slug: &str) -> Result<&CourseDefinition, ServiceError> {
        self.catalog
            .by_slug(slug)
            .ok_or_else(|| ServiceError::not_found("Course not found"))
    }

    async fn batch_for(&self, slug: &str, id: &BatchId) -> Result<Batch, ServiceError> {
        let course = self.course_definition(slug)?;
        self.batches
            .fetch(id)
            .await?
            .filter(|batch| batch.course == course.title)
            .ok_or_else(|| ServiceError::not_found("Batch not found"))
    }
}

fn check_dates(
    start: chrono::NaiveDate,
    deadline: Option<chrono::NaiveDate>,
) -> Result<(), ServiceError> {
    match deadline {
        Some(deadline) if deadline > start => Err(ServiceError::validation(
            "Enrollment deadline must be on or before the start date.",
        )),
        _ => Ok(()),
    }
}
