use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::StaffIdentity;
use crate::error::ServiceError;
use crate::store::{BlobStore, RecordStore};
use crate::workflows::enrollment::{
    is_plausible_email, normalize_email, sign_slot, ChangeRecorder, DocumentEntry, DocumentKind,
    EnrollmentId, EnrollmentRecord, EnrollmentRepository, EnrollmentStatus,
    EnrollmentUpdate, ReviewState, SlotView, UserRecord, UserRepository, UserRole, WriterLocks,
};

const EMAIL_CHANGE_NOTE: &str = "Student email changed by admin (identity verified)";

#[derive(Debug, Clone, Serialize)]
pub struct StudentEnrollment {
    pub id: EnrollmentId,
    pub course: String,
    pub status: EnrollmentStatus,
    pub created_at: DateTime<Utc>,
}

/// Latest copy of one document kind across a student's enrollments.
#[derive(Debug, Clone, Serialize)]
pub struct StudentDocument {
    pub kind: DocumentKind,
    pub label: &'static str,
    pub enrollment_id: EnrollmentId,
    pub review: ReviewState,
    pub applicant_upload: Option<SlotView>,
    pub official_scan: Option<SlotView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentDetail {
    pub student: UserRecord,
    pub enrollments: Vec<StudentEnrollment>,
    pub documents: Vec<StudentDocument>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailChangeRequest {
    pub new_email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailChange {
    pub old_email: String,
    pub new_email: String,
    pub enrollments_updated: usize,
    pub message: String,
}

pub struct StudentDirectory<S, B> {
    users: UserRepository<S>,
    enrollments: EnrollmentRepository<S>,
    blobs: Arc<B>,
    signed_url_ttl_minutes: u32,
    writers: Arc<WriterLocks>,
}

impl<S, B> StudentDirectory<S, B>
where
    S: RecordStore,
    B: BlobStore,
{
    pub fn new(
        store: Arc<S>,
        blobs: Arc<B>,
        signed_url_ttl_minutes: u32,
        writers: Arc<WriterLocks>,
    ) -> Self {
        Self {
            users: UserRepository::new(Arc::clone(&store)),
            enrollments: EnrollmentRepository::new(store),
            blobs,
            signed_url_ttl_minutes,
            writers,
        }
    }

    /// Accounts that have completed at least one course.
    pub async fn list(&self) -> Result<Vec<UserRecord>, ServiceError> {
        Ok(self.users.with_role(UserRole::Student).await?)
    }

    pub async fn detail(&self, id: &str) -> Result<StudentDetail, ServiceError> {
        let student = self.require(id).await?;
        let mut records = self.enrollments.by_email(&student.email).await?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut documents = Vec::new();
        for kind in DocumentKind::ALL {
            let Some((enrollment_id, entry)) = latest_document(&records, kind) else {
                continue;
            };
            documents.push(StudentDocument {
                kind,
                label: kind.label(),
                enrollment_id,
                applicant_upload: sign_slot(
                    self.blobs.as_ref(),
                    entry.applicant_upload,
                    self.signed_url_ttl_minutes,
                )
                .await,
                official_scan: sign_slot(
                    self.blobs.as_ref(),
                    entry.official_scan,
                    self.signed_url_ttl_minutes,
                )
                .await,
                review: entry.review,
            });
        }

        let enrollments = records
            .into_iter()
            .map(|record| StudentEnrollment {
                id: record.id,
                course: record.course,
                status: record.status,
                created_at: record.created_at,
            })
            .collect();

        Ok(StudentDetail {
            student,
            enrollments,
            documents,
        })
    }

    /// Move a student to a new email and carry every enrollment filed under
    /// the old address along with it.
    pub async fn change_email(
        &self,
        id: &str,
        request: EmailChangeRequest,
        staff: &StaffIdentity,
    ) -> Result<EmailChange, ServiceError> {
        let new_email = normalize_email(&request.new_email);
        if !is_plausible_email(&new_email) {
            return Err(ServiceError::validation("A valid email address is required."));
        }
        let student = self.require(id).await?;
        let old_email = student.email.clone();

        if old_email == new_email {
            return Ok(EmailChange {
                old_email,
                new_email,
                enrollments_updated: 0,
                message: "Email is already the same. No changes made.".to_string(),
            });
        }

        if let Some(existing) = self.users.find_by_email(&new_email).await? {
            if existing.id != student.id {
                return Err(ServiceError::conflict(
                    "This email is already associated with another student account.",
                ));
            }
        }

        self.users.change_email(&student.id, &new_email).await?;

        let filed = self.enrollments.by_email(&old_email).await?;
        let mut updated = 0;
        for listed in &filed {
            let _writer = self.writers.acquire(&listed.id).await;
            let Some(record) = self.enrollments.fetch(&listed.id).await? else {
                continue;
            };
            if record.email != old_email {
                continue;
            }
            let mut recorder = ChangeRecorder::new(staff.email.as_str());
            recorder.record_with_note(
                "email",
                record.email.as_str(),
                new_email.as_str(),
                EMAIL_CHANGE_NOTE,
            );
            self.enrollments
                .apply(
                    &record.id,
                    EnrollmentUpdate::new()
                        .set("email", &new_email)
                        .changelog(recorder),
                )
                .await?;
            updated += 1;
        }

        tracing::info!(
            student_id = %student.id,
            old = %old_email,
            new = %new_email,
            enrollments = updated,
            by = %staff.email,
            "student email changed"
        );
        Ok(EmailChange {
            message: format!(
                "Email updated from {old_email} to {new_email}. {updated} enrollment(s) updated."
            ),
            enrollments_updated: updated,
            old_email,
            new_email,
        })
    }

    async fn require(&self, id: &str) -> Result<UserRecord, ServiceError> {
        self.users
            .fetch(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Student not found"))
    }
}

/// Newest entry holding an official scan, else the newest holding any file.
/// `records` must be ordered newest first.
fn latest_document(
    records: &[EnrollmentRecord],
    kind: DocumentKind,
) -> Option<(EnrollmentId, DocumentEntry)> {
    let with_file = || {
        records.iter().filter_map(move |record| {
            record
                .documents
                .get(kind)
                .filter(|entry| entry.has_file())
                .map(|entry| (record, entry))
        })
    };
    with_file()
        .find(|(_, entry)| entry.official_scan.is_some())
        .or_else(|| with_file().next())
        .map(|(record, entry)| (record.id.clone(), entry.clone()))
}
