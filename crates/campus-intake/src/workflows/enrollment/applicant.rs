//! Applicant portal: OTP sign-in and the self-service reads and edits an
//! applicant credential is allowed to make.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::changelog::ChangeRecorder;
use super::documents::{DocumentKind, SlotSource};
use super::domain::{
    is_plausible_email, normalize_email, ApplicantProfile, EnrollmentId, EnrollmentRecord, UserRole,
};
use super::repository::EnrollmentUpdate;
use super::service::{DocumentView, EnrollmentService, UploadedFile};
use super::status::EnrollmentStatus;
use crate::auth::ApplicantScope;
use crate::error::ServiceError;
use crate::notifications::{Mailer, Notification};
use crate::store::{BlobStore, RecordStore};
use crate::workflows::courses::BatchId;

/// One application listed after a successful code verification.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicantApplication {
    pub id: EnrollmentId,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    #[serde(rename = "middleName")]
    pub middle_name: Option<String>,
    pub email: String,
    pub course: String,
    pub status: EnrollmentStatus,
    pub created_at: DateTime<Utc>,
    pub start_date: Option<String>,
    pub enrollment_deadline: Option<String>,
    pub instructor_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OtpVerification {
    pub token: String,
    pub role: UserRole,
    pub applications: Vec<ApplicantApplication>,
}

/// Enrollment as the applicant sees it. Staff bookkeeping is left out.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicantEnrollmentView {
    pub id: EnrollmentId,
    #[serde(flatten)]
    pub profile: ApplicantProfile,
    pub email: String,
    pub course: String,
    pub status: EnrollmentStatus,
    pub status_label: &'static str,
    pub batch_start_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<EnrollmentRecord> for ApplicantEnrollmentView {
    fn from(record: EnrollmentRecord) -> Self {
        Self {
            status_label: record.status.display_label(),
            id: record.id,
            profile: record.profile,
            email: record.email,
            course: record.course,
            status: record.status,
            batch_start_date: record.batch_start_date,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// A completed enrollment with its batch schedule.
#[derive(Debug, Clone, Serialize)]
pub struct StudentClass {
    pub enrollment_id: EnrollmentId,
    pub course: String,
    pub batch_id: Option<BatchId>,
    pub start_date: Option<NaiveDate>,
    pub instructor_name: Option<String>,
    pub certificate_issued: bool,
}

impl<S, B, M> EnrollmentService<S, B, M>
where
    S: RecordStore,
    B: BlobStore,
    M: Mailer,
{
    /// Mail a one-time code to an email that has at least one application.
    pub async fn request_code(&self, email: &str) -> Result<(), ServiceError> {
        let email = normalize_email(email);
        if !is_plausible_email(&email) {
            return Err(ServiceError::validation("A valid email address is required."));
        }
        let record = self
            .enrollments
            .any_for_email(&email)
            .await?
            .ok_or_else(|| ServiceError::not_found("No application found for this email address."))?;

        let code = self.otp.issue(&email).await?;
        let notification = Notification::OtpCode {
            name: record.profile.first_name.clone(),
            code,
        };
        if let Err(err) = self.notifier.send(&email, &notification).await {
            if let Err(discard) = self.otp.discard(&email).await {
                tracing::warn!(error = %discard, "unsent code could not be discarded");
            }
            return Err(err.into());
        }

        tracing::info!(email = %email, "verification code sent");
        Ok(())
    }

    /// Check a code and mint an applicant credential over the email's
    /// non-archived applications.
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<OtpVerification, ServiceError> {
        let email = normalize_email(email);
        if code.trim().is_empty() {
            return Err(ServiceError::validation("Email and code are required."));
        }
        self.otp.verify(&email, code.trim()).await?;

        let role = self
            .users
            .find_by_email(&email)
            .await?
            .map(|user| user.role)
            .unwrap_or_default();
        let records: Vec<_> = self
            .enrollments
            .by_email(&email)
            .await?
            .into_iter()
            .filter(|record| record.status != EnrollmentStatus::Archived)
            .collect();
        let overrides = self.overrides.get_course_overrides().await?;

        let name = records
            .first()
            .map(|record| record.profile.first_name.clone())
            .unwrap_or_default();
        let ids = records.iter().map(|record| record.id.to_string()).collect();
        let applications = records
            .into_iter()
            .map(|record| {
                let open = overrides.get(&record.course);
                ApplicantApplication {
                    start_date: open.map(|batch| batch.start_date.to_string()),
                    enrollment_deadline: open
                        .and_then(|batch| batch.enrollment_deadline)
                        .map(|date| date.to_string()),
                    instructor_name: open
                        .and_then(|batch| batch.instructor.as_ref())
                        .and_then(|instructor| instructor.assigned_name())
                        .map(str::to_string),
                    id: record.id,
                    first_name: record.profile.first_name,
                    last_name: record.profile.last_name,
                    middle_name: record.profile.middle_name,
                    email: record.email,
                    course: record.course,
                    status: record.status,
                    created_at: record.created_at,
                }
            })
            .collect();

        let token = self.issuer.issue_applicant(&email, &name, ids)?;
        tracing::info!(email = %email, role = role.label(), "applicant verified");
        Ok(OtpVerification {
            token,
            role,
            applications,
        })
    }

    pub async fn applicant_enrollment(
        &self,
        scope: &ApplicantScope,
        id: &EnrollmentId,
    ) -> Result<ApplicantEnrollmentView, ServiceError> {
        Ok(self.owned(scope, id).await?.into())
    }

    pub async fn applicant_update(
        &self,
        scope: &ApplicantScope,
        id: &EnrollmentId,
        fields: Map<String, Value>,
    ) -> Result<ApplicantEnrollmentView, ServiceError> {
        if fields.is_empty() {
            return Err(ServiceError::validation("No fields to update."));
        }
        let _writer = self.writers.acquire(id).await;
        let record = self.owned(scope, id).await?;
        self.guard.check_applicant_edit(&record, &fields)?;

        let mut changes = ChangeRecorder::new(&scope.email);
        let update = self.profile_update(&record, fields, &mut changes, EnrollmentUpdate::new())?;
        if changes.is_empty() {
            return Ok(record.into());
        }

        self.enrollments.apply(id, update.changelog(changes)).await?;
        tracing::info!(enrollment_id = %id, "applicant updated details");
        Ok(self.require(id).await?.into())
    }

    pub async fn applicant_documents(
        &self,
        scope: &ApplicantScope,
        id: &EnrollmentId,
    ) -> Result<Vec<DocumentView>, ServiceError> {
        let record = self.owned(scope, id).await?;
        Ok(self.document_views(&record).await)
    }

    pub async fn applicant_upload(
        &self,
        scope: &ApplicantScope,
        id: &EnrollmentId,
        kind: DocumentKind,
        source: SlotSource,
        file: UploadedFile,
    ) -> Result<ApplicantEnrollmentView, ServiceError> {
        let _writer = self.writers.acquire(id).await;
        let record = self.owned(scope, id).await?;
        self.guard.check_applicant_upload(&record, source)?;
        let updated = self
            .store_upload(record, kind, source, file, &scope.email)
            .await?;
        Ok(updated.into())
    }

    /// Completed enrollments of the credential, with their batch schedule.
    pub async fn my_classes(&self, scope: &ApplicantScope) -> Result<Vec<StudentClass>, ServiceError> {
        let mut classes = Vec::new();
        for id in &scope.enrollment_ids {
            let Some(record) = self.enrollments.fetch(&EnrollmentId::from(id.as_str())).await? else {
                continue;
            };
            if self.guard.check_owner(scope, &record).is_err()
                || record.status != EnrollmentStatus::Completed
            {
                continue;
            }

            let batch = match &record.batch_id {
                Some(batch_id) => self.batches.fetch(batch_id).await?,
                None => None,
            };
            classes.push(StudentClass {
                enrollment_id: record.id,
                course: record.course,
                start_date: record
                    .batch_start_date
                    .or_else(|| batch.as_ref().map(|batch| batch.start_date)),
                instructor_name: batch
                    .and_then(|batch| batch.instructor)
                    .and_then(|instructor| instructor.assigned_name().map(str::to_string)),
                batch_id: record.batch_id,
                certificate_issued: record.certificate_issued,
            });
        }
        Ok(classes)
    }

    async fn owned(
        &self,
        scope: &ApplicantScope,
        id: &EnrollmentId,
    ) -> Result<EnrollmentRecord, ServiceError> {
        self.guard.check_scope(scope, id)?;
        let record = self.require(id).await?;
        self.guard.check_owner(scope, &record)?;
        Ok(record)
    }
}
