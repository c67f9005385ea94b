use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::access::AccessGuard;
use super::changelog::ChangeRecorder;
use super::documents::{
    blob_path, DocumentKind, ReviewDecision, ReviewState, Slot, SlotSource,
};
use super::domain::{
    is_plausible_email, normalize_email, ApplicantProfile, EnrollmentId, EnrollmentRecord,
    EnrollmentSubmission,
};
use super::locks::WriterLocks;
use super::notify::Notifier;
use super::repository::{EnrollmentFilter, EnrollmentRepository, EnrollmentUpdate, UserRepository};
use super::status::{derive_target, recompute, EnrollmentStatus, StatusDecision};
use crate::auth::{OtpService, StaffIdentity, TokenIssuer};
use crate::error::ServiceError;
use crate::notifications::{Mailer, Notification};
use crate::ratelimit::RateLimiter;
use crate::store::{BlobStore, RecordStore};
use crate::workflows::courses::{BatchRepository, BatchStatus, Catalog, CourseOverrides};

/// Tunables for [`EnrollmentService`].
#[derive(Debug, Clone)]
pub struct EnrollmentSettings {
    pub signed_url_ttl_minutes: u32,
    pub submissions_per_minute: u32,
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for EnrollmentSettings {
    fn default() -> Self {
        Self {
            signed_url_ttl_minutes: 60,
            submissions_per_minute: 5,
            trusted_proxies: Vec::new(),
        }
    }
}

/// File received from a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    #[serde(flatten)]
    pub slot: Slot,
    pub file_url: Option<String>,
}

/// Document entry as shown to staff and applicants, with signed links.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    pub kind: DocumentKind,
    pub label: &'static str,
    pub required: bool,
    pub review: ReviewState,
    pub applicant_upload: Option<SlotView>,
    pub official_scan: Option<SlotView>,
}

/// Enrollment lifecycle: intake, document slots, review, and the manual
/// transitions staff drive after the waitlist.
pub struct EnrollmentService<S, B, M> {
    pub(super) enrollments: EnrollmentRepository<S>,
    pub(super) users: UserRepository<S>,
    pub(super) batches: BatchRepository<S>,
    pub(super) overrides: Arc<CourseOverrides<S>>,
    pub(super) catalog: Arc<Catalog>,
    pub(super) blobs: Arc<B>,
    pub(super) notifier: Notifier<M>,
    pub(super) otp: OtpService<S>,
    pub(super) issuer: Arc<TokenIssuer>,
    pub(super) guard: AccessGuard,
    pub(super) limiter: RateLimiter,
    pub(super) required: Vec<DocumentKind>,
    pub(super) signed_url_ttl_minutes: u32,
    pub(super) writers: Arc<WriterLocks>,
}

impl<S, B, M> EnrollmentService<S, B, M>
where
    S: RecordStore,
    B: BlobStore,
    M: Mailer,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        blobs: Arc<B>,
        notifier: Notifier<M>,
        catalog: Arc<Catalog>,
        overrides: Arc<CourseOverrides<S>>,
        issuer: Arc<TokenIssuer>,
        writers: Arc<WriterLocks>,
        settings: EnrollmentSettings,
    ) -> Self {
        Self {
            enrollments: EnrollmentRepository::new(Arc::clone(&store)),
            users: UserRepository::new(Arc::clone(&store)),
            batches: BatchRepository::new(Arc::clone(&store)),
            otp: OtpService::new(store),
            overrides,
            catalog,
            blobs,
            notifier,
            issuer,
            guard: AccessGuard,
            limiter: RateLimiter::per_minute(settings.submissions_per_minute)
                .trusting(settings.trusted_proxies),
            required: DocumentKind::REQUIRED.to_vec(),
            signed_url_ttl_minutes: settings.signed_url_ttl_minutes,
            writers,
        }
    }

    pub fn required_documents(&self) -> &[DocumentKind] {
        &self.required
    }

    /// Create a new application in `pending_upload`.
    pub async fn submit(
        &self,
        submission: EnrollmentSubmission,
        client: &str,
    ) -> Result<EnrollmentRecord, ServiceError> {
        self.limiter.check(client)?;

        let email = normalize_email(&submission.email);
        let profile = submission.profile;
        if profile.first_name.trim().is_empty() || profile.last_name.trim().is_empty() {
            return Err(ServiceError::validation("First and last name are required."));
        }
        if !is_plausible_email(&email) {
            return Err(ServiceError::validation("A valid email address is required."));
        }
        if profile.contact_no.trim().is_empty() {
            return Err(ServiceError::validation("A contact number is required."));
        }
        let course = self
            .catalog
            .by_title(submission.course.trim())
            .ok_or_else(|| ServiceError::validation(format!("Unknown course '{}'.", submission.course)))?;

        let now = Utc::now();
        let record = EnrollmentRecord {
            id: EnrollmentId::generate(),
            profile,
            email,
            course: course.title.clone(),
            status: EnrollmentStatus::PendingUpload,
            previous_status: None,
            documents: Default::default(),
            batch_id: None,
            batch_start_date: None,
            certificate_issued: false,
            emails_sent: Vec::new(),
            changelog: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.enrollments.insert(&record).await?;
        self.users
            .ensure_applicant(&record.email, &record.applicant_name())
            .await?;

        tracing::info!(enrollment_id = %record.id, course = %record.course, "application submitted");

        self.notifier
            .notify(
                &self.enrollments,
                &record,
                Notification::ApplicationSubmitted {
                    name: record.profile.first_name.clone(),
                    course: record.course.clone(),
                },
            )
            .await;
        self.require(&record.id).await
    }

    pub async fn list(&self, filter: &EnrollmentFilter) -> Result<Vec<EnrollmentRecord>, ServiceError> {
        Ok(self.enrollments.list(filter).await?)
    }

    pub async fn get(&self, id: &EnrollmentId) -> Result<EnrollmentRecord, ServiceError> {
        self.require(id).await
    }

    /// Filtered enrollment list as CSV.
    pub async fn export_csv(&self, filter: &EnrollmentFilter) -> Result<String, ServiceError> {
        let records = self.enrollments.list(filter).await?;
        let mut writer = csv::Writer::from_writer(Vec::new());
        let export_error = |err: csv::Error| ServiceError::Export(err.to_string());

        writer
            .write_record([
                "id",
                "created_at",
                "last_name",
                "first_name",
                "middle_name",
                "email",
                "contact_no",
                "course",
                "status",
                "batch_id",
                "certificate_issued",
            ])
            .map_err(export_error)?;
        for record in &records {
            writer
                .write_record([
                    record.id.as_str(),
                    &record.created_at.to_rfc3339(),
                    &record.profile.last_name,
                    &record.profile.first_name,
                    record.profile.middle_name.as_deref().unwrap_or_default(),
                    &record.email,
                    &record.profile.contact_no,
                    &record.course,
                    record.status.label(),
                    record.batch_id.as_ref().map(|id| id.as_str()).unwrap_or_default(),
                    if record.certificate_issued { "yes" } else { "no" },
                ])
                .map_err(export_error)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|err| ServiceError::Export(err.to_string()))?;
        String::from_utf8(bytes).map_err(|err| ServiceError::Export(err.to_string()))
    }

    /// Staff edit of applicant details and administrative fields.
    pub async fn admin_update(
        &self,
        id: &EnrollmentId,
        fields: Map<String, Value>,
        staff: &StaffIdentity,
    ) -> Result<EnrollmentRecord, ServiceError> {
        if fields.is_empty() {
            return Err(ServiceError::validation("No fields to update."));
        }
        let _writer = self.writers.acquire(id).await;
        let record = self.require(id).await?;
        let mut changes = ChangeRecorder::new(&staff.email);
        let mut update = EnrollmentUpdate::new();
        let mut profile_fields = Map::new();

        for (field, value) in fields {
            match field.as_str() {
                "email" => {
                    let email = normalize_email(expect_str(&field, &value)?);
                    if !is_plausible_email(&email) {
                        return Err(ServiceError::validation("A valid email address is required."));
                    }
                    if changes.record("email", record.email.as_str(), email.as_str()) {
                        update = update.set("email", &email);
                    }
                }
                "course" => {
                    let title = expect_str(&field, &value)?.trim();
                    let course = self.catalog.by_title(title).ok_or_else(|| {
                        ServiceError::validation(format!("Unknown course '{title}'."))
                    })?;
                    if changes.record("course", record.course.as_str(), course.title.as_str()) {
                        update = update.set("course", &course.title);
                    }
                }
                "status" => {
                    let requested: EnrollmentStatus = expect_str(&field, &value)?.parse()?;
                    let status = self.admin_status(&record, requested)?;
                    if changes.record("status", record.status.label(), status.label()) {
                        update = update.status(status);
                    }
                }
                "certificate_issued" => {
                    let issued = value.as_bool().ok_or_else(|| {
                        ServiceError::validation("certificate_issued must be true or false.")
                    })?;
                    if changes.record("certificate_issued", record.certificate_issued, issued) {
                        update = update.set("certificate_issued", issued);
                    }
                }
                _ => {
                    profile_fields.insert(field, value);
                }
            }
        }

        update = self.profile_update(&record, profile_fields, &mut changes, update)?;
        if changes.is_empty() {
            return Ok(record);
        }

        self.enrollments.apply(id, update.changelog(changes)).await?;
        tracing::info!(enrollment_id = %id, by = %staff.email, "enrollment updated");
        self.require(id).await
    }

    /// Status a staff field edit may write. Manual transitions have their own
    /// actions, and auto statuses are re-derived from the documents.
    fn admin_status(
        &self,
        record: &EnrollmentRecord,
        requested: EnrollmentStatus,
    ) -> Result<EnrollmentStatus, ServiceError> {
        match requested {
            EnrollmentStatus::Archived => {
                return Err(ServiceError::validation(
                    "Use the archive action to archive an enrollment.",
                ))
            }
            EnrollmentStatus::PhysicalDocsRequired => {
                return Err(ServiceError::validation(
                    "Use send-interview-schedule to invite a waitlisted applicant.",
                ))
            }
            EnrollmentStatus::Completed => {
                return Err(ServiceError::validation(
                    "Use the complete action to finish an enrollment.",
                ))
            }
            _ => {}
        }
        if matches!(
            record.status,
            EnrollmentStatus::Completed | EnrollmentStatus::Archived
        ) {
            return Err(ServiceError::validation(format!(
                "The status of a {} enrollment cannot be edited.",
                record.status
            )));
        }

        let derived = derive_target(&record.documents, &self.required);
        if requested == EnrollmentStatus::InWaitlist {
            if derived != EnrollmentStatus::InWaitlist {
                return Err(ServiceError::validation(
                    "Every required document must be accepted before waitlisting.",
                ));
            }
            return Ok(requested);
        }
        Ok(recompute(requested, &record.documents, &self.required)
            .target()
            .unwrap_or(requested))
    }

    /// Merge applicant profile fields into `update`, recording each change.
    pub(super) fn profile_update(
        &self,
        record: &EnrollmentRecord,
        fields: Map<String, Value>,
        changes: &mut ChangeRecorder,
        mut update: EnrollmentUpdate,
    ) -> Result<EnrollmentUpdate, ServiceError> {
        if fields.is_empty() {
            return Ok(update);
        }
        let known = ApplicantProfile::field_names();
        let mut merged = match serde_json::to_value(&record.profile) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };

        for (field, value) in fields {
            if !known.iter().any(|name| *name == field) {
                return Err(ServiceError::validation(format!("Unknown field '{field}'.")));
            }
            let old = merged.get(&field).cloned().unwrap_or(Value::Null);
            if changes.record(&field, old, value.clone()) {
                update = update.set(field.as_str(), &value);
                merged.insert(field, value);
            }
        }

        let profile: ApplicantProfile = serde_json::from_value(Value::Object(merged))
            .map_err(|err| ServiceError::validation(format!("Invalid applicant details: {err}")))?;
        if profile.first_name.trim().is_empty() || profile.last_name.trim().is_empty() {
            return Err(ServiceError::validation("First and last name are required."));
        }
        Ok(update)
    }

    pub async fn upload_document(
        &self,
        id: &EnrollmentId,
        kind: DocumentKind,
        source: SlotSource,
        file: UploadedFile,
        actor: &str,
    ) -> Result<EnrollmentRecord, ServiceError> {
        let _writer = self.writers.acquire(id).await;
        let record = self.require(id).await?;
        self.store_upload(record, kind, source, file, actor).await
    }

    pub(super) async fn store_upload(
        &self,
        mut record: EnrollmentRecord,
        kind: DocumentKind,
        source: SlotSource,
        file: UploadedFile,
        actor: &str,
    ) -> Result<EnrollmentRecord, ServiceError> {
        if file.bytes.is_empty() {
            return Err(ServiceError::validation("Uploaded file is empty."));
        }
        let folder = record.storage_folder()?;
        let path = blob_path(&folder, source, kind, &file.filename);
        let content_type = file.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&file.filename)
                .first_or_octet_stream()
                .to_string()
        });

        self.blobs.upload(file.bytes, &path, &content_type).await?;

        let slot = Slot {
            blob_path: path.clone(),
            original_filename: file.filename,
            content_type,
            uploaded_by: actor.to_string(),
            uploaded_at: Utc::now(),
        };
        let new_meta = slot_summary(&slot);
        let replaced = record.documents.entry_mut(kind).place(source, slot);

        if let Some(previous) = &replaced {
            if previous.blob_path != path {
                if let Err(err) = self.blobs.delete(&previous.blob_path).await {
                    tracing::warn!(path = %previous.blob_path, error = %err, "replaced blob not deleted");
                }
            }
        }

        let mut changes = ChangeRecorder::new(actor);
        changes.record(
            &slot_field(kind, source),
            replaced.as_ref().map_or(Value::Null, slot_summary),
            new_meta,
        );
        tracing::info!(enrollment_id = %record.id, document = %kind, source = source.prefix(), "document uploaded");
        self.commit_document(record, kind, changes).await
    }

    pub async fn delete_document(
        &self,
        id: &EnrollmentId,
        kind: DocumentKind,
        source: SlotSource,
        actor: &str,
    ) -> Result<EnrollmentRecord, ServiceError> {
        let _writer = self.writers.acquire(id).await;
        let mut record = self.require(id).await?;
        let has_slot = record
            .documents
            .get(kind)
            .and_then(|entry| entry.slot(source))
            .is_some();
        if !has_slot {
            return Err(ServiceError::not_found(format!(
                "No {} file for {}.",
                source.prefix(),
                kind.label()
            )));
        }

        let Some(removed) = record.documents.entry_mut(kind).clear(source) else {
            return Err(ServiceError::not_found("Document not found."));
        };
        self.blobs.delete(&removed.blob_path).await?;

        let mut changes = ChangeRecorder::new(actor);
        changes.record(&slot_field(kind, source), slot_summary(&removed), Value::Null);
        tracing::info!(enrollment_id = %record.id, document = %kind, source = source.prefix(), "document deleted");
        self.commit_document(record, kind, changes).await
    }

    pub async fn review_document(
        &self,
        id: &EnrollmentId,
        kind: DocumentKind,
        decision: ReviewDecision,
        staff: &StaffIdentity,
    ) -> Result<EnrollmentRecord, ServiceError> {
        if let ReviewDecision::Reject { reason } = &decision {
            if reason.trim().is_empty() {
                return Err(ServiceError::validation("A rejection reason is required."));
            }
        }

        let _writer = self.writers.acquire(id).await;
        let mut record = self.require(id).await?;
        let entry = record.documents.entry_mut(kind);
        let old_label = entry.review.label();
        entry.review(decision.clone(), &staff.email, Utc::now())?;
        let new_label = entry.review.label();

        let mut changes = ChangeRecorder::new(&staff.email);
        let field = format!("documents.{}.review", kind.key());
        match &decision {
            ReviewDecision::Reject { reason } => {
                changes.record_with_note(&field, old_label, new_label, reason.as_str());
            }
            ReviewDecision::Accept => {
                changes.record(&field, old_label, new_label);
            }
        }

        tracing::info!(enrollment_id = %record.id, document = %kind, review = new_label, by = %staff.email, "document reviewed");
        let updated = self.commit_document(record, kind, changes).await?;

        if let ReviewDecision::Reject { reason } = decision {
            self.notifier
                .notify(
                    &self.enrollments,
                    &updated,
                    Notification::DocumentRejected {
                        name: updated.profile.first_name.clone(),
                        document_label: kind.label().to_string(),
                        reason,
                    },
                )
                .await;
        }
        Ok(updated)
    }

    /// Persist one document entry, re-derive the status, and persist the
    /// status if it moved.
    async fn commit_document(
        &self,
        record: EnrollmentRecord,
        kind: DocumentKind,
        mut changes: ChangeRecorder,
    ) -> Result<EnrollmentRecord, ServiceError> {
        let decision = recompute(record.status, &record.documents, &self.required);
        let entry = record.documents.get(kind).cloned().unwrap_or_default();
        let mut update = EnrollmentUpdate::new().document(kind, &entry);

        if let StatusDecision::Advance { from, to } = decision {
            changes.record("status", from.label(), to.label());
            update = update.status(to);
        }
        self.enrollments
            .apply(&record.id, update.changelog(changes))
            .await?;

        let updated = self.require(&record.id).await?;
        if let StatusDecision::Advance { from, to } = decision {
            tracing::info!(enrollment_id = %record.id, from = from.label(), to = to.label(), "status advanced");
            if to == EnrollmentStatus::InWaitlist {
                self.notifier
                    .notify(
                        &self.enrollments,
                        &updated,
                        Notification::InWaitlist {
                            name: updated.profile.first_name.clone(),
                        },
                    )
                    .await;
            }
        }
        Ok(updated)
    }

    /// Every document kind with signed links for populated slots.
    pub async fn documents(&self, id: &EnrollmentId) -> Result<Vec<DocumentView>, ServiceError> {
        let record = self.require(id).await?;
        Ok(self.document_views(&record).await)
    }

    pub(super) async fn document_views(&self, record: &EnrollmentRecord) -> Vec<DocumentView> {
        let mut views = Vec::with_capacity(DocumentKind::ALL.len());
        for kind in DocumentKind::ALL {
            let entry = record.documents.get(kind).cloned().unwrap_or_default();
            views.push(DocumentView {
                kind,
                label: kind.label(),
                required: self.required.contains(&kind),
                applicant_upload: self.sign_slot(entry.applicant_upload).await,
                official_scan: self.sign_slot(entry.official_scan).await,
                review: entry.review,
            });
        }
        views
    }

    async fn sign_slot(&self, slot: Option<Slot>) -> Option<SlotView> {
        sign_slot(self.blobs.as_ref(), slot, self.signed_url_ttl_minutes).await
    }

    /// Invite a waitlisted applicant to bring physical documents. Resending
    /// to an already invited applicant only repeats the mail.
    pub async fn send_interview_schedule(
        &self,
        id: &EnrollmentId,
        staff: &StaffIdentity,
    ) -> Result<EnrollmentRecord, ServiceError> {
        let _writer = self.writers.acquire(id).await;
        let record = self.require(id).await?;
        if !matches!(
            record.status,
            EnrollmentStatus::InWaitlist | EnrollmentStatus::PhysicalDocsRequired
        ) {
            return Err(ServiceError::validation(format!(
                "Interview schedules can only be sent to waitlisted applicants (status is {}).",
                record.status
            )));
        }

        let batch = self
            .batches
            .open_for_course(&record.course)
            .await?
            .filter(|batch| batch.status == BatchStatus::Active)
            .ok_or_else(|| {
                ServiceError::validation(format!(
                    "{} has no active batch yet; its start date is still TBA.",
                    record.course
                ))
            })?;

        if record.status == EnrollmentStatus::InWaitlist {
            let mut changes = ChangeRecorder::new(&staff.email);
            changes.record(
                "status",
                record.status.label(),
                EnrollmentStatus::PhysicalDocsRequired.label(),
            );
            self.enrollments
                .apply(
                    id,
                    EnrollmentUpdate::new()
                        .status(EnrollmentStatus::PhysicalDocsRequired)
                        .changelog(changes),
                )
                .await?;
            tracing::info!(enrollment_id = %id, batch_id = %batch.id, by = %staff.email, "interview schedule sent");
        }

        let updated = self.require(id).await?;
        self.notifier
            .notify(
                &self.enrollments,
                &updated,
                Notification::InterviewSchedule {
                    name: updated.profile.first_name.clone(),
                    course: updated.course.clone(),
                    start_date: batch.start_date.to_string(),
                    enrollment_deadline: batch.enrollment_deadline.map(|date| date.to_string()),
                },
            )
            .await;
        self.require(id).await
    }

    /// Finalize enrollment after physical verification.
    pub async fn complete(
        &self,
        id: &EnrollmentId,
        staff: &StaffIdentity,
    ) -> Result<EnrollmentRecord, ServiceError> {
        let _writer = self.writers.acquire(id).await;
        let record = self.require(id).await?;
        if record.status != EnrollmentStatus::PhysicalDocsRequired {
            return Err(ServiceError::validation(format!(
                "Only applicants with physical documents required can be completed (status is {}).",
                record.status
            )));
        }

        let missing = record.documents.missing_official(&self.required);
        if !missing.is_empty() {
            let labels: Vec<_> = missing.iter().map(|kind| kind.label()).collect();
            return Err(ServiceError::validation(format!(
                "Official scans are still missing for: {}.",
                labels.join(", ")
            )));
        }

        let batch = self
            .batches
            .open_for_course(&record.course)
            .await?
            .ok_or_else(|| {
                ServiceError::validation(format!("{} has no open batch to enroll into.", record.course))
            })?;

        let mut changes = ChangeRecorder::new(&staff.email);
        changes.record(
            "status",
            record.status.label(),
            EnrollmentStatus::Completed.label(),
        );
        changes.record(
            "batch_id",
            record.batch_id.as_ref().map_or(Value::Null, |id| Value::from(id.as_str())),
            batch.id.as_str(),
        );
        let update = EnrollmentUpdate::new()
            .status(EnrollmentStatus::Completed)
            .set("batch_id", &batch.id)
            .set("batch_start_date", batch.start_date)
            .changelog(changes);
        self.enrollments.apply(id, update).await?;

        self.users
            .promote_to_student(&record.email, &record.applicant_name())
            .await?;
        tracing::info!(enrollment_id = %id, batch_id = %batch.id, by = %staff.email, "enrollment completed");

        let updated = self.require(id).await?;
        self.notifier
            .notify(
                &self.enrollments,
                &updated,
                Notification::EnrollmentCompleted {
                    name: updated.profile.first_name.clone(),
                    course: updated.course.clone(),
                    start_date: Some(batch.start_date.to_string()),
                },
            )
            .await;
        self.require(id).await
    }

    pub async fn archive(
        &self,
        id: &EnrollmentId,
        staff: &StaffIdentity,
    ) -> Result<EnrollmentRecord, ServiceError> {
        let _writer = self.writers.acquire(id).await;
        let record = self.require(id).await?;
        if record.status == EnrollmentStatus::Archived {
            return Err(ServiceError::validation("Enrollment is already archived."));
        }

        let mut changes = ChangeRecorder::new(&staff.email);
        changes.record(
            "status",
            record.status.label(),
            EnrollmentStatus::Archived.label(),
        );
        let update = EnrollmentUpdate::new()
            .set("previous_status", record.status)
            .status(EnrollmentStatus::Archived)
            .changelog(changes);
        self.enrollments.apply(id, update).await?;

        tracing::info!(enrollment_id = %id, previous = record.status.label(), by = %staff.email, "enrollment archived");
        self.require(id).await
    }

    /// Restore the status held before archiving.
    pub async fn unarchive(
        &self,
        id: &EnrollmentId,
        staff: &StaffIdentity,
    ) -> Result<EnrollmentRecord, ServiceError> {
        let _writer = self.writers.acquire(id).await;
        let record = self.require(id).await?;
        if record.status != EnrollmentStatus::Archived {
            return Err(ServiceError::validation("Enrollment is not archived."));
        }

        let restored = match record
            .previous_status
            .filter(|status| *status != EnrollmentStatus::Archived)
        {
            Some(previous) => previous,
            None => recompute(
                EnrollmentStatus::PendingUpload,
                &record.documents,
                &self.required,
            )
            .target()
            .unwrap_or(EnrollmentStatus::PendingUpload),
        };

        let mut changes = ChangeRecorder::new(&staff.email);
        changes.record("status", record.status.label(), restored.label());
        let update = EnrollmentUpdate::new()
            .status(restored)
            .remove("previous_status")
            .changelog(changes);
        self.enrollments.apply(id, update).await?;

        tracing::info!(enrollment_id = %id, restored = restored.label(), by = %staff.email, "enrollment unarchived");
        self.require(id).await
    }

    /// Nudge the applicant about their current status.
    pub async fn follow_up(
        &self,
        id: &EnrollmentId,
        staff: &StaffIdentity,
    ) -> Result<Value, ServiceError> {
        let record = self.require(id).await?;
        let sent = self
            .notifier
            .notify(
                &self.enrollments,
                &record,
                Notification::FollowUp {
                    name: record.profile.first_name.clone(),
                    course: record.course.clone(),
                    status_label: record.status.display_label().to_string(),
                },
            )
            .await;
        tracing::info!(enrollment_id = %id, sent, by = %staff.email, "follow-up requested");
        Ok(json!({ "sent": sent, "to": record.email }))
    }

    pub(super) async fn require(&self, id: &EnrollmentId) -> Result<EnrollmentRecord, ServiceError> {
        self.enrollments
            .fetch(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Enrollment not found"))
    }
}

/// Attach a short-lived link to a populated slot. Signing failures leave the
/// link empty.
pub(crate) async fn sign_slot<B: BlobStore>(
    blobs: &B,
    slot: Option<Slot>,
    ttl_minutes: u32,
) -> Option<SlotView> {
    let slot = slot?;
    let file_url = match blobs.sign(&slot.blob_path, ttl_minutes).await {
        Ok(url) => Some(url),
        Err(err) => {
            tracing::warn!(path = %slot.blob_path, error = %err, "could not sign document url");
            None
        }
    };
    Some(SlotView { slot, file_url })
}

fn expect_str<'a>(field: &str, value: &'a Value) -> Result<&'a str, ServiceError> {
    value
        .as_str()
        .ok_or_else(|| ServiceError::validation(format!("{field} must be a string.")))
}

fn slot_field(kind: DocumentKind, source: SlotSource) -> String {
    format!("documents.{}.{}", kind.key(), source.field())
}

fn slot_summary(slot: &Slot) -> Value {
    json!({
        "filename": slot.original_filename,
        "uploaded_by": slot.uploaded_by,
        "uploaded_at": slot.uploaded_at,
    })
}
