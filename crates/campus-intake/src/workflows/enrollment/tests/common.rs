use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use chrono::NaiveDate;
use serde_json::Value;

use crate::auth::{StaffIdentity, TokenIssuer};
use crate::notifications::{MailError, Mailer, OutgoingMail};
use crate::store::{BlobError, BlobStore, MemoryRecordStore};
use crate::workflows::courses::{
    course_router, Batch, BatchDraft, BatchRepository, Catalog, CourseOverrides, CourseService,
    Instructor,
};
use crate::workflows::directory::{directory_router, Directory};
use crate::workflows::instructors::{instructor_router, InstructorApplications, InstructorSettings};
use crate::workflows::enrollment::{
    enrollment_router, ApplicantProfile, DocumentKind, EnrollmentId, EnrollmentRecord,
    EnrollmentService, EnrollmentSettings, EnrollmentSubmission, Notifier, ReviewDecision,
    SlotSource, UploadedFile, WriterLocks,
};

pub(crate) const CLIENT: &str = "198.51.100.7";
pub(crate) const APPLICANT_EMAIL: &str = "maria.delacruz@example.com";
pub(crate) const BOOKKEEPING: &str = "Bookkeeping NC III";
pub(crate) const ADMISSIONS: &str = "admissions@brighthorizons.test";

pub(crate) fn staff() -> StaffIdentity {
    StaffIdentity {
        email: "registrar@brighthorizons.test".to_string(),
        name: "Registrar".to_string(),
    }
}

pub(crate) fn profile() -> ApplicantProfile {
    ApplicantProfile {
        first_name: "Maria".to_string(),
        middle_name: Some("Santos".to_string()),
        last_name: "Dela Cruz".to_string(),
        contact_no: "09171234567".to_string(),
        sex: Some("Female".to_string()),
        birth_month: Some("March".to_string()),
        birth_day: Some("14".to_string()),
        birth_year: Some("1998".to_string()),
        ..ApplicantProfile::default()
    }
}

pub(crate) fn submission() -> EnrollmentSubmission {
    EnrollmentSubmission {
        profile: profile(),
        email: " Maria.DelaCruz@Example.com".to_string(),
        course: BOOKKEEPING.to_string(),
    }
}

pub(crate) fn pdf(name: &str) -> UploadedFile {
    UploadedFile {
        filename: name.to_string(),
        content_type: Some("application/pdf".to_string()),
        bytes: b"%PDF-1.4 scan".to_vec(),
    }
}

pub(crate) fn batch_draft() -> BatchDraft {
    BatchDraft {
        start_date: NaiveDate::from_ymd_opt(2026, 11, 9).expect("valid date"),
        enrollment_deadline: Some(NaiveDate::from_ymd_opt(2026, 11, 2).expect("valid date")),
        instructor: Some(Instructor {
            name: "Ana Reyes".to_string(),
            title: "Certified TESDA Trainer".to_string(),
        }),
    }
}

#[derive(Default)]
pub(crate) struct MemoryBlobStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryBlobStore {
    pub(crate) fn contains(&self, path: &str) -> bool {
        self.objects
            .lock()
            .expect("blob mutex poisoned")
            .contains_key(path)
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.lock().expect("blob mutex poisoned").len()
    }
}

impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> Result<String, BlobError> {
        self.objects
            .lock()
            .expect("blob mutex poisoned")
            .insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(format!("memory://{path}"))
    }

    async fn sign(&self, path: &str, ttl_minutes: u32) -> Result<String, BlobError> {
        if self.contains(path) {
            Ok(format!("memory://{path}?ttl={ttl_minutes}"))
        } else {
            Err(BlobError::NotFound(path.to_string()))
        }
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        self.objects
            .lock()
            .expect("blob mutex poisoned")
            .remove(path);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl RecordingMailer {
    pub(crate) fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }

    pub(crate) fn templates(&self) -> Vec<&'static str> {
        self.sent().iter().map(|mail| mail.template).collect()
    }

    /// Code from the most recent verification mail to `to`.
    pub(crate) fn last_code(&self, to: &str) -> String {
        let mail = self
            .sent()
            .into_iter()
            .rev()
            .find(|mail| mail.to == to && mail.template == "otp_verification")
            .expect("verification mail sent");
        let start = mail.html_body.find("<strong>").expect("code markup") + "<strong>".len();
        let end = mail.html_body[start..].find("</strong>").expect("code markup") + start;
        mail.html_body[start..end].to_string()
    }
}

impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        self.sent.lock().expect("mailer mutex poisoned").push(mail);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FailingMailer;

impl Mailer for FailingMailer {
    async fn send(&self, _mail: OutgoingMail) -> Result<(), MailError> {
        Err(MailError::Transport("relay offline".to_string()))
    }
}

/// Every workflow service over one in-memory store.
pub(crate) struct Harness<M = RecordingMailer> {
    pub(crate) store: Arc<MemoryRecordStore>,
    pub(crate) blobs: Arc<MemoryBlobStore>,
    pub(crate) mailer: Arc<M>,
    pub(crate) issuer: Arc<TokenIssuer>,
    pub(crate) enrollments: Arc<EnrollmentService<MemoryRecordStore, MemoryBlobStore, M>>,
    pub(crate) courses: Arc<CourseService<MemoryRecordStore, M>>,
    pub(crate) directory: Arc<Directory<MemoryRecordStore, MemoryBlobStore>>,
    pub(crate) instructors: Arc<InstructorApplications<MemoryRecordStore, M>>,
    pub(crate) writers: Arc<WriterLocks>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Harness::with_mailer(RecordingMailer::default())
    }
}

impl<M: Mailer> Harness<M> {
    pub(crate) fn with_mailer(mailer: M) -> Self {
        let store = Arc::new(MemoryRecordStore::new());
        let blobs = Arc::new(MemoryBlobStore::default());
        let mailer = Arc::new(mailer);
        let issuer = Arc::new(TokenIssuer::new("intake-test-secret", 60, 30));
        let catalog = Arc::new(Catalog::standard());
        let overrides = Arc::new(CourseOverrides::new(
            BatchRepository::new(Arc::clone(&store)),
            Duration::from_secs(3600),
        ));
        let notifier = Notifier::new(Arc::clone(&mailer), "admissions@brighthorizons.test");
        let writers = Arc::new(WriterLocks::default());

        let enrollments = Arc::new(EnrollmentService::new(
            Arc::clone(&store),
            Arc::clone(&blobs),
            notifier.clone(),
            Arc::clone(&catalog),
            Arc::clone(&overrides),
            Arc::clone(&issuer),
            Arc::clone(&writers),
            EnrollmentSettings {
                signed_url_ttl_minutes: 15,
                submissions_per_minute: 100,
                ..EnrollmentSettings::default()
            },
        ));
        let directory = Arc::new(Directory::new(
            Arc::clone(&store),
            Arc::clone(&blobs),
            Arc::clone(&issuer),
            15,
            Arc::clone(&writers),
        ));
        let instructors = Arc::new(InstructorApplications::new(
            Arc::clone(&store),
            notifier.clone(),
            InstructorSettings {
                admissions_address: ADMISSIONS.to_string(),
                ..InstructorSettings::default()
            },
        ));
        let courses = Arc::new(CourseService::new(
            Arc::clone(&store),
            catalog,
            overrides,
            notifier,
            Arc::clone(&writers),
        ));

        Self {
            store,
            blobs,
            mailer,
            issuer,
            enrollments,
            courses,
            directory,
            instructors,
            writers,
        }
    }

    pub(crate) fn router(&self) -> Router {
        enrollment_router(Arc::clone(&self.enrollments), Arc::clone(&self.issuer))
            .merge(course_router(Arc::clone(&self.courses), Arc::clone(&self.issuer)))
            .merge(directory_router(Arc::clone(&self.directory)))
            .merge(instructor_router(Arc::clone(&self.instructors), Arc::clone(&self.issuer)))
    }

    pub(crate) fn staff_token(&self) -> String {
        let staff = staff();
        self.issuer
            .issue_staff(&staff.email, &staff.name)
            .expect("staff token")
    }

    pub(crate) fn applicant_token(&self, email: &str, ids: &[&EnrollmentId]) -> String {
        self.issuer
            .issue_applicant(
                email,
                "Maria",
                ids.iter().map(|id| id.to_string()).collect(),
            )
            .expect("applicant token")
    }

    pub(crate) async fn submit(&self) -> EnrollmentRecord {
        self.enrollments
            .submit(submission(), CLIENT)
            .await
            .expect("submission accepted")
    }

    pub(crate) async fn fetch(&self, id: &EnrollmentId) -> EnrollmentRecord {
        self.enrollments.get(id).await.expect("enrollment exists")
    }

    pub(crate) async fn upload_required(
        &self,
        id: &EnrollmentId,
        source: SlotSource,
    ) -> EnrollmentRecord {
        let mut record = None;
        for kind in DocumentKind::REQUIRED {
            record = Some(
                self.enrollments
                    .upload_document(id, kind, source, pdf(&format!("{kind}.pdf")), &staff().email)
                    .await
                    .expect("upload accepted"),
            );
        }
        record.expect("at least one required document")
    }

    pub(crate) async fn accept_required(&self, id: &EnrollmentId) -> EnrollmentRecord {
        let mut record = None;
        for kind in DocumentKind::REQUIRED {
            record = Some(
                self.enrollments
                    .review_document(id, kind, ReviewDecision::Accept, &staff())
                    .await
                    .expect("review accepted"),
            );
        }
        record.expect("at least one required document")
    }

    /// Submitted, uploaded by the applicant, and accepted by staff.
    pub(crate) async fn waitlisted(&self) -> EnrollmentRecord {
        let record = self.submit().await;
        self.upload_required(&record.id, SlotSource::Applicant).await;
        self.accept_required(&record.id).await
    }

    pub(crate) async fn open_batch(&self, slug: &str) -> Batch {
        self.courses
            .create_batch(slug, batch_draft(), &staff())
            .await
            .expect("batch created")
    }
}

pub(crate) fn json_request(method: &str, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(body).expect("json body")))
        .expect("request")
}

pub(crate) fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request")
}

pub(crate) fn multipart_request(uri: &str, token: &str, filename: &str) -> Request<Body> {
    let boundary = "intake-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n%PDF-1.4 scan\r\n--{boundary}--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body))
        .expect("request")
}

pub(crate) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
