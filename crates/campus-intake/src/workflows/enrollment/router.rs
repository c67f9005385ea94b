use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::documents::{DocumentKind, ReviewDecision, SlotSource};
use super::domain::{EnrollmentId, EnrollmentSubmission};
use super::repository::EnrollmentFilter;
use super::service::{EnrollmentService, UploadedFile};
use super::status::EnrollmentStatus;
use crate::auth::{ApplicantUser, StaffUser, TokenIssuer};
use crate::error::ServiceError;
use crate::notifications::Mailer;
use crate::store::{BlobStore, RecordStore};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

type SharedService<S, B, M> = State<Arc<EnrollmentService<S, B, M>>>;

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    status: Option<String>,
    course: Option<String>,
}

impl ListParams {
    fn into_filter(self) -> Result<EnrollmentFilter, ServiceError> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(raw) => Some(raw.parse::<EnrollmentStatus>()?),
        };
        Ok(EnrollmentFilter {
            status,
            course: self.course.filter(|course| !course.trim().is_empty()),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct SourceParams {
    source: Option<String>,
}

impl SourceParams {
    fn resolve(&self, default: SlotSource) -> Result<SlotSource, ServiceError> {
        match self.source.as_deref() {
            Some(raw) => Ok(raw.parse()?),
            None => Ok(default),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReviewBody {
    status: String,
    #[serde(default)]
    reject_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OtpSendBody {
    email: String,
}

#[derive(Debug, Deserialize)]
struct OtpVerifyBody {
    email: String,
    code: String,
}

/// Intake submission, staff enrollment management, and the applicant portal.
pub fn enrollment_router<S, B, M>(
    service: Arc<EnrollmentService<S, B, M>>,
    issuer: Arc<TokenIssuer>,
) -> Router
where
    S: RecordStore,
    B: BlobStore,
    M: Mailer,
{
    Router::new()
        .route(
            "/enrollments",
            get(list_enrollments::<S, B, M>).post(submit::<S, B, M>),
        )
        .route("/enrollments/export", get(export::<S, B, M>))
        .route(
            "/enrollments/:id",
            get(get_enrollment::<S, B, M>).patch(update_enrollment::<S, B, M>),
        )
        .route("/enrollments/:id/documents", get(list_documents::<S, B, M>))
        .route(
            "/enrollments/:id/documents/:doc_type",
            post(upload_document::<S, B, M>).delete(delete_document::<S, B, M>),
        )
        .route(
            "/enrollments/:id/documents/:doc_type/review",
            post(review_document::<S, B, M>),
        )
        .route(
            "/enrollments/:id/send-interview-schedule",
            post(send_interview_schedule::<S, B, M>),
        )
        .route("/enrollments/:id/complete", post(complete::<S, B, M>))
        .route("/enrollments/:id/archive", post(archive::<S, B, M>))
        .route("/enrollments/:id/unarchive", post(unarchive::<S, B, M>))
        .route("/enrollments/:id/follow-up", post(follow_up::<S, B, M>))
        .route("/otp/send", post(otp_send::<S, B, M>))
        .route("/otp/verify", post(otp_verify::<S, B, M>))
        .route(
            "/applicant/enrollments/:id",
            get(applicant_enrollment::<S, B, M>).patch(applicant_update::<S, B, M>),
        )
        .route(
            "/applicant/enrollments/:id/documents",
            get(applicant_documents::<S, B, M>),
        )
        .route(
            "/applicant/enrollments/:id/documents/:doc_type",
            post(applicant_upload::<S, B, M>),
        )
        .route("/applicant/my-classes", get(my_classes::<S, B, M>))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(Extension(issuer))
        .with_state(service)
}

async fn submit<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(submission): Json<EnrollmentSubmission>,
) -> Result<Response, ServiceError> {
    let client = service
        .limiter
        .client_key(&headers, connect.map(|ConnectInfo(addr)| addr));
    let record = service.submit(submission, &client).await?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

async fn list_enrollments<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    StaffUser(_staff): StaffUser,
    Query(params): Query<ListParams>,
) -> Result<Response, ServiceError> {
    let records = service.list(&params.into_filter()?).await?;
    Ok(Json(records).into_response())
}

async fn export<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    StaffUser(_staff): StaffUser,
    Query(params): Query<ListParams>,
) -> Result<Response, ServiceError> {
    let body = service.export_csv(&params.into_filter()?).await?;
    Ok((
        [
            (header::CONTENT_TYPE, mime::TEXT_CSV_UTF_8.as_ref()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"enrollments.csv\"",
            ),
        ],
        body,
    )
        .into_response())
}

async fn get_enrollment<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    StaffUser(_staff): StaffUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let record = service.get(&EnrollmentId(id)).await?;
    Ok(Json(record).into_response())
}

async fn update_enrollment<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    StaffUser(staff): StaffUser,
    Path(id): Path<String>,
    Json(fields): Json<Map<String, Value>>,
) -> Result<Response, ServiceError> {
    let record = service
        .admin_update(&EnrollmentId(id), fields, &staff)
        .await?;
    Ok(Json(record).into_response())
}

async fn list_documents<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    StaffUser(_staff): StaffUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let documents = service.documents(&EnrollmentId(id)).await?;
    Ok(Json(documents).into_response())
}

async fn upload_document<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    StaffUser(staff): StaffUser,
    Path((id, doc_type)): Path<(String, String)>,
    Query(params): Query<SourceParams>,
    multipart: Multipart,
) -> Result<Response, ServiceError> {
    let kind: DocumentKind = doc_type.parse()?;
    let source = params.resolve(SlotSource::Official)?;
    let file = read_upload(multipart).await?;
    let record = service
        .upload_document(&EnrollmentId(id), kind, source, file, &staff.email)
        .await?;
    Ok(Json(record).into_response())
}

async fn delete_document<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    StaffUser(staff): StaffUser,
    Path((id, doc_type)): Path<(String, String)>,
    Query(params): Query<SourceParams>,
) -> Result<Response, ServiceError> {
    let kind: DocumentKind = doc_type.parse()?;
    let source = params.resolve(SlotSource::Official)?;
    let record = service
        .delete_document(&EnrollmentId(id), kind, source, &staff.email)
        .await?;
    Ok(Json(record).into_response())
}

async fn review_document<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    StaffUser(staff): StaffUser,
    Path((id, doc_type)): Path<(String, String)>,
    Json(body): Json<ReviewBody>,
) -> Result<Response, ServiceError> {
    let kind: DocumentKind = doc_type.parse()?;
    let decision = ReviewDecision::parse(&body.status, body.reject_reason.as_deref())?;
    let record = service
        .review_document(&EnrollmentId(id), kind, decision, &staff)
        .await?;
    Ok(Json(record).into_response())
}

async fn send_interview_schedule<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    StaffUser(staff): StaffUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let record = service
        .send_interview_schedule(&EnrollmentId(id), &staff)
        .await?;
    Ok(Json(record).into_response())
}

async fn complete<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    StaffUser(staff): StaffUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let record = service.complete(&EnrollmentId(id), &staff).await?;
    Ok(Json(record).into_response())
}

async fn archive<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    StaffUser(staff): StaffUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let record = service.archive(&EnrollmentId(id), &staff).await?;
    Ok(Json(record).into_response())
}

async fn unarchive<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    StaffUser(staff): StaffUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let record = service.unarchive(&EnrollmentId(id), &staff).await?;
    Ok(Json(record).into_response())
}

async fn follow_up<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    StaffUser(staff): StaffUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let outcome = service.follow_up(&EnrollmentId(id), &staff).await?;
    Ok(Json(outcome).into_response())
}

async fn otp_send<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    Json(body): Json<OtpSendBody>,
) -> Result<Response, ServiceError> {
    service.request_code(&body.email).await?;
    Ok(Json(json!({ "message": "Verification code sent." })).into_response())
}

async fn otp_verify<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    Json(body): Json<OtpVerifyBody>,
) -> Result<Response, ServiceError> {
    let verification = service.verify_code(&body.email, &body.code).await?;
    Ok(Json(verification).into_response())
}

async fn applicant_enrollment<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    ApplicantUser(scope): ApplicantUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let view = service
        .applicant_enrollment(&scope, &EnrollmentId(id))
        .await?;
    Ok(Json(view).into_response())
}

async fn applicant_update<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    ApplicantUser(scope): ApplicantUser,
    Path(id): Path<String>,
    Json(fields): Json<Map<String, Value>>,
) -> Result<Response, ServiceError> {
    let view = service
        .applicant_update(&scope, &EnrollmentId(id), fields)
        .await?;
    Ok(Json(view).into_response())
}

async fn applicant_documents<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    ApplicantUser(scope): ApplicantUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let documents = service
        .applicant_documents(&scope, &EnrollmentId(id))
        .await?;
    Ok(Json(documents).into_response())
}

async fn applicant_upload<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    ApplicantUser(scope): ApplicantUser,
    Path((id, doc_type)): Path<(String, String)>,
    Query(params): Query<SourceParams>,
    multipart: Multipart,
) -> Result<Response, ServiceError> {
    let kind: DocumentKind = doc_type.parse()?;
    let source = params.resolve(SlotSource::Applicant)?;
    let file = read_upload(multipart).await?;
    let view = service
        .applicant_upload(&scope, &EnrollmentId(id), kind, source, file)
        .await?;
    Ok(Json(view).into_response())
}

async fn my_classes<S: RecordStore, B: BlobStore, M: Mailer>(
    State(service): SharedService<S, B, M>,
    ApplicantUser(scope): ApplicantUser,
) -> Result<Response, ServiceError> {
    let classes = service.my_classes(&scope).await?;
    Ok(Json(classes).into_response())
}

/// First file part of a multipart body.
async fn read_upload(mut multipart: Multipart) -> Result<UploadedFile, ServiceError> {
    let malformed = |err: axum::extract::multipart::MultipartError| {
        ServiceError::validation(format!("Malformed upload: {err}"))
    };

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(malformed)?;
        return Ok(UploadedFile {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        });
    }
    Err(ServiceError::validation("No file was uploaded."))
}
