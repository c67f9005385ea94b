use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Extension, Json, Router,
};
use serde_json::json;

use super::staff::{StaffDraft, StaffRoleChange};
use super::students::EmailChangeRequest;
use super::Directory;
use crate::auth::{StaffUser, TokenIssuer};
use crate::error::ServiceError;
use crate::store::{BlobStore, RecordStore};

type SharedDirectory<S, B> = State<Arc<Directory<S, B>>>;

/// Staff management and the student roster. Every route needs a staff token.
pub fn directory_router<S, B>(directory: Arc<Directory<S, B>>) -> Router
where
    S: RecordStore,
    B: BlobStore,
{
    let issuer = Arc::clone(&directory.issuer);
    Router::new()
        .route("/staff", get(list_staff::<S, B>).post(add_staff::<S, B>))
        .route(
            "/staff/:email",
            put(update_staff::<S, B>).delete(remove_staff::<S, B>),
        )
        .route("/staff/refresh-token", post(refresh_token))
        .route("/students", get(list_students::<S, B>))
        .route("/students/:id", get(student_detail::<S, B>))
        .route("/students/:id/email", patch(change_email::<S, B>))
        .layer(Extension(issuer))
        .with_state(directory)
}

async fn list_staff<S: RecordStore, B: BlobStore>(
    State(directory): SharedDirectory<S, B>,
    StaffUser(_staff): StaffUser,
) -> Result<Response, ServiceError> {
    Ok(Json(directory.staff.list().await?).into_response())
}

async fn add_staff<S: RecordStore, B: BlobStore>(
    State(directory): SharedDirectory<S, B>,
    StaffUser(staff): StaffUser,
    Json(draft): Json<StaffDraft>,
) -> Result<Response, ServiceError> {
    let member = directory.staff.add(draft, &staff).await?;
    Ok((StatusCode::CREATED, Json(member)).into_response())
}

async fn update_staff<S: RecordStore, B: BlobStore>(
    State(directory): SharedDirectory<S, B>,
    StaffUser(staff): StaffUser,
    Path(email): Path<String>,
    Json(change): Json<StaffRoleChange>,
) -> Result<Response, ServiceError> {
    let member = directory.staff.update_role(&email, change, &staff).await?;
    Ok(Json(member).into_response())
}

async fn remove_staff<S: RecordStore, B: BlobStore>(
    State(directory): SharedDirectory<S, B>,
    StaffUser(staff): StaffUser,
    Path(email): Path<String>,
) -> Result<Response, ServiceError> {
    directory.staff.remove(&email, &staff).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Sliding session: a still-valid staff token buys a fresh one.
async fn refresh_token(
    Extension(issuer): Extension<Arc<TokenIssuer>>,
    StaffUser(staff): StaffUser,
) -> Result<Response, ServiceError> {
    let token = issuer.issue_staff(&staff.email, &staff.name)?;
    Ok(Json(json!({ "token": token, "role": "staff" })).into_response())
}

async fn list_students<S: RecordStore, B: BlobStore>(
    State(directory): SharedDirectory<S, B>,
    StaffUser(_staff): StaffUser,
) -> Result<Response, ServiceError> {
    Ok(Json(directory.students.list().await?).into_response())
}

async fn student_detail<S: RecordStore, B: BlobStore>(
    State(directory): SharedDirectory<S, B>,
    StaffUser(_staff): StaffUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    Ok(Json(directory.students.detail(&id).await?).into_response())
}

async fn change_email<S: RecordStore, B: BlobStore>(
    State(directory): SharedDirectory<S, B>,
    StaffUser(staff): StaffUser,
    Path(id): Path<String>,
    Json(request): Json<EmailChangeRequest>,
) -> Result<Response, ServiceError> {
    let change = directory.students.change_email(&id, request, &staff).await?;
    Ok(Json(change).into_response())
}
