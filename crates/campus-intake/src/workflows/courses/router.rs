use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Extension, Json, Router,
};

use super::batches::{BatchDraft, BatchId, BatchPatch};
use super::service::CourseService;
use crate::auth::{StaffUser, TokenIssuer};
use crate::error::ServiceError;
use crate::notifications::Mailer;
use crate::store::RecordStore;

type SharedService<S, M> = State<Arc<CourseService<S, M>>>;

/// Public course listing plus staff batch management.
pub fn course_router<S, M>(service: Arc<CourseService<S, M>>, issuer: Arc<TokenIssuer>) -> Router
where
    S: RecordStore,
    M: Mailer,
{
    Router::new()
        .route("/courses", get(list_courses::<S, M>))
        .route("/courses/:slug", get(get_course::<S, M>))
        .route("/courses/category/:category", get(courses_in_category::<S, M>))
        .route("/categories", get(categories::<S, M>))
        .route("/courses-summary", get(summary::<S, M>))
        .route(
            "/courses/:slug/batches",
            get(list_batches::<S, M>).post(create_batch::<S, M>),
        )
        .route("/courses/:slug/batches/:batch_id", patch(edit_batch::<S, M>))
        .route(
            "/courses/:slug/batches/:batch_id/close-enrollment",
            post(close_enrollment::<S, M>),
        )
        .route(
            "/courses/:slug/batches/:batch_id/close",
            post(close_batch::<S, M>),
        )
        .layer(Extension(issuer))
        .with_state(service)
}

async fn list_courses<S: RecordStore, M: Mailer>(
    State(service): SharedService<S, M>,
) -> Result<Response, ServiceError> {
    Ok(Json(service.courses().await?).into_response())
}

async fn get_course<S: RecordStore, M: Mailer>(
    State(service): SharedService<S, M>,
    Path(slug): Path<String>,
) -> Result<Response, ServiceError> {
    Ok(Json(service.course(&slug).await?).into_response())
}

async fn categories<S: RecordStore, M: Mailer>(
    State(service): SharedService<S, M>,
) -> Json<Vec<String>> {
    Json(service.categories())
}

async fn courses_in_category<S: RecordStore, M: Mailer>(
    State(service): SharedService<S, M>,
    Path(category): Path<String>,
) -> Result<Response, ServiceError> {
    Ok(Json(service.courses_in_category(&category).await?).into_response())
}

async fn summary<S: RecordStore, M: Mailer>(
    State(service): SharedService<S, M>,
    StaffUser(_staff): StaffUser,
) -> Result<Response, ServiceError> {
    Ok(Json(service.summary().await?).into_response())
}

async fn list_batches<S: RecordStore, M: Mailer>(
    State(service): SharedService<S, M>,
    StaffUser(_staff): StaffUser,
    Path(slug): Path<String>,
) -> Result<Response, ServiceError> {
    Ok(Json(service.batches(&slug).await?).into_response())
}

async fn create_batch<S: RecordStore, M: Mailer>(
    State(service): SharedService<S, M>,
    StaffUser(staff): StaffUser,
    Path(slug): Path<String>,
    Json(draft): Json<BatchDraft>,
) -> Result<Response, ServiceError> {
    let batch = service.create_batch(&slug, draft, &staff).await?;
    Ok((StatusCode::CREATED, Json(batch)).into_response())
}

async fn edit_batch<S: RecordStore, M: Mailer>(
    State(service): SharedService<S, M>,
    StaffUser(staff): StaffUser,
    Path((slug, batch_id)): Path<(String, String)>,
    Json(patch): Json<BatchPatch>,
) -> Result<Response, ServiceError> {
    let batch = service
        .edit_batch(&slug, &BatchId(batch_id), patch, &staff)
        .await?;
    Ok(Json(batch).into_response())
}

async fn close_enrollment<S: RecordStore, M: Mailer>(
    State(service): SharedService<S, M>,
    StaffUser(staff): StaffUser,
    Path((slug, batch_id)): Path<(String, String)>,
) -> Result<Response, ServiceError> {
    let closure = service
        .close_enrollment(&slug, &BatchId(batch_id), &staff)
        .await?;
    Ok(Json(closure).into_response())
}

async fn close_batch<S: RecordStore, M: Mailer>(
    State(service): SharedService<S, M>,
    StaffUser(staff): StaffUser,
    Path((slug, batch_id)): Path<(String, String)>,
) -> Result<Response, ServiceError> {
    let batch = service.close_batch(&slug, &BatchId(batch_id), &staff).await?;
    Ok(Json(batch).into_response())
}
