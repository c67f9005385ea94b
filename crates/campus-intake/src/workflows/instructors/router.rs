use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Map, Value};

use super::domain::{ApplicationId, InstructorApplicationDraft};
use super::service::InstructorApplications;
use crate::auth::{StaffUser, TokenIssuer};
use crate::error::ServiceError;
use crate::notifications::Mailer;
use crate::store::RecordStore;

type SharedApplications<S, M> = State<Arc<InstructorApplications<S, M>>>;

/// Public submission plus the staff review queue.
pub fn instructor_router<S, M>(
    applications: Arc<InstructorApplications<S, M>>,
    issuer: Arc<TokenIssuer>,
) -> Router
where
    S: RecordStore,
    M: Mailer,
{
    Router::new()
        .route(
            "/instructor-applications",
            post(submit::<S, M>).get(list::<S, M>),
        )
        .route(
            "/instructor-applications/:id",
            get(fetch::<S, M>)
                .patch(update::<S, M>)
                .delete(remove::<S, M>),
        )
        .layer(Extension(issuer))
        .with_state(applications)
}

async fn submit<S: RecordStore, M: Mailer>(
    State(applications): SharedApplications<S, M>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(draft): Json<InstructorApplicationDraft>,
) -> Result<Response, ServiceError> {
    let client = applications
        .limiter
        .client_key(&headers, connect.map(|ConnectInfo(addr)| addr));
    let application = applications.submit(draft, &client).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Application submitted successfully",
            "id": application.id,
        })),
    )
        .into_response())
}

async fn list<S: RecordStore, M: Mailer>(
    State(applications): SharedApplications<S, M>,
    StaffUser(_staff): StaffUser,
) -> Result<Response, ServiceError> {
    Ok(Json(applications.list().await?).into_response())
}

async fn fetch<S: RecordStore, M: Mailer>(
    State(applications): SharedApplications<S, M>,
    StaffUser(_staff): StaffUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    Ok(Json(applications.get(&ApplicationId(id)).await?).into_response())
}

async fn update<S: RecordStore, M: Mailer>(
    State(applications): SharedApplications<S, M>,
    StaffUser(staff): StaffUser,
    Path(id): Path<String>,
    Json(fields): Json<Map<String, Value>>,
) -> Result<Response, ServiceError> {
    let changes = applications
        .update(&ApplicationId(id), fields, &staff)
        .await?;
    Ok(Json(changes).into_response())
}

async fn remove<S: RecordStore, M: Mailer>(
    State(applications): SharedApplications<S, M>,
    StaffUser(staff): StaffUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    applications.delete(&ApplicationId(id), &staff).await?;
    Ok(Json(json!({ "message": "Application deleted" })).into_response())
}
