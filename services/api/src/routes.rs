use crate::infra::{AppState, BlobFiles};
use axum::extract::{Path, Query};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use campus_intake::store::verify_signature;
use serde::Deserialize;
use serde_json::json;
use std::path::{Component, PathBuf};

pub(crate) fn with_platform_routes(router: Router) -> Router {
    router
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/blobs/*path", get(signed_blob))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct SignedLink {
    expires: i64,
    signature: String,
}

/// Serve a stored document when the link's signature and expiry check out.
pub(crate) async fn signed_blob(
    Extension(state): Extension<AppState>,
    Path(path): Path<String>,
    Query(link): Query<SignedLink>,
) -> Response {
    if !verify_signature(&state.blobs.signing_secret, &path, link.expires, &link.signature) {
        return error(StatusCode::FORBIDDEN, "link is invalid or has expired");
    }
    let Some(target) = resolve(&state.blobs, &path) else {
        return error(StatusCode::BAD_REQUEST, "invalid path");
    };

    match tokio::fs::read(&target).await {
        Ok(bytes) => {
            let content_type = mime_guess::from_path(&target).first_or_octet_stream();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type.essence_str().to_string())],
                bytes,
            )
                .into_response()
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            error(StatusCode::NOT_FOUND, "file not found")
        }
        Err(err) => {
            tracing::error!(path = %path, error = %err, "failed to read blob");
            error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

fn resolve(files: &BlobFiles, path: &str) -> Option<PathBuf> {
    let relative = std::path::Path::new(path);
    let safe = !path.is_empty()
        && relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    safe.then(|| files.root.join(relative))
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
