use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::{ApplicantScope, AuthError, Credential, StaffIdentity, TokenIssuer};
use crate::error::ServiceError;

/// Request made with a staff bearer token.
#[derive(Debug, Clone)]
pub struct StaffUser(pub StaffIdentity);

/// Request made with an OTP-issued applicant token.
#[derive(Debug, Clone)]
pub struct ApplicantUser(pub ApplicantScope);

fn credential(parts: &Parts) -> Result<Credential, AuthError> {
    let issuer = parts
        .extensions
        .get::<Arc<TokenIssuer>>()
        .ok_or_else(|| AuthError::Invalid("token verification is not configured".to_string()))?;

    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::MissingToken)?;
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)?;

    issuer.verify(token)
}

#[async_trait]
impl<S> FromRequestParts<S> for StaffUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match credential(parts)? {
            Credential::Staff(identity) => Ok(StaffUser(identity)),
            Credential::Applicant(_) => Err(AuthError::Forbidden(
                "staff credentials are required".to_string(),
            )
            .into()),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ApplicantUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match credential(parts)? {
            Credential::Applicant(scope) => Ok(ApplicantUser(scope)),
            Credential::Staff(_) => Err(AuthError::Forbidden(
                "an applicant verification token is required".to_string(),
            )
            .into()),
        }
    }
}
