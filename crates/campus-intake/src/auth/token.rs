use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::{ApplicantScope, AuthError, Credential, StaffIdentity};
use crate::config::AuthConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    Staff,
    Applicant,
}

/// JWT claims shared by both credential kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub kind: CredentialKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enrollment_ids: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 bearer tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    staff_ttl: Duration,
    applicant_ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("staff_ttl", &self.staff_ttl)
            .field("applicant_ttl", &self.applicant_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: &str, staff_ttl_minutes: i64, applicant_ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            staff_ttl: Duration::minutes(staff_ttl_minutes),
            applicant_ttl: Duration::minutes(applicant_ttl_minutes),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            config.staff_token_ttl_minutes,
            config.applicant_token_ttl_minutes,
        )
    }

    pub fn issue_staff(&self, email: &str, name: &str) -> Result<String, AuthError> {
        self.encode(email, name, CredentialKind::Staff, Vec::new(), self.staff_ttl)
    }

    pub fn issue_applicant(
        &self,
        email: &str,
        name: &str,
        enrollment_ids: Vec<String>,
    ) -> Result<String, AuthError> {
        self.encode(
            email,
            name,
            CredentialKind::Applicant,
            enrollment_ids,
            self.applicant_ttl,
        )
    }

    fn encode(
        &self,
        sub: &str,
        name: &str,
        kind: CredentialKind,
        enrollment_ids: Vec<String>,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: sub.to_string(),
            name: name.to_string(),
            kind,
            enrollment_ids,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| AuthError::Signing(err.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "exp", "iat"]);

        jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(err.to_string()),
            })
    }

    pub fn verify(&self, token: &str) -> Result<Credential, AuthError> {
        let claims = self.decode(token)?;
        Ok(match claims.kind {
            CredentialKind::Staff => Credential::Staff(StaffIdentity {
                email: claims.sub,
                name: claims.name,
            }),
            CredentialKind::Applicant => Credential::Applicant(ApplicantScope {
                email: claims.sub,
                name: claims.name,
                enrollment_ids: claims.enrollment_ids,
            }),
        })
    }
}
