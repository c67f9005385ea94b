//! One-time email verification codes that gate applicant self-service.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::ServiceError;
use crate::store::{from_document, to_document, FieldUpdate, RecordStore, StoreError, OTP_CODES};

pub const OTP_EXPIRY_MINUTES: i64 = 10;
pub const OTP_MAX_ATTEMPTS: u32 = 5;
pub const OTP_RESEND_COOLDOWN_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OtpRecord {
    email: String,
    code_hash: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    attempts: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("Please wait before requesting another code.")]
    Cooldown,
    #[error("No verification code found. Please request a new one.")]
    NoCode,
    #[error("Verification code has expired. Please request a new one.")]
    Expired,
    #[error("Too many failed attempts. Please request a new code.")]
    TooManyAttempts,
    #[error("Invalid code. {remaining} attempts remaining.")]
    Mismatch { remaining: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<OtpError> for ServiceError {
    fn from(value: OtpError) -> Self {
        match value {
            OtpError::Cooldown => ServiceError::RateLimited(value.to_string()),
            OtpError::Store(err) => ServiceError::Store(err),
            other => ServiceError::Validation(other.to_string()),
        }
    }
}

/// Issues and checks codes keyed by normalized email. Only a digest of each
/// code is stored.
pub struct OtpService<S> {
    store: Arc<S>,
}

impl<S> OtpService<S>
where
    S: RecordStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Generate and persist a fresh code, returning the plain code for mailing.
    pub async fn issue(&self, email: &str) -> Result<String, OtpError> {
        self.issue_at(email, Utc::now()).await
    }

    pub(crate) async fn issue_at(&self, email: &str, now: DateTime<Utc>) -> Result<String, OtpError> {
        if let Some(existing) = self.load(email).await? {
            if now - existing.created_at < Duration::seconds(OTP_RESEND_COOLDOWN_SECS) {
                return Err(OtpError::Cooldown);
            }
        }

        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
        let record = OtpRecord {
            email: email.to_string(),
            code_hash: digest(email, &code),
            created_at: now,
            expires_at: now + Duration::minutes(OTP_EXPIRY_MINUTES),
            attempts: 0,
        };
        self.store
            .set(OTP_CODES, email, to_document(&record)?)
            .await?;
        Ok(code)
    }

    /// Consume a code. Success deletes it; a wrong code burns one attempt.
    pub async fn verify(&self, email: &str, code: &str) -> Result<(), OtpError> {
        self.verify_at(email, code, Utc::now()).await
    }

    pub(crate) async fn verify_at(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(), OtpError> {
        let record = self.load(email).await?.ok_or(OtpError::NoCode)?;

        if now > record.expires_at {
            self.store.delete(OTP_CODES, email).await?;
            return Err(OtpError::Expired);
        }
        if record.attempts >= OTP_MAX_ATTEMPTS {
            self.store.delete(OTP_CODES, email).await?;
            return Err(OtpError::TooManyAttempts);
        }
        if !matches_hash(&digest(email, code.trim()), &record.code_hash) {
            let attempts = record.attempts + 1;
            self.store
                .update(
                    OTP_CODES,
                    email,
                    vec![FieldUpdate::set("attempts", attempts.into())],
                )
                .await?;
            return Err(OtpError::Mismatch {
                remaining: OTP_MAX_ATTEMPTS.saturating_sub(attempts),
            });
        }

        self.store.delete(OTP_CODES, email).await?;
        Ok(())
    }

    /// Drop a code whose delivery failed so the applicant can retry at once.
    pub async fn discard(&self, email: &str) -> Result<(), OtpError> {
        self.store.delete(OTP_CODES, email).await?;
        Ok(())
    }

    async fn load(&self, email: &str) -> Result<Option<OtpRecord>, OtpError> {
        match self.store.get(OTP_CODES, email).await? {
            Some(document) => Ok(Some(from_document(document)?)),
            None => Ok(None),
        }
    }
}

fn matches_hash(computed: &str, stored: &str) -> bool {
    computed.len() == stored.len() && bool::from(computed.as_bytes().ct_eq(stored.as_bytes()))
}

fn digest(email: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}
