use std::future::Future;
use std::path::{Component, Path, PathBuf};

use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Object storage for uploaded document files.
pub trait BlobStore: Send + Sync + 'static {
    /// Store `bytes` at `path` and return its public URL.
    fn upload(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> impl Future<Output = Result<String, BlobError>> + Send;

    /// Time-limited read URL for `path`.
    fn sign(
        &self,
        path: &str,
        ttl_minutes: u32,
    ) -> impl Future<Output = Result<String, BlobError>> + Send;

    fn delete(&self, path: &str) -> impl Future<Output = Result<(), BlobError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob path '{0}' is not allowed")]
    InvalidPath(String),
    #[error("blob '{0}' not found")]
    NotFound(String),
    #[error("blob signing key is not configured")]
    SigningKey,
    #[error("blob io failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Filesystem-backed [`BlobStore`] used by the API service.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
    signing_secret: String,
}

impl LocalBlobStore {
    pub fn new(
        root: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
        signing_secret: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            signing_secret: signing_secret.into(),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url, path)
    }
}

impl BlobStore for LocalBlobStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> Result<String, BlobError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        tracing::debug!(path, content_type, "blob stored");
        Ok(self.public_url(path))
    }

    async fn sign(&self, path: &str, ttl_minutes: u32) -> Result<String, BlobError> {
        let target = self.resolve(path)?;
        if !tokio::fs::try_exists(&target).await? {
            return Err(BlobError::NotFound(path.to_string()));
        }
        let expires = (Utc::now() + Duration::minutes(i64::from(ttl_minutes))).timestamp();
        let signature = hex::encode(signer(&self.signing_secret, path, expires)?.finalize().into_bytes());
        Ok(format!(
            "{}?expires={expires}&signature={signature}",
            self.public_url(path)
        ))
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn signer(secret: &str, path: &str, expires: i64) -> Result<HmacSha256, BlobError> {
    if secret.is_empty() {
        return Err(BlobError::SigningKey);
    }
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| BlobError::SigningKey)?;
    mac.update(path.as_bytes());
    mac.update(b"|");
    mac.update(expires.to_string().as_bytes());
    Ok(mac)
}

/// Check a signed URL's parameters against the secret and the current time.
pub fn verify_signature(secret: &str, path: &str, expires: i64, provided: &str) -> bool {
    if expires < Utc::now().timestamp() {
        return false;
    }
    let Ok(provided) = hex::decode(provided) else {
        return false;
    };
    signer(secret, path, expires)
        .map(|mac| mac.verify_slice(&provided).is_ok())
        .unwrap_or(false)
}
