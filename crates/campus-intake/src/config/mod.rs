use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Staging,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "staging" | "test" | "ci" => Self::Staging,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub mail: MailConfig,
    pub courses: CourseConfig,
    pub intake: IntakeConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let jwt_secret = env::var("JWT_SECRET_KEY").unwrap_or_default();
        if jwt_secret.is_empty() && environment == AppEnvironment::Production {
            return Err(ConfigError::MissingSecret("JWT_SECRET_KEY"));
        }

        let auth = AuthConfig {
            jwt_secret,
            staff_token_ttl_minutes: number_var("STAFF_TOKEN_TTL_MINUTES", 60)?,
            applicant_token_ttl_minutes: number_var("APPLICANT_TOKEN_TTL_MINUTES", 60)?,
        };

        let storage = StorageConfig {
            blob_root: PathBuf::from(
                env::var("BLOB_ROOT").unwrap_or_else(|_| "./data/blobs".to_string()),
            ),
            public_base_url: env::var("PUBLIC_BLOB_URL")
                .unwrap_or_else(|_| format!("http://{host}:{port}/blobs")),
            signing_secret: blob_signing_secret(environment)?,
            signed_url_ttl_minutes: number_var("SIGNED_URL_TTL_MINUTES", 60)?,
        };

        let mail = MailConfig {
            from_address: env::var("MAIL_FROM_ADDRESS")
                .unwrap_or_else(|_| "noreply@brighthii.com".to_string()),
            admissions_address: env::var("ADMISSIONS_EMAIL")
                .unwrap_or_else(|_| "admissions@brighthii.com".to_string()),
        };

        let courses = CourseConfig {
            override_ttl_hours: number_var("COURSE_OVERRIDE_TTL_HOURS", 24)?,
        };

        let intake = IntakeConfig {
            submissions_per_minute: number_var("SUBMISSION_RATE_LIMIT_PER_MINUTE", 5)?,
            trusted_proxies: trusted_proxies()?,
            instructor_applications_per_minute: number_var(
                "INSTRUCTOR_APPLICATION_RATE_LIMIT_PER_MINUTE",
                5,
            )?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            auth,
            storage,
            mail,
            courses,
            intake,
        })
    }
}

/// Outside production an unset secret is replaced by a random one, so signed
/// links only survive until the process restarts.
fn blob_signing_secret(environment: AppEnvironment) -> Result<String, ConfigError> {
    match env::var("BLOB_SIGNING_SECRET") {
        Ok(secret) if !secret.trim().is_empty() => Ok(secret),
        _ if environment == AppEnvironment::Production => {
            Err(ConfigError::MissingSecret("BLOB_SIGNING_SECRET"))
        }
        _ => Ok(hex::encode(rand::random::<[u8; 32]>())),
    }
}

fn trusted_proxies() -> Result<Vec<IpAddr>, ConfigError> {
    let raw = env::var("TRUSTED_PROXIES").unwrap_or_default();
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<IpAddr>()
                .map_err(|_| ConfigError::InvalidProxy(entry.to_string()))
        })
        .collect()
}

fn number_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber(name)),
        _ => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Bearer credential signing settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub staff_token_ttl_minutes: i64,
    pub applicant_token_ttl_minutes: i64,
}

/// Blob storage location and URL signing.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub blob_root: PathBuf,
    pub public_base_url: String,
    pub signing_secret: String,
    pub signed_url_ttl_minutes: u32,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub from_address: String,
    /// Inbox told about new instructor applications.
    pub admissions_address: String,
}

#[derive(Debug, Clone)]
pub struct CourseConfig {
    pub override_ttl_hours: u64,
}

impl CourseConfig {
    pub fn override_ttl(&self) -> Duration {
        Duration::from_secs(self.override_ttl_hours * 60 * 60)
    }
}

#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub submissions_per_minute: u32,
    /// Peers allowed to report the client address in `X-Forwarded-For`.
    pub trusted_proxies: Vec<IpAddr>,
    pub instructor_applications_per_minute: u32,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber(&'static str),
    InvalidProxy(String),
    MissingSecret(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber(name) => write!(f, "{name} must be a valid number"),
            ConfigError::InvalidProxy(entry) => {
                write!(f, "TRUSTED_PROXIES entry '{entry}' is not an IP address")
            }
            ConfigError::MissingSecret(name) => {
                write!(f, "{name} must be set in production")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber(_)
            | ConfigError::InvalidProxy(_)
            | ConfigError::MissingSecret(_) => None,
        }
    }
}
