use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::changelog::ChangelogEntry;
use super::documents::DocumentSet;
use super::status::EnrollmentStatus;
use crate::notifications::EmailLogEntry;
use crate::workflows::courses::BatchId;

/// Opaque identifier of an enrollment record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnrollmentId(pub String);

impl EnrollmentId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnrollmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EnrollmentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: Option<String>,
    pub barangay: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub region: Option<String>,
}

/// Applicant-supplied identity, contact, and classification fields.
///
/// These are the only fields an applicant credential may ever write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantProfile {
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub suffix: Option<String>,
    pub contact_no: String,
    pub sex: Option<String>,
    pub civil_status: Option<String>,
    pub nationality: Option<String>,
    pub birth_month: Option<String>,
    pub birth_day: Option<String>,
    pub birth_year: Option<String>,
    pub birthplace_city: Option<String>,
    pub birthplace_province: Option<String>,
    pub birthplace_region: Option<String>,
    #[serde(flatten)]
    pub address: Address,
    pub educational_attainment: Option<String>,
    pub employment_status: Option<String>,
    #[serde(default)]
    pub learner_classification: Vec<String>,
    pub classification_other: Option<String>,
}

impl ApplicantProfile {
    /// Wire names of every profile field, address parts included.
    pub fn field_names() -> Vec<String> {
        match serde_json::to_value(Self::default()) {
            Ok(Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn full_name(&self) -> String {
        [
            Some(self.first_name.as_str()),
            self.middle_name.as_deref(),
            Some(self.last_name.as_str()),
            self.suffix.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Stored enrollment application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub id: EnrollmentId,
    #[serde(flatten)]
    pub profile: ApplicantProfile,
    pub email: String,
    /// Catalog title. Enrollments and batches link to courses by this string.
    pub course: String,
    pub status: EnrollmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<EnrollmentStatus>,
    #[serde(default)]
    pub documents: DocumentSet,
    #[serde(default)]
    pub batch_id: Option<BatchId>,
    #[serde(default)]
    pub batch_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub certificate_issued: bool,
    #[serde(default)]
    pub emails_sent: Vec<EmailLogEntry>,
    #[serde(default)]
    pub changelog: Vec<ChangelogEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EnrollmentRecord {
    pub fn applicant_name(&self) -> String {
        self.profile.full_name()
    }

    pub fn storage_folder(&self) -> Result<String, super::documents::DocumentError> {
        super::documents::applicant_folder(
            &self.profile.last_name,
            &self.profile.first_name,
            self.profile.middle_name.as_deref(),
            self.profile.birth_month.as_deref(),
            self.profile.birth_day.as_deref(),
            self.profile.birth_year.as_deref(),
        )
    }
}

/// Body accepted by `POST /enrollments`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnrollmentSubmission {
    #[serde(flatten)]
    pub profile: ApplicantProfile,
    pub email: String,
    pub course: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Applicant,
    Student,
}

impl UserRole {
    pub const fn label(self) -> &'static str {
        match self {
            UserRole::Applicant => "applicant",
            UserRole::Student => "student",
        }
    }
}

/// Person-level account shared by every enrollment under one email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Trimmed, lower-cased email used for every identity comparison.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !email.contains(' ')
        }
        None => false,
    }
}
