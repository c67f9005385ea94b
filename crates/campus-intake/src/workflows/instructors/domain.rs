use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::enrollment::ChangelogEntry;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ApplicationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Where an application sits in the admissions team's queue. Any status may
/// follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    #[default]
    New,
    Reviewed,
    Contacted,
    Archived,
}

impl ApplicationStatus {
    pub const ALL: [Self; 4] = [Self::New, Self::Reviewed, Self::Contacted, Self::Archived];

    pub const fn label(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Reviewed => "reviewed",
            Self::Contacted => "contacted",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid status: {0}")]
pub struct UnknownApplicationStatus(pub String);

impl FromStr for ApplicationStatus {
    type Err = UnknownApplicationStatus;

    /// Exact match only; `"New"` is not a status.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.label() == value)
            .ok_or_else(|| UnknownApplicationStatus(value.to_string()))
    }
}

/// Public submission body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstructorApplicationDraft {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub contact_no: String,
    #[serde(default)]
    pub courses_interested: Vec<String>,
    #[serde(default)]
    pub other_courses: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructorApplication {
    pub id: ApplicationId,
    #[serde(flatten)]
    pub details: InstructorApplicationDraft,
    #[serde(default)]
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub changelog: Vec<ChangelogEntry>,
}

impl InstructorApplication {
    pub fn applicant_name(&self) -> String {
        format!("{} {}", self.details.first_name, self.details.last_name)
    }
}
