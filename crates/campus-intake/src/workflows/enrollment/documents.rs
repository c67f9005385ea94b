//! Per-document upload slots and review verdicts.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Month, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Document kinds collected during enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    BirthCertificate,
    EducationalCredentials,
    GovernmentId,
    IdPhoto,
    MarriageCertificate,
}

impl DocumentKind {
    pub const ALL: [Self; 5] = [
        Self::BirthCertificate,
        Self::EducationalCredentials,
        Self::GovernmentId,
        Self::IdPhoto,
        Self::MarriageCertificate,
    ];

    pub const REQUIRED: [Self; 3] = [
        Self::BirthCertificate,
        Self::EducationalCredentials,
        Self::GovernmentId,
    ];

    pub const fn key(self) -> &'static str {
        match self {
            Self::BirthCertificate => "birth_certificate",
            Self::EducationalCredentials => "educational_credentials",
            Self::GovernmentId => "government_id",
            Self::IdPhoto => "id_photo",
            Self::MarriageCertificate => "marriage_certificate",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::BirthCertificate => "PSA Birth Certificate",
            Self::EducationalCredentials => "Diploma / Transcript of Records",
            Self::GovernmentId => "Valid Government ID",
            Self::IdPhoto => "1x1 ID Photo",
            Self::MarriageCertificate => "Marriage Certificate",
        }
    }

    pub const fn is_required(self) -> bool {
        matches!(
            self,
            Self::BirthCertificate | Self::EducationalCredentials | Self::GovernmentId
        )
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for DocumentKind {
    type Err = DocumentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.key() == value.trim())
            .ok_or_else(|| DocumentError::UnknownKind(value.to_string()))
    }
}

/// Which of the two upload slots a file lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotSource {
    Applicant,
    Official,
}

impl SlotSource {
    pub const fn field(self) -> &'static str {
        match self {
            Self::Applicant => "applicant_upload",
            Self::Official => "official_scan",
        }
    }

    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Applicant => "applicant",
            Self::Official => "official",
        }
    }
}

impl FromStr for SlotSource {
    type Err = DocumentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "applicant" | "applicant_upload" => Ok(Self::Applicant),
            "official" | "official_scan" => Ok(Self::Official),
            other => Err(DocumentError::UnknownSource(other.to_string())),
        }
    }
}

/// A stored file occupying one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub blob_path: String,
    pub original_filename: String,
    pub content_type: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReviewState {
    #[default]
    Pending,
    Uploaded,
    Accepted {
        reviewed_by: String,
        reviewed_at: DateTime<Utc>,
    },
    Rejected {
        reviewed_by: String,
        reviewed_at: DateTime<Utc>,
        reason: String,
    },
}

impl ReviewState {
    pub const fn label(&self) -> &'static str {
        match self {
            ReviewState::Pending => "pending",
            ReviewState::Uploaded => "uploaded",
            ReviewState::Accepted { .. } => "accepted",
            ReviewState::Rejected { .. } => "rejected",
        }
    }
}

/// Staff verdict on a submitted document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Accept,
    Reject { reason: String },
}

impl ReviewDecision {
    /// Parse the wire form (`accepted` / `rejected` plus optional reason).
    pub fn parse(status: &str, reason: Option<&str>) -> Result<Self, DocumentError> {
        match status.trim() {
            "accepted" => Ok(Self::Accept),
            "rejected" => {
                let reason = reason.map(str::trim).unwrap_or_default();
                if reason.is_empty() {
                    return Err(DocumentError::MissingReason);
                }
                Ok(Self::Reject {
                    reason: reason.to_string(),
                })
            }
            other => Err(DocumentError::InvalidDecision(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DocumentEntry {
    #[serde(default)]
    pub applicant_upload: Option<Slot>,
    #[serde(default)]
    pub official_scan: Option<Slot>,
    #[serde(default)]
    pub review: ReviewState,
}

impl DocumentEntry {
    pub fn has_file(&self) -> bool {
        self.applicant_upload.is_some() || self.official_scan.is_some()
    }

    pub fn slot(&self, source: SlotSource) -> Option<&Slot> {
        match source {
            SlotSource::Applicant => self.applicant_upload.as_ref(),
            SlotSource::Official => self.official_scan.as_ref(),
        }
    }

    fn slot_mut(&mut self, source: SlotSource) -> &mut Option<Slot> {
        match source {
            SlotSource::Applicant => &mut self.applicant_upload,
            SlotSource::Official => &mut self.official_scan,
        }
    }

    /// Put a file in a slot, returning whatever it replaced. Official scans come
    /// from a trusted source and are accepted on arrival.
    pub fn place(&mut self, source: SlotSource, slot: Slot) -> Option<Slot> {
        self.review = match source {
            SlotSource::Official => ReviewState::Accepted {
                reviewed_by: slot.uploaded_by.clone(),
                reviewed_at: slot.uploaded_at,
            },
            SlotSource::Applicant => ReviewState::Uploaded,
        };
        self.slot_mut(source).replace(slot)
    }

    /// Empty a slot. A verdict cannot outlive the files it was about.
    pub fn clear(&mut self, source: SlotSource) -> Option<Slot> {
        let removed = self.slot_mut(source).take();
        if removed.is_none() {
            return None;
        }

        if !self.has_file() {
            self.review = ReviewState::Pending;
        } else if source == SlotSource::Official
            && matches!(self.review, ReviewState::Accepted { .. })
        {
            self.review = ReviewState::Uploaded;
        }
        removed
    }

    pub fn review(
        &mut self,
        decision: ReviewDecision,
        reviewer: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DocumentError> {
        if !self.has_file() {
            return Err(DocumentError::NothingToReview);
        }
        self.review = match decision {
            ReviewDecision::Accept => ReviewState::Accepted {
                reviewed_by: reviewer.to_string(),
                reviewed_at: at,
            },
            ReviewDecision::Reject { reason } => ReviewState::Rejected {
                reviewed_by: reviewer.to_string(),
                reviewed_at: at,
                reason,
            },
        };
        Ok(())
    }
}

/// Every document entry of an enrollment keyed by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct DocumentSet(BTreeMap<DocumentKind, DocumentEntry>);

impl DocumentSet {
    pub fn get(&self, kind: DocumentKind) -> Option<&DocumentEntry> {
        self.0.get(&kind)
    }

    pub fn entry_mut(&mut self, kind: DocumentKind) -> &mut DocumentEntry {
        self.0.entry(kind).or_default()
    }

    pub fn insert(&mut self, kind: DocumentKind, entry: DocumentEntry) {
        self.0.insert(kind, entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DocumentKind, &DocumentEntry)> {
        self.0.iter()
    }

    /// Required kinds lacking a physically verified scan.
    pub fn missing_official(&self, required: &[DocumentKind]) -> Vec<DocumentKind> {
        required
            .iter()
            .copied()
            .filter(|kind| {
                self.get(*kind)
                    .map_or(true, |entry| entry.official_scan.is_none())
            })
            .collect()
    }
}

/// Folder holding every file of one applicant: `Last_First_Middle_YYYY-MM-DD`.
///
/// The birth month may be a month name (`March`, `Mar`) or a number.
pub fn applicant_folder(
    last_name: &str,
    first_name: &str,
    middle_name: Option<&str>,
    birth_month: Option<&str>,
    birth_day: Option<&str>,
    birth_year: Option<&str>,
) -> Result<String, DocumentError> {
    fn present(value: Option<&str>) -> Option<&str> {
        value.map(str::trim).filter(|value| !value.is_empty())
    }
    let (Some(month), Some(day), Some(year)) =
        (present(birth_month), present(birth_day), present(birth_year))
    else {
        return Err(DocumentError::IncompleteBirthdate);
    };

    let month = month
        .parse::<Month>()
        .map(|month| month.number_from_month())
        .or_else(|_| month.parse::<u32>())
        .map_err(|_| DocumentError::IncompleteBirthdate)?;
    let day = day
        .parse::<u32>()
        .map_err(|_| DocumentError::IncompleteBirthdate)?;
    let year = year
        .parse::<i32>()
        .map_err(|_| DocumentError::IncompleteBirthdate)?;
    let birthdate =
        NaiveDate::from_ymd_opt(year, month, day).ok_or(DocumentError::IncompleteBirthdate)?;

    if last_name.trim().is_empty() || first_name.trim().is_empty() {
        return Err(DocumentError::MissingName);
    }

    let mut parts = vec![last_name, first_name];
    if let Some(middle) = middle_name.filter(|middle| !middle.trim().is_empty()) {
        parts.push(middle);
    }
    let formatted = birthdate.format("%Y-%m-%d").to_string();
    parts.push(&formatted);

    Ok(sanitize_segment(&parts.join("_")))
}

/// `{folder}/{slot-prefix}_{kind}.{ext}`
pub fn blob_path(folder: &str, source: SlotSource, kind: DocumentKind, filename: &str) -> String {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());
    format!("{folder}/{}_{}.{extension}", source.prefix(), kind.key())
}

fn sanitize_segment(raw: &str) -> String {
    let mut folder = String::with_capacity(raw.len());
    for c in raw.chars() {
        let keep = c.is_alphanumeric() || c == '-';
        let next = if keep { c } else { '_' };
        if next == '_' && folder.ends_with('_') {
            continue;
        }
        folder.push(next);
    }
    folder.trim_matches('_').to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("unknown document type '{0}'")]
    UnknownKind(String),
    #[error("unknown document source '{0}', expected applicant or official")]
    UnknownSource(String),
    #[error("review status must be accepted or rejected, found '{0}'")]
    InvalidDecision(String),
    #[error("a rejection reason is required")]
    MissingReason,
    #[error("document has not been uploaded")]
    NothingToReview,
    #[error("birth month, day and year are required before documents can be stored")]
    IncompleteBirthdate,
    #[error("first and last name are required before documents can be stored")]
    MissingName,
}
