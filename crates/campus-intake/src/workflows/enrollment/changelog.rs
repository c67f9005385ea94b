//! Append-only audit trail of field changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::FieldUpdate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangelogEntry {
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Collects entries for one mutation, stamped with a single actor and instant.
#[derive(Debug, Clone)]
pub struct ChangeRecorder {
    actor: String,
    at: DateTime<Utc>,
    entries: Vec<ChangelogEntry>,
}

impl ChangeRecorder {
    pub fn new(actor: impl Into<String>) -> Self {
        Self::at(actor, Utc::now())
    }

    pub fn at(actor: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            actor: actor.into(),
            at,
            entries: Vec::new(),
        }
    }

    /// Record a change. Equal values are not a change and are skipped.
    pub fn record(&mut self, field: &str, old: impl Into<Value>, new: impl Into<Value>) -> bool {
        self.push(field, old.into(), new.into(), None)
    }

    pub fn record_with_note(
        &mut self,
        field: &str,
        old: impl Into<Value>,
        new: impl Into<Value>,
        note: impl Into<String>,
    ) -> bool {
        self.push(field, old.into(), new.into(), Some(note.into()))
    }

    fn push(&mut self, field: &str, old: Value, new: Value, note: Option<String>) -> bool {
        if old == new {
            return false;
        }
        self.entries.push(ChangelogEntry {
            field: field.to_string(),
            old_value: old,
            new_value: new,
            updated_by: self.actor.clone(),
            updated_at: self.at,
            note,
        });
        true
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.at
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ChangelogEntry] {
        &self.entries
    }

    /// Store mutation appending every collected entry, if any.
    pub fn into_update(self) -> Option<FieldUpdate> {
        if self.entries.is_empty() {
            return None;
        }
        let values = self
            .entries
            .iter()
            .filter_map(|entry| serde_json::to_value(entry).ok())
            .collect();
        Some(FieldUpdate::append("changelog", values))
    }
}
