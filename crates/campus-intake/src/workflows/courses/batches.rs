use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::Instructor;
use crate::store::{from_document, to_document, Query, RecordStore, StoreError, BATCHES};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub String);

impl BatchId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Active,
    EnrollmentClosed,
    Completed,
}

impl BatchStatus {
    pub const fn label(self) -> &'static str {
        match self {
            BatchStatus::Active => "active",
            BatchStatus::EnrollmentClosed => "enrollment_closed",
            BatchStatus::Completed => "completed",
        }
    }

    /// Active and closing batches still drive the public schedule.
    pub const fn is_open(self) -> bool {
        !matches!(self, BatchStatus::Completed)
    }
}

/// One intake cycle of a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    /// Catalog title, matching `EnrollmentRecord::course`.
    pub course: String,
    pub course_slug: String,
    pub status: BatchStatus,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub enrollment_deadline: Option<NaiveDate>,
    #[serde(default)]
    pub instructor: Option<Instructor>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

/// Body of `POST /courses/{slug}/batches`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchDraft {
    pub start_date: NaiveDate,
    #[serde(default)]
    pub enrollment_deadline: Option<NaiveDate>,
    #[serde(default)]
    pub instructor: Option<Instructor>,
}

/// Body of `PATCH /courses/{slug}/batches/{id}`. Absent fields are kept.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BatchPatch {
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub enrollment_deadline: Option<NaiveDate>,
    #[serde(default)]
    pub instructor: Option<Instructor>,
}

pub struct BatchRepository<S> {
    store: Arc<S>,
}

impl<S> Clone for BatchRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> BatchRepository<S>
where
    S: RecordStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create or replace a batch.
    pub async fn save(&self, batch: &Batch) -> Result<(), StoreError> {
        self.store
            .set(BATCHES, batch.id.as_str(), to_document(batch)?)
            .await
    }

    pub async fn fetch(&self, id: &BatchId) -> Result<Option<Batch>, StoreError> {
        match self.store.get(BATCHES, id.as_str()).await? {
            Some(document) => Ok(Some(from_document(document)?)),
            None => Ok(None),
        }
    }

    /// Every batch of a course, newest first.
    pub async fn for_course(&self, course: &str) -> Result<Vec<Batch>, StoreError> {
        self.run(
            Query::collection(BATCHES)
                .where_eq("course", course)
                .newest_first(),
        )
        .await
    }

    /// The single non-completed batch of a course, if any.
    pub async fn open_for_course(&self, course: &str) -> Result<Option<Batch>, StoreError> {
        Ok(self
            .for_course(course)
            .await?
            .into_iter()
            .find(|batch| batch.status.is_open()))
    }

    pub async fn open_batches(&self) -> Result<Vec<Batch>, StoreError> {
        Ok(self
            .run(Query::collection(BATCHES).newest_first())
            .await?
            .into_iter()
            .filter(|batch| batch.status.is_open())
            .collect())
    }

    async fn run(&self, query: Query) -> Result<Vec<Batch>, StoreError> {
        self.store
            .query(query)
            .await?
            .into_iter()
            .map(|stored| from_document(stored.data))
            .collect()
    }
}
