//! Merge of open-batch schedule data onto the static catalog, cached for a
//! fixed window and dropped on every batch write.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::Serialize;

use super::batches::{BatchId, BatchRepository, BatchStatus};
use super::catalog::{Catalog, CourseDefinition, Instructor, TBA};
use crate::store::{RecordStore, StoreError};

struct CacheState<T> {
    entry: Option<(Instant, T)>,
    generation: u64,
}

/// Single-value cache with a TTL and explicit invalidation.
///
/// A refresh that started before an `invalidate` does not repopulate the
/// cache, so a writer never reads back data older than its own write.
pub struct OverrideCache<T> {
    ttl: Duration,
    state: Mutex<CacheState<T>>,
}

impl<T> OverrideCache<T>
where
    T: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(CacheState {
                entry: None,
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn get_or_refresh<F, Fut, E>(&self, load: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let generation = {
            let state = self.lock();
            if let Some((loaded_at, value)) = &state.entry {
                if loaded_at.elapsed() < self.ttl {
                    return Ok(value.clone());
                }
            }
            state.generation
        };

        let value = load().await?;

        let mut state = self.lock();
        if state.generation == generation {
            state.entry = Some((Instant::now(), value.clone()));
        }
        Ok(value)
    }

    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.entry = None;
        state.generation += 1;
    }
}

/// Schedule data contributed by a course's open batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseOverride {
    pub batch_id: BatchId,
    pub batch_status: BatchStatus,
    pub start_date: NaiveDate,
    pub enrollment_deadline: Option<NaiveDate>,
    pub instructor: Option<Instructor>,
}

/// Catalog course with its open batch merged in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseView {
    #[serde(flatten)]
    pub course: CourseDefinition,
    pub batch_id: Option<BatchId>,
    pub batch_status: Option<BatchStatus>,
}

impl CourseView {
    pub fn merge(course: &CourseDefinition, open: Option<&CourseOverride>) -> Self {
        let mut merged = course.clone();
        match open {
            Some(open) => {
                merged.start_dates = vec![open.start_date.to_string()];
                merged.enrollment_deadline = open.enrollment_deadline.map(|date| date.to_string());
                if let Some(instructor) = &open.instructor {
                    merged.instructor = instructor.clone();
                }
                Self {
                    course: merged,
                    batch_id: Some(open.batch_id.clone()),
                    batch_status: Some(open.batch_status),
                }
            }
            None => {
                merged.start_dates = vec![TBA.to_string()];
                merged.enrollment_deadline = None;
                Self {
                    course: merged,
                    batch_id: None,
                    batch_status: None,
                }
            }
        }
    }

    /// First concrete start date, if the course is scheduled.
    pub fn start_date(&self) -> Option<&str> {
        self.course
            .start_dates
            .first()
            .map(String::as_str)
            .filter(|date| *date != TBA)
    }
}

pub type OverrideMap = BTreeMap<String, CourseOverride>;

/// Read path for course schedule overrides, keyed by course title.
pub struct CourseOverrides<S> {
    batches: BatchRepository<S>,
    cache: OverrideCache<OverrideMap>,
}

impl<S> CourseOverrides<S>
where
    S: RecordStore,
{
    pub fn new(batches: BatchRepository<S>, ttl: Duration) -> Self {
        Self {
            batches,
            cache: OverrideCache::new(ttl),
        }
    }

    pub async fn get_course_overrides(&self) -> Result<OverrideMap, StoreError> {
        let batches = &self.batches;
        self.cache
            .get_or_refresh(|| async move {
                let mut overrides = OverrideMap::new();
                for batch in batches.open_batches().await? {
                    overrides
                        .entry(batch.course.clone())
                        .or_insert_with(|| CourseOverride {
                            batch_id: batch.id.clone(),
                            batch_status: batch.status,
                            start_date: batch.start_date,
                            enrollment_deadline: batch.enrollment_deadline,
                            instructor: batch.instructor.clone(),
                        });
                }
                Ok(overrides)
            })
            .await
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    pub async fn views(&self, catalog: &Catalog) -> Result<Vec<CourseView>, StoreError> {
        let overrides = self.get_course_overrides().await?;
        Ok(catalog
            .courses()
            .iter()
            .map(|course| CourseView::merge(course, overrides.get(&course.title)))
            .collect())
    }

    pub async fn view_by_title(
        &self,
        catalog: &Catalog,
        title: &str,
    ) -> Result<Option<CourseView>, StoreError> {
        let Some(course) = catalog.by_title(title) else {
            return Ok(None);
        };
        let overrides = self.get_course_overrides().await?;
        Ok(Some(CourseView::merge(course, overrides.get(title))))
    }
}
