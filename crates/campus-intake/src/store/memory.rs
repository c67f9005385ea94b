use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde_json::{Map, Value};

use super::{Document, FieldUpdate, InsertionOrder, Query, RecordStore, StoreError, StoredDocument};

#[derive(Debug, Default)]
struct Collections {
    sequence: u64,
    collections: HashMap<String, HashMap<String, (u64, Document)>>,
}

/// Process-local [`RecordStore`] with an insertion-order index.
#[derive(Debug, Default, Clone)]
pub struct MemoryRecordStore {
    inner: Arc<Mutex<Collections>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store mutex poisoned".to_string()))
    }

    /// Number of documents currently held in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.lock()
            .map(|guard| guard.collections.get(collection).map_or(0, HashMap::len))
            .unwrap_or(0)
    }
}

impl RecordStore for MemoryRecordStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|(_, doc)| doc.clone()))
    }

    async fn set(&self, collection: &str, id: &str, data: Document) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        guard.sequence += 1;
        let next = guard.sequence;
        let docs = guard.collections.entry(collection.to_string()).or_default();
        let sequence = docs.get(id).map_or(next, |(seq, _)| *seq);
        docs.insert(id.to_string(), (sequence, data));
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: Vec<FieldUpdate>,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let not_found = || StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        };
        let (_, stored) = guard
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(not_found)?;

        // Apply to a scratch copy so a failing update leaves the record untouched.
        let mut working = stored.clone();
        for update in updates {
            apply(&mut working, update)?;
        }
        *stored = working;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if let Some(docs) = guard.collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn query(&self, query: Query) -> Result<Vec<StoredDocument>, StoreError> {
        let guard = self.lock()?;
        let Some(docs) = guard.collections.get(&query.collection) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<(u64, StoredDocument)> = docs
            .iter()
            .filter(|(_, (_, doc))| query.filters.iter().all(|filter| filter.matches(doc)))
            .map(|(id, (seq, doc))| {
                (
                    *seq,
                    StoredDocument {
                        id: id.clone(),
                        data: doc.clone(),
                    },
                )
            })
            .collect();

        matched.sort_by_key(|(seq, _)| *seq);
        if query.order == InsertionOrder::Newest {
            matched.reverse();
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matched.into_iter().take(limit).map(|(_, doc)| doc).collect())
    }
}

fn apply(document: &mut Document, update: FieldUpdate) -> Result<(), StoreError> {
    match update {
        FieldUpdate::Set { path, value } => {
            let (parent, leaf) = parent_mut(document, &path, true)?;
            parent.insert(leaf, value);
        }
        FieldUpdate::Delete { path } => {
            if let Ok((parent, leaf)) = parent_mut(document, &path, false) {
                parent.remove(&leaf);
            }
        }
        FieldUpdate::ArrayUnion { path, values } => {
            let (parent, leaf) = parent_mut(document, &path, true)?;
            let slot = parent
                .entry(leaf)
                .or_insert_with(|| Value::Array(Vec::new()));
            let array = slot
                .as_array_mut()
                .ok_or_else(|| StoreError::NotAnArray(path.clone()))?;
            for value in values {
                if !array.contains(&value) {
                    array.push(value);
                }
            }
        }
        FieldUpdate::ServerTimestamp { path } => {
            let (parent, leaf) = parent_mut(document, &path, true)?;
            parent.insert(leaf, Value::String(Utc::now().to_rfc3339()));
        }
    }
    Ok(())
}

/// Walk to the object holding the last path segment, creating intermediate
/// objects when `create` is set.
fn parent_mut<'a>(
    document: &'a mut Document,
    path: &str,
    create: bool,
) -> Result<(&'a mut Map<String, Value>, String), StoreError> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let leaf = segments
        .pop()
        .filter(|leaf| !leaf.is_empty())
        .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;

    let mut current = document;
    for segment in segments {
        if create && !current.contains_key(segment) {
            current.insert(segment.to_string(), Value::Object(Map::new()));
        }
        current = current
            .get_mut(segment)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
    }

    Ok((current, leaf.to_string()))
}
