//! In-memory document backend.
//!
//! Thread-safe via an internal RwLock. Used by tests and anywhere a
//! throwaway store is enough.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Collection, DocumentBackend, Filter, Versioned, WriteBatch};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Collections {
    /// Keyed collections. Within a collection, insertion order is kept
    /// through `order`.
    keyed: HashMap<Collection, HashMap<String, Versioned>>,
    order: HashMap<Collection, Vec<String>>,
    /// Append-only collections.
    appended: HashMap<Collection, Vec<Value>>,
}

impl Collections {
    fn version_of(&self, collection: Collection, key: &str) -> Option<u64> {
        self.keyed
            .get(&collection)
            .and_then(|docs| docs.get(key))
            .map(|v| v.version)
    }

    fn put(&mut self, collection: Collection, key: &str, document: Value) {
        let docs = self.keyed.entry(collection).or_default();
        match docs.get_mut(key) {
            Some(existing) => {
                existing.version += 1;
                existing.document = document;
            }
            None => {
                docs.insert(
                    key.to_string(),
                    Versioned {
                        version: 1,
                        document,
                    },
                );
                self.order
                    .entry(collection)
                    .or_default()
                    .push(key.to_string());
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Collections> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collections> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DocumentBackend for MemoryStore {
    async fn get(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<Versioned>, StoreError> {
        Ok(self
            .read()
            .keyed
            .get(&collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    async fn set(
        &self,
        collection: Collection,
        key: &str,
        document: Value,
    ) -> Result<(), StoreError> {
        self.write().put(collection, key, document);
        Ok(())
    }

    async fn append(&self, collection: Collection, document: Value) -> Result<(), StoreError> {
        self.write()
            .appended
            .entry(collection)
            .or_default()
            .push(document);
        Ok(())
    }

    async fn query(
        &self,
        collection: Collection,
        filters: &[Filter<'_>],
    ) -> Result<Vec<Value>, StoreError> {
        let inner = self.read();
        let matches_all = |doc: &Value| filters.iter().all(|f| f.matches(doc));

        let mut results = Vec::new();
        if let Some(docs) = inner.appended.get(&collection) {
            results.extend(docs.iter().filter(|d| matches_all(d)).cloned());
        }
        if let (Some(docs), Some(order)) = (inner.keyed.get(&collection), inner.order.get(&collection)) {
            for key in order {
                if let Some(v) = docs.get(key) {
                    if matches_all(&v.document) {
                        results.push(v.document.clone());
                    }
                }
            }
        }
        Ok(results)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut inner = self.write();

        for p in &batch.preconditions {
            if inner.version_of(p.collection, &p.key) != p.expected_version {
                tracing::debug!(
                    "Precondition failed on {} '{}' (expected {:?})",
                    p.collection,
                    p.key,
                    p.expected_version
                );
                return Err(StoreError::Conflict {
                    kind: p.collection.kind(),
                    key: p.key.clone(),
                });
            }
        }

        for w in batch.writes {
            inner.put(w.collection, &w.key, w.document);
        }

        Ok(())
    }
}
