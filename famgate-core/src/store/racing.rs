//! Test backend that lands queued writes between a transaction's reads
//! and its commit.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{Collection, DocumentBackend, Filter, MemoryStore, Versioned, Write, WriteBatch};
use crate::document::{encode, Record};
use crate::error::StoreError;

/// A write landed before each of the next `remaining` commits.
struct Queued {
    write: Write,
    remaining: usize,
}

#[derive(Clone, Default)]
pub(crate) struct RacingBackend {
    inner: Arc<MemoryStore>,
    queued: Arc<Mutex<Vec<Queued>>>,
    commits: Arc<AtomicUsize>,
}

impl RacingBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Writes `record` just before the next commit is checked.
    pub(crate) fn before_next_commit<T: Record>(&self, collection: Collection, record: &T) {
        self.before_commits(1, collection, record);
    }

    /// Writes `record` again before each of the next `count` commits.
    pub(crate) fn before_commits<T: Record>(&self, count: usize, collection: Collection, record: &T) {
        let write = Write {
            collection,
            key: record.key().to_string(),
            document: encode(record).unwrap(),
        };
        self.queued.lock().unwrap().push(Queued {
            write,
            remaining: count,
        });
    }

    /// Commits attempted so far, failed ones included.
    pub(crate) fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn take_due(&self) -> Vec<Write> {
        let mut queued = self.queued.lock().unwrap();
        let due = queued.iter().map(|q| q.write.clone()).collect();
        queued.iter_mut().for_each(|q| q.remaining -= 1);
        queued.retain(|q| q.remaining > 0);
        due
    }
}

#[async_trait]
impl DocumentBackend for RacingBackend {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Versioned>, StoreError> {
        self.inner.get(collection, key).await
    }

    async fn set(&self, collection: Collection, key: &str, document: Value) -> Result<(), StoreError> {
        self.inner.set(collection, key, document).await
    }

    async fn append(&self, collection: Collection, document: Value) -> Result<(), StoreError> {
        self.inner.append(collection, document).await
    }

    async fn query(
        &self,
        collection: Collection,
        filters: &[Filter<'_>],
    ) -> Result<Vec<Value>, StoreError> {
        self.inner.query(collection, filters).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        for w in self.take_due() {
            self.inner.set(w.collection, &w.key, w.document).await?;
        }
        self.inner.commit(batch).await
    }
}
