//! Document storage for profiles, families, invites and approval requests.
//!
//! Two write paths exist on purpose:
//! - single-record writes ([`Store::put_profile`], [`Store::update_profile`],
//!   ...) overwrite one document, last write wins;
//! - [`Transaction`] stages multi-record writes and commits them only if
//!   every document it read is unchanged (optimistic concurrency).
//!
//! Backends only deal in versioned JSON documents. Translation to typed
//! records happens here via [`crate::document`].

mod memory;
#[cfg(test)]
mod racing;
mod sqlite;

pub use memory::MemoryStore;
#[cfg(test)]
pub(crate) use racing::RacingBackend;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::document::{decode, encode, Record};
use crate::error::{RecordKind, StoreError};
use crate::models::{ApprovalRequest, Family, Invite, UserProfile};

/// Number of attempts a transactional operation makes before giving up
/// on repeated conflicts.
pub const MAX_TRANSACTION_ATTEMPTS: usize = 5;

/// Whether a failed commit should be retried with a fresh transaction.
pub fn should_retry(err: &StoreError, attempt: usize) -> bool {
    matches!(err, StoreError::Conflict { .. }) && attempt < MAX_TRANSACTION_ATTEMPTS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Profiles,
    Families,
    Invites,
    ApprovalRequests,
}

impl Collection {
    pub fn kind(&self) -> RecordKind {
        match self {
            Collection::Profiles => RecordKind::Profile,
            Collection::Families => RecordKind::Family,
            Collection::Invites => RecordKind::Invite,
            Collection::ApprovalRequests => RecordKind::ApprovalRequest,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collection::Profiles => write!(f, "profiles"),
            Collection::Families => write!(f, "families"),
            Collection::Invites => write!(f, "invites"),
            Collection::ApprovalRequests => write!(f, "approval_requests"),
        }
    }
}

/// A stored document with its version.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub version: u64,
    pub document: Value,
}

/// Equality filter on a top-level document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter<'a> {
    pub field: &'a str,
    pub value: &'a str,
}

impl<'a> Filter<'a> {
    pub fn eq(field: &'a str, value: &'a str) -> Self {
        Self { field, value }
    }

    pub fn matches(&self, document: &Value) -> bool {
        document.get(self.field).and_then(Value::as_str) == Some(self.value)
    }
}

/// What a transaction observed about one document when it read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub collection: Collection,
    pub key: String,
    /// `None` means the document must still be absent.
    pub expected_version: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub collection: Collection,
    pub key: String,
    pub document: Value,
}

/// Writes committed together, guarded by the reads they depend on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub preconditions: Vec<Precondition>,
    pub writes: Vec<Write>,
}

impl WriteBatch {
    pub fn precondition_for(&self, collection: Collection, key: &str) -> Option<&Precondition> {
        self.preconditions
            .iter()
            .find(|p| p.collection == collection && p.key == key)
    }
}

/// Raw versioned-document backend.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Reads one keyed document.
    async fn get(&self, collection: Collection, key: &str)
        -> Result<Option<Versioned>, StoreError>;

    /// Overwrites (or creates) one keyed document without any precondition.
    async fn set(&self, collection: Collection, key: &str, document: Value)
        -> Result<(), StoreError>;

    /// Appends a document to an unkeyed, append-only collection.
    async fn append(&self, collection: Collection, document: Value) -> Result<(), StoreError>;

    /// Returns every document matching all filters, in insertion order.
    async fn query(
        &self,
        collection: Collection,
        filters: &[Filter<'_>],
    ) -> Result<Vec<Value>, StoreError>;

    /// Applies the batch atomically if every precondition still holds,
    /// otherwise fails with [`StoreError::Conflict`] and writes nothing.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

/// Typed store handle. Cheap to clone; pass it into every service.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn DocumentBackend>,
}

impl Store {
    pub fn new(backend: impl DocumentBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// An empty in-memory store.
    pub fn memory() -> Self {
        Self::new(MemoryStore::new())
    }

    async fn get_record<T: Record>(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.backend.get(collection, key).await? {
            Some(v) => Ok(Some(decode(key, v.document)?)),
            None => Ok(None),
        }
    }

    async fn put_record<T: Record>(&self, collection: Collection, record: &T) -> Result<(), StoreError> {
        let document = encode(record)?;
        self.backend.set(collection, record.key(), document).await
    }

    async fn query_records<T: Record>(
        &self,
        collection: Collection,
        filters: &[Filter<'_>],
    ) -> Result<Vec<T>, StoreError> {
        let documents = self.backend.query(collection, filters).await?;
        let mut records = Vec::with_capacity(documents.len());
        for document in documents {
            let key = document
                .get(key_field(collection))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            records.push(decode(&key, document)?);
        }
        Ok(records)
    }

    pub async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, StoreError> {
        self.get_record(Collection::Profiles, uid).await
    }

    /// Single-record write. Last write wins.
    pub async fn put_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        self.put_record(Collection::Profiles, profile).await
    }

    /// Reads, mutates and writes back one profile without a precondition.
    ///
    /// Returns `Ok(None)` if the profile does not exist.
    pub async fn update_profile<F>(&self, uid: &str, f: F) -> Result<Option<UserProfile>, StoreError>
    where
        F: FnOnce(&mut UserProfile) + Send,
    {
        let Some(mut profile) = self.get_profile(uid).await? else {
            return Ok(None);
        };
        f(&mut profile);
        self.put_profile(&profile).await?;
        Ok(Some(profile))
    }

    pub async fn query_profiles(&self, filters: &[Filter<'_>]) -> Result<Vec<UserProfile>, StoreError> {
        self.query_records(Collection::Profiles, filters).await
    }

    pub async fn get_family(&self, id: &str) -> Result<Option<Family>, StoreError> {
        self.get_record(Collection::Families, id).await
    }

    /// Single-record write. Last write wins.
    pub async fn put_family(&self, family: &Family) -> Result<(), StoreError> {
        self.put_record(Collection::Families, family).await
    }

    pub async fn query_families(&self, filters: &[Filter<'_>]) -> Result<Vec<Family>, StoreError> {
        self.query_records(Collection::Families, filters).await
    }

    pub async fn append_invite(&self, invite: &Invite) -> Result<(), StoreError> {
        let document = encode(invite)?;
        self.backend.append(Collection::Invites, document).await
    }

    /// Every invite ever issued with `code`, oldest first.
    pub async fn find_invites(&self, code: &str) -> Result<Vec<Invite>, StoreError> {
        self.query_records(Collection::Invites, &[Filter::eq("code", code)])
            .await
    }

    pub async fn put_approval_request(&self, request: &ApprovalRequest) -> Result<(), StoreError> {
        self.put_record(Collection::ApprovalRequests, request).await
    }

    pub async fn query_approval_requests(
        &self,
        filters: &[Filter<'_>],
    ) -> Result<Vec<ApprovalRequest>, StoreError> {
        self.query_records(Collection::ApprovalRequests, filters)
            .await
    }

    /// Starts a multi-record unit of work.
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction {
            backend: self.backend.as_ref(),
            batch: WriteBatch::default(),
        }
    }
}

fn key_field(collection: Collection) -> &'static str {
    match collection {
        Collection::Profiles => "uid",
        Collection::Families | Collection::ApprovalRequests => "id",
        Collection::Invites => "code",
    }
}

/// Optimistic multi-record unit of work.
///
/// Reads go straight to the backend and record the version they saw.
/// Writes are buffered until [`Transaction::commit`]; dropping the
/// transaction discards them.
pub struct Transaction<'a> {
    backend: &'a dyn DocumentBackend,
    batch: WriteBatch,
}

impl Transaction<'_> {
    async fn read<T: Record>(
        &mut self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let current = self.backend.get(collection, key).await?;

        if self.batch.precondition_for(collection, key).is_none() {
            self.batch.preconditions.push(Precondition {
                collection,
                key: key.to_string(),
                expected_version: current.as_ref().map(|v| v.version),
            });
        }

        match current {
            Some(v) => Ok(Some(decode(key, v.document)?)),
            None => Ok(None),
        }
    }

    fn stage<T: Record>(&mut self, collection: Collection, record: &T) -> Result<(), StoreError> {
        let document = encode(record)?;
        let key = record.key().to_string();
        self.batch
            .writes
            .retain(|w| !(w.collection == collection && w.key == key));
        self.batch.writes.push(Write {
            collection,
            key,
            document,
        });
        Ok(())
    }

    pub async fn get_profile(&mut self, uid: &str) -> Result<Option<UserProfile>, StoreError> {
        self.read(Collection::Profiles, uid).await
    }

    pub async fn get_family(&mut self, id: &str) -> Result<Option<Family>, StoreError> {
        self.read(Collection::Families, id).await
    }

    pub fn set_profile(&mut self, profile: &UserProfile) -> Result<(), StoreError> {
        self.stage(Collection::Profiles, profile)
    }

    pub fn set_family(&mut self, family: &Family) -> Result<(), StoreError> {
        self.stage(Collection::Families, family)
    }

    pub fn set_approval_request(&mut self, request: &ApprovalRequest) -> Result<(), StoreError> {
        self.stage(Collection::ApprovalRequests, request)
    }

    /// Number of staged writes.
    pub fn pending_writes(&self) -> usize {
        self.batch.writes.len()
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        if self.batch.writes.is_empty() {
            return Ok(());
        }
        self.backend.commit(self.batch).await
    }
}
