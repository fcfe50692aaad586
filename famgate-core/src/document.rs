//! Typed translation between stored JSON documents and records.
//!
//! Every record type rejects unknown fields and requires its mandatory
//! fields, so a document that does not match the expected shape is an
//! error rather than a partially populated value.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{DocumentError, RecordKind};
use crate::models::{ApprovalRequest, Family, Invite, UserProfile};

/// A record stored as one JSON document.
pub trait Record: Serialize + DeserializeOwned {
    const KIND: RecordKind;

    /// The document key this record is stored under.
    fn key(&self) -> &str;
}

impl Record for UserProfile {
    const KIND: RecordKind = RecordKind::Profile;

    fn key(&self) -> &str {
        &self.uid
    }
}

impl Record for Family {
    const KIND: RecordKind = RecordKind::Family;

    fn key(&self) -> &str {
        &self.id
    }
}

impl Record for Invite {
    const KIND: RecordKind = RecordKind::Invite;

    fn key(&self) -> &str {
        &self.code
    }
}

impl Record for ApprovalRequest {
    const KIND: RecordKind = RecordKind::ApprovalRequest;

    fn key(&self) -> &str {
        &self.id
    }
}

/// Decodes a document stored under `key`.
///
/// Fails if the document is malformed or names a different key.
pub fn decode<T: Record>(key: &str, document: Value) -> Result<T, DocumentError> {
    let record: T = serde_json::from_value(document).map_err(|source| DocumentError::Malformed {
        kind: T::KIND,
        key: key.to_string(),
        source,
    })?;

    if record.key() != key {
        return Err(DocumentError::KeyMismatch {
            kind: T::KIND,
            key: key.to_string(),
            found: record.key().to_string(),
        });
    }

    Ok(record)
}

pub fn encode<T: Record>(record: &T) -> Result<Value, DocumentError> {
    serde_json::to_value(record).map_err(|source| DocumentError::Malformed {
        kind: T::KIND,
        key: record.key().to_string(),
        source,
    })
}
