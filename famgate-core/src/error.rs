//! Error types shared by the core services.

use std::fmt;

use thiserror::Error;

use crate::models::{ApprovalStatus, Role};

/// Which collection a missing record was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Profile,
    Family,
    Invite,
    ApprovalRequest,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Profile => write!(f, "profile"),
            RecordKind::Family => write!(f, "family"),
            RecordKind::Invite => write!(f, "invite"),
            RecordKind::ApprovalRequest => write!(f, "approval request"),
        }
    }
}

/// Why a profile may not use the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    Pending,
    Rejected,
    Suspended,
    /// Approved, but the role never grants access (a pending role).
    Role(Role),
}

impl DenialReason {
    /// Maps a non-approved status to its reason.
    pub fn from_status(status: ApprovalStatus) -> Option<Self> {
        match status {
            ApprovalStatus::Pending => Some(DenialReason::Pending),
            ApprovalStatus::Rejected => Some(DenialReason::Rejected),
            ApprovalStatus::Suspended => Some(DenialReason::Suspended),
            ApprovalStatus::Approved => None,
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::Pending => write!(f, "account is awaiting approval"),
            DenialReason::Rejected => write!(f, "account request was rejected"),
            DenialReason::Suspended => write!(f, "account is suspended"),
            DenialReason::Role(role) => write!(f, "role {} cannot access the proxy", role),
        }
    }
}

/// Failure to translate a stored document into a typed record.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("malformed {kind} document '{key}': {source}")]
    Malformed {
        kind: RecordKind,
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{kind} document '{key}' has mismatched id '{found}'")]
    KeyMismatch {
        kind: RecordKind,
        key: String,
        found: String,
    },
}

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A document read inside a transaction changed before commit.
    #[error("transaction conflict on {kind} '{key}'")]
    Conflict { kind: RecordKind, key: String },
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Errors returned by the approval, family, invite and registration services.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: String },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("access denied: {0}")]
    AccessDenied(DenialReason),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    pub fn not_found(kind: RecordKind, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Rejects empty (or whitespace-only) input.
pub fn require_non_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}
