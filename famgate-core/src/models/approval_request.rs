use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::role::ApprovalStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    Parent,
    Child,
}

/// Audit record of a registration awaiting (or past) review.
///
/// Never consulted for authorization decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApprovalRequest {
    pub id: String,
    pub uid: String,
    pub kind: RequestKind,
    /// Reviewer the request is addressed to; `None` means any admin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_to: Option<String>,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ApprovalRequest {
    pub fn new(
        uid: impl Into<String>,
        kind: RequestKind,
        requested_to: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            uid: uid.into(),
            kind,
            requested_to,
            status: ApprovalStatus::Pending,
            created_at: now,
            decided_at: None,
            decided_by: None,
            reason: None,
        }
    }

    pub fn decide(
        &mut self,
        status: ApprovalStatus,
        decided_by: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) {
        self.status = status;
        self.decided_by = Some(decided_by.to_string());
        self.decided_at = Some(now);
        self.reason = reason.map(str::to_string);
    }
}
