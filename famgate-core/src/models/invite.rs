use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long an invite code resolves after it is issued.
pub const INVITE_TTL_HOURS: i64 = 48;

/// Short-lived code that resolves to a family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Invite {
    pub code: String,
    pub family_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Invite {
    pub fn new(code: impl Into<String>, family_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            code: code.into(),
            family_id: family_id.into(),
            created_at: now,
            expires_at: now + Duration::hours(INVITE_TTL_HOURS),
        }
    }

    /// Resolvable while `now <= expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}
