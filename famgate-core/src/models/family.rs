use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::role::FilterLevel;
use super::uid_set::UidSet;

/// Family-wide defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FamilySettings {
    pub filter_level: FilterLevel,
}

/// Groups one parent with its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Family {
    pub id: String,
    pub parent_uid: String,
    pub children_uids: UidSet,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<FamilySettings>,
}

impl Family {
    pub fn new(parent_uid: impl Into<String>, filter_level: FilterLevel, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_uid: parent_uid.into(),
            children_uids: UidSet::new(),
            created_at: now,
            settings: Some(FamilySettings { filter_level }),
        }
    }

    /// The family default filter level, MODERATE when no settings are stored.
    pub fn filter_level(&self) -> FilterLevel {
        self.settings.map(|s| s.filter_level).unwrap_or_default()
    }
}
