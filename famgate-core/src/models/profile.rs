use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::role::{ApprovalStatus, FilterLevel, Role};
use super::uid_set::UidSet;

/// Identity and authorization record, one per user.
///
/// Field names follow the stored document shape (`camelCase`). Unknown
/// fields are rejected when a document is decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub role: Role,
    pub filter_level: FilterLevel,
    pub approval_status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_id: Option<String>,
    #[serde(default, skip_serializing_if = "UidSet::is_empty")]
    pub children_uids: UidSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    fn pending(
        uid: impl Into<String>,
        email: impl Into<String>,
        role: Role,
        filter_level: FilterLevel,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            display_name: None,
            role,
            filter_level,
            approval_status: ApprovalStatus::Pending,
            parent_uid: None,
            family_id: None,
            children_uids: UidSet::new(),
            approved_by: None,
            approved_at: None,
            rejected_reason: None,
            created_at: now,
            updated_at: None,
        }
    }

    /// A freshly registered parent awaiting admin review.
    pub fn pending_parent(
        uid: impl Into<String>,
        email: impl Into<String>,
        filter_level: FilterLevel,
        now: DateTime<Utc>,
    ) -> Self {
        Self::pending(uid, email, Role::PendingParent, filter_level, now)
    }

    /// A freshly registered child awaiting review by `parent_uid`.
    pub fn pending_child(
        uid: impl Into<String>,
        email: impl Into<String>,
        parent_uid: impl Into<String>,
        filter_level: FilterLevel,
        now: DateTime<Utc>,
    ) -> Self {
        let mut profile = Self::pending(uid, email, Role::PendingChild, filter_level, now);
        profile.parent_uid = Some(parent_uid.into());
        profile
    }

    pub fn with_display_name(mut self, name: Option<String>) -> Self {
        self.display_name = name;
        self
    }

    /// Records a reviewer decision that moved this profile to APPROVED.
    pub fn mark_approved(&mut self, role: Role, approved_by: &str, now: DateTime<Utc>) {
        self.role = role;
        self.approval_status = ApprovalStatus::Approved;
        self.approved_by = Some(approved_by.to_string());
        self.approved_at = Some(now);
        self.updated_at = Some(now);
    }

    /// Records a reviewer's rejection of a pending request.
    pub fn mark_rejected(&mut self, reviewer: &str, reason: &str, now: DateTime<Utc>) {
        self.approval_status = ApprovalStatus::Rejected;
        self.rejected_reason = Some(reason.to_string());
        self.approved_by = Some(reviewer.to_string());
        self.approved_at = Some(now);
        self.updated_at = Some(now);
    }

    /// Suspension reuses the rejection reason field.
    pub fn mark_suspended(&mut self, reason: &str, now: DateTime<Utc>) {
        self.approval_status = ApprovalStatus::Suspended;
        self.rejected_reason = Some(reason.to_string());
        self.updated_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_pending_parent() {
        let p = UserProfile::pending_parent("p1", "p@example.com", FilterLevel::Strict, now());

        assert_eq!(p.role, Role::PendingParent);
        assert_eq!(p.approval_status, ApprovalStatus::Pending);
        assert_eq!(p.filter_level, FilterLevel::Strict);
        assert!(p.parent_uid.is_none());
        assert!(p.children_uids.is_empty());
    }

    #[test]
    fn test_pending_child_carries_parent() {
        let c = UserProfile::pending_child("c1", "c@example.com", "p1", FilterLevel::Moderate, now());

        assert_eq!(c.role, Role::PendingChild);
        assert_eq!(c.parent_uid.as_deref(), Some("p1"));
    }

    #[test]
    fn test_document_shape() {
        let p = UserProfile::pending_parent("p1", "p@example.com", FilterLevel::Moderate, now())
            .with_display_name(Some("Pat".to_string()));
        let json = serde_json::to_value(&p).unwrap();

        assert_eq!(json["uid"], "p1");
        assert_eq!(json["displayName"], "Pat");
        assert_eq!(json["role"], "PENDING_PARENT");
        assert_eq!(json["approvalStatus"], "PENDING");
        assert_eq!(json["filterLevel"], "MODERATE");
        assert!(json.get("childrenUids").is_none());
        assert!(json.get("familyId").is_none());
    }

    #[test]
    fn test_mark_rejected_sets_reason() {
        let mut p = UserProfile::pending_parent("p1", "p@example.com", FilterLevel::Moderate, now());
        p.mark_rejected("admin", "unknown applicant", now());

        assert_eq!(p.approval_status, ApprovalStatus::Rejected);
        assert_eq!(p.rejected_reason.as_deref(), Some("unknown applicant"));
        assert_eq!(p.approved_by.as_deref(), Some("admin"));
        assert_eq!(p.role, Role::PendingParent);
    }

    #[test]
    fn test_mark_suspended_reuses_reason_field() {
        let mut p = UserProfile::pending_parent("p1", "p@example.com", FilterLevel::Moderate, now());
        p.mark_approved(Role::Parent, "admin", now());
        p.mark_suspended("abuse", now());

        assert_eq!(p.approval_status, ApprovalStatus::Suspended);
        assert_eq!(p.rejected_reason.as_deref(), Some("abuse"));
        assert_eq!(p.role, Role::Parent);
    }
}
