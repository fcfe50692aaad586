//! Approval state machine.
//!
//! Moves profiles between role/status combinations:
//!
//! ```text
//! (PENDING_PARENT, PENDING) --approve--> (PARENT, APPROVED)   + new Family
//! (PENDING_CHILD,  PENDING) --approve--> (CHILD,  APPROVED)   + family membership
//! (PENDING_*,      PENDING) --reject---> (PENDING_*, REJECTED)
//! (any,            any)     --suspend--> (same role, SUSPENDED)
//! (any,            any)     --unsuspend> (same role, APPROVED)
//! ```
//!
//! Approvals touch several records and run as optimistic transactions.
//! Rejections, suspensions and unsuspensions are single-record writes and
//! may race with an approval; the last write wins.
//!
//! No permission checks happen here. Callers decide whether the actor may
//! act on the target (admins on anyone, parents on their own children).

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{require_non_empty, Error, RecordKind, Result};
use crate::family::new_family_for;
use crate::models::{
    ApprovalRequest, ApprovalStatus, Family, RequestKind, Role, UserProfile,
};
use crate::store::{should_retry, Filter, Store, Transaction};

pub struct ApprovalService {
    store: Store,
    clock: Arc<dyn Clock>,
}

impl ApprovalService {
    pub fn new(store: Store, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Approves a pending parent, creating their family.
    ///
    /// The family and the parent's `familyId` are committed together or
    /// not at all. A parent that already has a family is rejected with
    /// [`Error::InvalidState`], so repeated approvals never create a
    /// second family.
    pub async fn approve_parent_request(&self, admin_id: &str, parent_id: &str) -> Result<Family> {
        require_non_empty(admin_id, "admin id")?;
        require_non_empty(parent_id, "parent id")?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let now = self.clock.now();
            let decision = self.pending_request(parent_id, RequestKind::Parent).await?;

            let mut tx = self.store.transaction();
            let family = stage_parent_approval(&mut tx, admin_id, parent_id, now).await?;
            if let Some(mut request) = decision {
                request.decide(ApprovalStatus::Approved, admin_id, None, now);
                tx.set_approval_request(&request)?;
            }

            match tx.commit().await {
                Ok(()) => {
                    tracing::info!(
                        "Approved parent {} (family {}) by {}",
                        parent_id,
                        family.id,
                        admin_id
                    );
                    return Ok(family);
                }
                Err(e) if should_retry(&e, attempt) => {
                    tracing::warn!("Retrying parent approval for {}: {}", parent_id, e);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Rejects a pending parent. Single-record write.
    pub async fn reject_parent_request(
        &self,
        admin_id: &str,
        parent_id: &str,
        reason: &str,
    ) -> Result<UserProfile> {
        self.reject(admin_id, parent_id, reason, RequestKind::Parent)
            .await
    }

    /// Approves a pending child into the parent's family.
    ///
    /// The child's role/status/links, the parent's `childrenUids` and the
    /// family's `childrenUids` commit as one unit. Approving an already
    /// approved child succeeds again without duplicating membership.
    pub async fn approve_child_request(&self, parent_id: &str, child_id: &str) -> Result<UserProfile> {
        require_non_empty(parent_id, "parent id")?;
        require_non_empty(child_id, "child id")?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let now = self.clock.now();
            let decision = self.pending_request(child_id, RequestKind::Child).await?;

            let mut tx = self.store.transaction();

            let mut parent = tx
                .get_profile(parent_id)
                .await?
                .ok_or_else(|| Error::not_found(RecordKind::Profile, parent_id))?;
            let mut child = tx
                .get_profile(child_id)
                .await?
                .ok_or_else(|| Error::not_found(RecordKind::Profile, child_id))?;
            let family_id = parent.family_id.clone().ok_or_else(|| {
                Error::InvalidState(format!("parent {} has no family", parent_id))
            })?;
            let mut family = tx
                .get_family(&family_id)
                .await?
                .ok_or_else(|| Error::not_found(RecordKind::Family, &family_id))?;

            if !matches!(child.role, Role::PendingChild | Role::Child) {
                return Err(Error::InvalidState(format!(
                    "profile {} has role {} and cannot be approved as a child",
                    child_id, child.role
                )));
            }
            if let Some(existing) = child.parent_uid.as_deref() {
                if existing != parent_id {
                    return Err(Error::InvalidState(format!(
                        "child {} belongs to parent {}, not {}",
                        child_id, existing, parent_id
                    )));
                }
            }

            child.mark_approved(Role::Child, parent_id, now);
            child.parent_uid = Some(parent_id.to_string());
            child.family_id = Some(family.id.clone());

            let added_to_parent = parent.children_uids.insert(child_id);
            let added_to_family = family.children_uids.insert(child_id);
            if added_to_parent {
                parent.updated_at = Some(now);
            }

            tx.set_profile(&child)?;
            if added_to_parent {
                tx.set_profile(&parent)?;
            }
            if added_to_family {
                tx.set_family(&family)?;
            }
            if let Some(mut request) = decision {
                request.decide(ApprovalStatus::Approved, parent_id, None, now);
                tx.set_approval_request(&request)?;
            }

            match tx.commit().await {
                Ok(()) => {
                    tracing::info!(
                        "Approved child {} into family {} by {}",
                        child_id,
                        family.id,
                        parent_id
                    );
                    return Ok(child);
                }
                Err(e) if should_retry(&e, attempt) => {
                    tracing::warn!("Retrying child approval for {}: {}", child_id, e);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Rejects a pending child. Single-record write on the child only.
    pub async fn reject_child_request(
        &self,
        parent_id: &str,
        child_id: &str,
        reason: &str,
    ) -> Result<UserProfile> {
        self.reject(parent_id, child_id, reason, RequestKind::Child)
            .await
    }

    /// Suspends any account. Single-record write; the reason is stored in
    /// the rejection reason field.
    pub async fn suspend_user(&self, actor_id: &str, target_id: &str, reason: &str) -> Result<UserProfile> {
        require_non_empty(actor_id, "actor id")?;
        require_non_empty(target_id, "target id")?;
        require_non_empty(reason, "reason")?;

        let now = self.clock.now();
        let profile = self
            .store
            .update_profile(target_id, |p| p.mark_suspended(reason, now))
            .await?
            .ok_or_else(|| Error::not_found(RecordKind::Profile, target_id))?;

        tracing::info!("Suspended {} by {}: {}", target_id, actor_id, reason);
        Ok(profile)
    }

    /// Restores an account to APPROVED.
    ///
    /// The previous status is not remembered, so this always lands on
    /// APPROVED even if the account was never approved before it was
    /// suspended.
    pub async fn unsuspend_user(&self, target_id: &str) -> Result<UserProfile> {
        require_non_empty(target_id, "target id")?;

        let now = self.clock.now();
        let mut previous = None;
        let profile = self
            .store
            .update_profile(target_id, |p| {
                previous = Some(p.approval_status);
                p.approval_status = ApprovalStatus::Approved;
                p.updated_at = Some(now);
            })
            .await?
            .ok_or_else(|| Error::not_found(RecordKind::Profile, target_id))?;

        if previous != Some(ApprovalStatus::Suspended) {
            tracing::warn!(
                "Unsuspended {} which was {:?}, now APPROVED",
                target_id,
                previous
            );
        } else {
            tracing::info!("Unsuspended {}", target_id);
        }
        Ok(profile)
    }

    /// Parents awaiting an admin decision, oldest first.
    pub async fn pending_parent_requests(&self) -> Result<Vec<UserProfile>> {
        Ok(self
            .store
            .query_profiles(&[
                Filter::eq("role", "PENDING_PARENT"),
                Filter::eq("approvalStatus", "PENDING"),
            ])
            .await?)
    }

    /// Children awaiting a decision from `parent_id`, oldest first.
    pub async fn pending_child_requests(&self, parent_id: &str) -> Result<Vec<UserProfile>> {
        Ok(self
            .store
            .query_profiles(&[
                Filter::eq("role", "PENDING_CHILD"),
                Filter::eq("approvalStatus", "PENDING"),
                Filter::eq("parentUid", parent_id),
            ])
            .await?)
    }

    async fn reject(
        &self,
        reviewer_id: &str,
        target_id: &str,
        reason: &str,
        kind: RequestKind,
    ) -> Result<UserProfile> {
        require_non_empty(reviewer_id, "reviewer id")?;
        require_non_empty(target_id, "target id")?;
        require_non_empty(reason, "reason")?;

        let now = self.clock.now();
        let profile = self
            .store
            .update_profile(target_id, |p| p.mark_rejected(reviewer_id, reason, now))
            .await?
            .ok_or_else(|| Error::not_found(RecordKind::Profile, target_id))?;

        if let Some(mut request) = self.pending_request(target_id, kind).await? {
            request.decide(ApprovalStatus::Rejected, reviewer_id, Some(reason), now);
            self.store.put_approval_request(&request).await?;
        }

        tracing::info!("Rejected {} by {}: {}", target_id, reviewer_id, reason);
        Ok(profile)
    }

    /// The most recent undecided audit record for `uid`, if any.
    async fn pending_request(&self, uid: &str, kind: RequestKind) -> Result<Option<ApprovalRequest>> {
        let kind = match kind {
            RequestKind::Parent => "PARENT",
            RequestKind::Child => "CHILD",
        };
        let mut requests = self
            .store
            .query_approval_requests(&[
                Filter::eq("uid", uid),
                Filter::eq("kind", kind),
                Filter::eq("status", "PENDING"),
            ])
            .await?;
        Ok(requests.pop())
    }
}

/// Reads the parent, creates its family and stages both writes.
async fn stage_parent_approval(
    tx: &mut Transaction<'_>,
    admin_id: &str,
    parent_id: &str,
    now: DateTime<Utc>,
) -> Result<Family> {
    let mut parent = tx
        .get_profile(parent_id)
        .await?
        .ok_or_else(|| Error::not_found(RecordKind::Profile, parent_id))?;

    if let Some(existing) = parent.family_id.as_deref() {
        return Err(Error::InvalidState(format!(
            "parent {} already has family {}",
            parent_id, existing
        )));
    }
    if !matches!(parent.role, Role::PendingParent | Role::Parent) {
        return Err(Error::InvalidState(format!(
            "profile {} has role {} and cannot be approved as a parent",
            parent_id, parent.role
        )));
    }

    let filter_level = parent.filter_level;
    let family = new_family_for(&mut parent, filter_level, now);
    parent.mark_approved(Role::Parent, admin_id, now);

    tx.set_family(&family)?;
    tx.set_profile(&parent)?;
    Ok(family)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::models::FilterLevel;
    use crate::error::StoreError;
    use crate::store::{Collection, RacingBackend, MAX_TRANSACTION_ATTEMPTS};

    fn setup() -> (Store, ApprovalService) {
        let store = Store::memory();
        let service = ApprovalService::new(store.clone(), Arc::new(SystemClock));
        (store, service)
    }

    async fn put_pending_parent(store: &Store, uid: &str) -> UserProfile {
        let parent = UserProfile::pending_parent(uid, format!("{}@example.com", uid), FilterLevel::Strict, Utc::now());
        store.put_profile(&parent).await.unwrap();
        parent
    }

    #[tokio::test]
    async fn test_reject_parent_keeps_role() {
        let (store, service) = setup();
        put_pending_parent(&store, "p1").await;

        let rejected = service
            .reject_parent_request("admin", "p1", "could not verify")
            .await
            .unwrap();

        assert_eq!(rejected.role, Role::PendingParent);
        assert_eq!(rejected.approval_status, ApprovalStatus::Rejected);
        assert_eq!(rejected.rejected_reason.as_deref(), Some("could not verify"));
        assert_eq!(rejected.approved_by.as_deref(), Some("admin"));
        assert!(rejected.family_id.is_none());
        assert!(store.query_families(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reject_child_touches_only_the_child() {
        let (store, service) = setup();
        let mut parent = put_pending_parent(&store, "p1").await;
        parent.mark_approved(Role::Parent, "admin", Utc::now());
        store.put_profile(&parent).await.unwrap();
        let child = UserProfile::pending_child("c1", "c1@example.com", "p1", FilterLevel::Moderate, Utc::now());
        store.put_profile(&child).await.unwrap();

        let rejected = service.reject_child_request("p1", "c1", "not mine").await.unwrap();

        assert_eq!(rejected.role, Role::PendingChild);
        assert_eq!(rejected.approval_status, ApprovalStatus::Rejected);
        assert_eq!(store.get_profile("p1").await.unwrap().unwrap(), parent);
    }

    #[tokio::test]
    async fn test_reject_requires_reason() {
        let (store, service) = setup();
        put_pending_parent(&store, "p1").await;

        let err = service.reject_parent_request("admin", "p1", "").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let stored = store.get_profile("p1").await.unwrap().unwrap();
        assert_eq!(stored.approval_status, ApprovalStatus::Pending);
    }

    #[tokio::test]
    async fn test_suspend_stores_reason_and_keeps_role() {
        let (store, service) = setup();
        let mut parent = put_pending_parent(&store, "p1").await;
        parent.mark_approved(Role::Parent, "admin", Utc::now());
        store.put_profile(&parent).await.unwrap();

        let suspended = service.suspend_user("admin", "p1", "abuse").await.unwrap();

        assert_eq!(suspended.role, Role::Parent);
        assert_eq!(suspended.approval_status, ApprovalStatus::Suspended);
        assert_eq!(suspended.rejected_reason.as_deref(), Some("abuse"));
        assert_eq!(store.get_profile("p1").await.unwrap().unwrap(), suspended);
    }

    #[tokio::test]
    async fn test_unsuspend_lands_on_approved_from_any_status() {
        let (store, service) = setup();
        put_pending_parent(&store, "p1").await;
        service.reject_parent_request("admin", "p1", "no").await.unwrap();
        service.suspend_user("admin", "p1", "later").await.unwrap();

        let restored = service.unsuspend_user("p1").await.unwrap();

        assert_eq!(restored.approval_status, ApprovalStatus::Approved);
        assert_eq!(restored.role, Role::PendingParent);

        // Not suspended at all: still forced to APPROVED.
        put_pending_parent(&store, "p2").await;
        let restored = service.unsuspend_user("p2").await.unwrap();
        assert_eq!(restored.approval_status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn test_unsuspend_missing_profile() {
        let (_store, service) = setup();
        let err = service.unsuspend_user("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: RecordKind::Profile, .. }));
    }

    #[tokio::test]
    async fn test_parent_approval_loses_race_to_other_approval() {
        let backend = RacingBackend::new();
        let store = Store::new(backend.clone());
        let service = ApprovalService::new(store.clone(), Arc::new(SystemClock));
        let mut winner = put_pending_parent(&store, "p1").await;

        // Another admin approves p1 after our read but before our commit.
        let family = new_family_for(&mut winner, FilterLevel::Strict, Utc::now());
        winner.mark_approved(Role::Parent, "admin-b", Utc::now());
        backend.before_next_commit(Collection::Families, &family);
        backend.before_next_commit(Collection::Profiles, &winner);

        let err = service
            .approve_parent_request("admin-a", "p1")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(backend.commits(), 1);
        let families = store.query_families(&[]).await.unwrap();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].id, family.id);
        let parent = store.get_profile("p1").await.unwrap().unwrap();
        assert_eq!(parent.family_id, Some(family.id.clone()));
        assert_eq!(parent.approved_by.as_deref(), Some("admin-b"));
    }

    #[tokio::test]
    async fn test_child_approval_retries_after_conflicting_write() {
        let backend = RacingBackend::new();
        let store = Store::new(backend.clone());
        let service = ApprovalService::new(store.clone(), Arc::new(SystemClock));
        put_pending_parent(&store, "p1").await;
        let family = service.approve_parent_request("admin", "p1").await.unwrap();
        let child = UserProfile::pending_child("c1", "c1@example.com", "p1", FilterLevel::Moderate, Utc::now());
        store.put_profile(&child).await.unwrap();

        // A second child joins the family between our read and commit.
        let mut raced = store.get_family(&family.id).await.unwrap().unwrap();
        raced.children_uids.insert("c0");
        backend.before_next_commit(Collection::Families, &raced);

        let approved = service.approve_child_request("p1", "c1").await.unwrap();

        assert_eq!(approved.role, Role::Child);
        assert_eq!(backend.commits(), 3);
        let stored = store.get_family(&family.id).await.unwrap().unwrap();
        let members: Vec<_> = stored.children_uids.iter().collect();
        assert_eq!(members, vec!["c0", "c1"]);
    }

    #[tokio::test]
    async fn test_retries_stop_after_max_attempts() {
        let backend = RacingBackend::new();
        let store = Store::new(backend.clone());
        let service = ApprovalService::new(store.clone(), Arc::new(SystemClock));
        let parent = put_pending_parent(&store, "p1").await;

        // Every attempt is beaten by a rewrite of the parent.
        let renamed = parent.with_display_name(Some("Pat".into()));
        backend.before_commits(MAX_TRANSACTION_ATTEMPTS, Collection::Profiles, &renamed);
        let err = service.approve_parent_request("admin", "p1").await.unwrap_err();

        assert!(matches!(err, Error::Store(StoreError::Conflict { .. })));
        assert_eq!(backend.commits(), MAX_TRANSACTION_ATTEMPTS);
        assert!(store.query_families(&[]).await.unwrap().is_empty());
    }
}
