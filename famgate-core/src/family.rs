//! Family aggregate: one parent, its children and shared settings.
//!
//! Membership is mirrored in three places (the family's `childrenUids`,
//! the parent's `childrenUids` and the child's `familyId`). Every change
//! to membership updates all three in one transaction.
//!
//! Read APIs treat the profiles as authoritative: [`FamilyManager::get_family_children`]
//! queries CHILD profiles by `familyId` rather than trusting the family's
//! own list.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{Error, RecordKind, Result};
use crate::models::{Family, FilterLevel, Role, UserProfile};
use crate::store::{should_retry, Filter, Store};

/// Builds a family owned by `parent` and links the parent to it.
pub(crate) fn new_family_for(
    parent: &mut UserProfile,
    filter_level: FilterLevel,
    now: DateTime<Utc>,
) -> Family {
    let family = Family::new(parent.uid.clone(), filter_level, now);
    parent.family_id = Some(family.id.clone());
    parent.updated_at = Some(now);
    family
}

pub struct FamilyManager {
    store: Store,
    clock: Arc<dyn Clock>,
}

impl FamilyManager {
    pub fn new(store: Store, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Creates an empty family with MODERATE filtering for `parent_id`.
    pub async fn create_family(&self, parent_id: &str) -> Result<Family> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let now = self.clock.now();
            let mut tx = self.store.transaction();

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

            let family = new_family_for(&mut parent, FilterLevel::Moderate, now);
            tx.set_family(&family)?;
            tx.set_profile(&parent)?;

            match tx.commit().await {
                Ok(()) => {
                    tracing::info!("Created family {} for {}", family.id, parent_id);
                    return Ok(family);
                }
                Err(e) if should_retry(&e, attempt) => {
                    tracing::warn!("Retrying family creation for {}: {}", parent_id, e);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Adds `child_id` to the family and mirrors it on both profiles.
    ///
    /// Only CHILD profiles that are unattached or already linked
    /// to this family's parent can join. Moving a child between families
    /// is an [`Error::InvalidState`].
    pub async fn add_child_to_family(&self, family_id: &str, child_id: &str) -> Result<Family> {
        self.change_membership(family_id, child_id, Membership::Add)
            .await
    }

    /// Removes `child_id` from the family and both mirrors. Removing a
    /// non-member succeeds without writing anything.
    ///
    /// The child profile is left detached: still CHILD with its
    /// `parentUid`, but with no `familyId`.
    pub async fn remove_child_from_family(&self, family_id: &str, child_id: &str) -> Result<Family> {
        self.change_membership(family_id, child_id, Membership::Remove)
            .await
    }

    async fn change_membership(
        &self,
        family_id: &str,
        child_id: &str,
        change: Membership,
    ) -> Result<Family> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let now = self.clock.now();
            let mut tx = self.store.transaction();

            let mut family = tx
                .get_family(family_id)
                .await?
                .ok_or_else(|| Error::not_found(RecordKind::Family, family_id))?;
            let mut parent = tx.get_profile(&family.parent_uid).await?;
            let mut child = tx.get_profile(child_id).await?;

            let changed = match change {
                Membership::Add => {
                    let child = child
                        .as_mut()
                        .ok_or_else(|| Error::not_found(RecordKind::Profile, child_id))?;
                    let parent = parent
                        .as_mut()
                        .ok_or_else(|| Error::not_found(RecordKind::Profile, &family.parent_uid))?;
                    check_joinable(child, &family)?;
                    family.children_uids.insert(child_id);
                    parent.children_uids.insert(child_id);
                    child.family_id = Some(family.id.clone());
                    child.parent_uid = Some(parent.uid.clone());
                    true
                }
                Membership::Remove => {
                    let mut changed = family.children_uids.remove(child_id);
                    if let Some(parent) = parent.as_mut() {
                        changed |= parent.children_uids.remove(child_id);
                    }
                    if let Some(child) = child.as_mut() {
                        if child.family_id.as_deref() == Some(family_id) {
                            child.family_id = None;
                            changed = true;
                        }
                    }
                    changed
                }
            };

            if !changed {
                tracing::debug!("{:?} of {} on family {} is a no-op", change, child_id, family_id);
                return Ok(family);
            }

            tx.set_family(&family)?;
            for profile in [parent.as_mut(), child.as_mut()].into_iter().flatten() {
                profile.updated_at = Some(now);
                tx.set_profile(profile)?;
            }

            match tx.commit().await {
                Ok(()) => {
                    tracing::info!("{:?} child {} on family {}", change, child_id, family_id);
                    return Ok(family);
                }
                Err(e) if should_retry(&e, attempt) => {
                    tracing::warn!("Retrying membership change on {}: {}", family_id, e);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Merges recognized settings from `patch` into the family.
    ///
    /// Only `filterLevel` is recognized; other keys are ignored. A
    /// recognized key with an invalid value is a validation error.
    /// Single-record write.
    pub async fn update_family_settings(
        &self,
        family_id: &str,
        patch: &Map<String, Value>,
    ) -> Result<Family> {
        let mut family = self
            .store
            .get_family(family_id)
            .await?
            .ok_or_else(|| Error::not_found(RecordKind::Family, family_id))?;

        let mut settings = family.settings.unwrap_or_default();
        for (key, value) in patch {
            match key.as_str() {
                "filterLevel" => {
                    let level = value
                        .as_str()
                        .ok_or_else(|| Error::Validation("filterLevel must be a string".into()))
                        .and_then(|s| FilterLevel::from_str(s).map_err(Error::Validation))?;
                    settings.filter_level = level;
                }
                other => tracing::debug!("Ignoring unrecognized family setting '{}'", other),
            }
        }
        family.settings = Some(settings);

        self.store.put_family(&family).await?;
        tracing::info!("Updated settings for family {}", family_id);
        Ok(family)
    }

    pub async fn get_family(&self, family_id: &str) -> Result<Family> {
        self.store
            .get_family(family_id)
            .await?
            .ok_or_else(|| Error::not_found(RecordKind::Family, family_id))
    }

    /// The family owned by `parent_id`, if one exists.
    pub async fn get_family_for_parent(&self, parent_id: &str) -> Result<Option<Family>> {
        let families = self
            .store
            .query_families(&[Filter::eq("parentUid", parent_id)])
            .await?;
        Ok(families.into_iter().next())
    }

    /// All CHILD profiles whose `familyId` matches.
    pub async fn get_family_children(&self, family_id: &str) -> Result<Vec<UserProfile>> {
        Ok(self
            .store
            .query_profiles(&[
                Filter::eq("familyId", family_id),
                Filter::eq("role", "CHILD"),
            ])
            .await?)
    }
}

/// Fails unless `child` may be listed in `family`.
fn check_joinable(child: &UserProfile, family: &Family) -> Result<()> {
    if child.role != Role::Child {
        return Err(Error::InvalidState(format!(
            "profile {} has role {} and cannot join a family",
            child.uid, child.role
        )));
    }
    if let Some(existing) = child.family_id.as_deref() {
        if existing != family.id {
            return Err(Error::InvalidState(format!(
                "child {} already belongs to family {}",
                child.uid, existing
            )));
        }
    }
    if let Some(existing) = child.parent_uid.as_deref() {
        if existing != family.parent_uid {
            return Err(Error::InvalidState(format!(
                "child {} belongs to parent {}, not {}",
                child.uid, existing, family.parent_uid
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Membership {
    Add,
    Remove,
}
