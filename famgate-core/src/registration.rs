//! Account registration.
//!
//! Every new account starts pending. A child must name its parent, either
//! by the parent's email or by a family invite code, so a pending child
//! always carries a `parentUid`.

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{require_non_empty, Error, RecordKind, Result};
use crate::invite::InviteService;
use crate::models::{ApprovalRequest, FilterLevel, RequestKind, UserProfile};
use crate::store::{should_retry, Filter, Store};

/// How a registering child identifies its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentLink {
    ParentEmail(String),
    InviteCode(String),
}

pub struct RegistrationService {
    store: Store,
    clock: Arc<dyn Clock>,
    invites: InviteService,
}

impl RegistrationService {
    pub fn new(store: Store, clock: Arc<dyn Clock>) -> Self {
        let invites = InviteService::new(store.clone(), clock.clone());
        Self {
            store,
            clock,
            invites,
        }
    }

    /// Registers a parent awaiting admin approval.
    pub async fn register_parent(
        &self,
        uid: &str,
        email: &str,
        display_name: Option<&str>,
        filter_level: FilterLevel,
    ) -> Result<UserProfile> {
        validate_identity(uid, email)?;

        let now = self.clock.now();
        let profile = UserProfile::pending_parent(uid, email, filter_level, now)
            .with_display_name(display_name.map(str::to_string));
        let request = ApprovalRequest::new(uid, RequestKind::Parent, None, now);

        self.create(profile, request).await
    }

    /// Registers a child awaiting its parent's approval.
    ///
    /// Fails with [`Error::NotFound`] if the parent cannot be resolved.
    pub async fn register_child(
        &self,
        uid: &str,
        email: &str,
        display_name: Option<&str>,
        link: &ParentLink,
    ) -> Result<UserProfile> {
        validate_identity(uid, email)?;

        let (parent_uid, filter_level) = match link {
            ParentLink::ParentEmail(parent_email) => {
                let parent = self.find_parent_by_email(parent_email).await?;
                let filter_level = match parent.family_id.as_deref() {
                    Some(family_id) => self
                        .store
                        .get_family(family_id)
                        .await?
                        .map(|f| f.filter_level())
                        .unwrap_or_default(),
                    None => FilterLevel::default(),
                };
                (parent.uid, filter_level)
            }
            ParentLink::InviteCode(code) => {
                let family = self
                    .invites
                    .validate_invite_code(code)
                    .await?
                    .ok_or_else(|| Error::not_found(RecordKind::Invite, code))?;
                let filter_level = family.filter_level();
                (family.parent_uid, filter_level)
            }
        };

        let now = self.clock.now();
        let profile = UserProfile::pending_child(uid, email, parent_uid.clone(), filter_level, now)
            .with_display_name(display_name.map(str::to_string));
        let request = ApprovalRequest::new(uid, RequestKind::Child, Some(parent_uid), now);

        self.create(profile, request).await
    }

    async fn find_parent_by_email(&self, email: &str) -> Result<UserProfile> {
        let email = email.trim().to_lowercase();
        self.store
            .query_profiles(&[Filter::eq("email", &email), Filter::eq("role", "PARENT")])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(RecordKind::Profile, email.as_str()))
    }

    /// Writes the profile and its audit record together, failing if the
    /// uid is already taken.
    async fn create(&self, mut profile: UserProfile, request: ApprovalRequest) -> Result<UserProfile> {
        profile.email = profile.email.trim().to_lowercase();

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut tx = self.store.transaction();

            if tx.get_profile(&profile.uid).await?.is_some() {
                return Err(Error::InvalidState(format!(
                    "profile {} already exists",
                    profile.uid
                )));
            }
            tx.set_profile(&profile)?;
            tx.set_approval_request(&request)?;

            match tx.commit().await {
                Ok(()) => {
                    tracing::info!("Registered {} as {}", profile.uid, profile.role);
                    return Ok(profile);
                }
                Err(e) if should_retry(&e, attempt) => {
                    tracing::warn!("Retrying registration of {}: {}", profile.uid, e);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn validate_identity(uid: &str, email: &str) -> Result<()> {
    require_non_empty(uid, "uid")?;
    require_non_empty(email, "email")?;
    if !email.contains('@') {
        return Err(Error::Validation(format!("invalid email '{}'", email)));
    }
    Ok(())
}
