//! Family invite codes.
//!
//! Codes are 6 characters drawn independently from `A-Z0-9` (36^6, about
//! 2.18e9 codes). Issuing does not check for collisions with existing
//! codes; on lookup the newest matching invite wins. Expiry is evaluated
//! when a code is looked up, never by the store.

use rand::Rng;
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{require_non_empty, Error, RecordKind, Result};
use crate::models::{Family, Invite};
use crate::store::Store;

pub const INVITE_CODE_LENGTH: usize = 6;

const INVITE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Result of looking up a code.
#[derive(Debug, Clone, PartialEq)]
pub enum InviteLookup {
    Valid(Family),
    Expired,
    NotFound,
}

pub struct InviteService {
    store: Store,
    clock: Arc<dyn Clock>,
}

impl InviteService {
    pub fn new(store: Store, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Issues a new code for `family_id`, valid for 48 hours.
    pub async fn generate_invite_code(&self, family_id: &str) -> Result<Invite> {
        require_non_empty(family_id, "family id")?;
        if self.store.get_family(family_id).await?.is_none() {
            return Err(Error::not_found(RecordKind::Family, family_id));
        }

        let invite = Invite::new(generate_code(), family_id, self.clock.now());
        self.store.append_invite(&invite).await?;

        tracing::info!(
            "Issued invite for family {} (expires {})",
            family_id,
            invite.expires_at
        );
        Ok(invite)
    }

    /// Looks up `code`, distinguishing expired from unknown codes.
    pub async fn resolve_invite_code(&self, code: &str) -> Result<InviteLookup> {
        let code = normalize_code(code);
        let newest = self
            .store
            .find_invites(&code)
            .await?
            .into_iter()
            .max_by_key(|invite| invite.created_at);

        let Some(invite) = newest else {
            tracing::debug!("Invite {} not found", code);
            return Ok(InviteLookup::NotFound);
        };

        if !invite.is_valid_at(self.clock.now()) {
            tracing::debug!("Invite {} expired at {}", code, invite.expires_at);
            return Ok(InviteLookup::Expired);
        }

        let family = self
            .store
            .get_family(&invite.family_id)
            .await?
            .ok_or_else(|| Error::not_found(RecordKind::Family, &invite.family_id))?;
        Ok(InviteLookup::Valid(family))
    }

    /// Resolves `code` to its family. Expired and unknown codes both
    /// yield `None`.
    pub async fn validate_invite_code(&self, code: &str) -> Result<Option<Family>> {
        match self.resolve_invite_code(code).await? {
            InviteLookup::Valid(family) => Ok(Some(family)),
            InviteLookup::Expired | InviteLookup::NotFound => Ok(None),
        }
    }
}

fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..INVITE_CODE_LENGTH)
        .map(|_| INVITE_ALPHABET[rng.random_range(0..INVITE_ALPHABET.len())] as char)
        .collect()
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
