//! FamGate Core Library
//!
//! Approval workflow, family membership, invite codes and access policy
//! for the FamGate proxy.

pub mod approval;
pub mod clock;
pub mod document;
pub mod error;
pub mod family;
pub mod invite;
pub mod models;
pub mod policy;
pub mod registration;
pub mod store;

pub use approval::ApprovalService;
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{DenialReason, DocumentError, Error, RecordKind, Result, StoreError};
pub use family::FamilyManager;
pub use invite::{InviteLookup, InviteService};
pub use models::{
    ApprovalRequest, ApprovalStatus, Family, FamilySettings, FilterLevel, Invite, RequestKind,
    Role, UidSet, UserProfile,
};
pub use policy::{can_access_proxy, check_access, is_approved};
pub use registration::{ParentLink, RegistrationService};
pub use store::{MemoryStore, SqliteStore, Store};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
