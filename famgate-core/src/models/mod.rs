mod approval_request;
mod family;
mod invite;
mod profile;
mod role;
mod uid_set;

pub use approval_request::{ApprovalRequest, RequestKind};
pub use family::{Family, FamilySettings};
pub use invite::{Invite, INVITE_TTL_HOURS};
pub use profile::UserProfile;
pub use role::{ApprovalStatus, FilterLevel, Role};
pub use uid_set::UidSet;
