use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account role. Pending roles are held until an approver acts on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    Parent,
    Child,
    PendingParent,
    PendingChild,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::SuperAdmin,
        Role::Parent,
        Role::Child,
        Role::PendingParent,
        Role::PendingChild,
    ];

    /// Returns true for roles still waiting on a decision.
    pub fn is_pending(&self) -> bool {
        matches!(self, Role::PendingParent | Role::PendingChild)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::SuperAdmin => write!(f, "SUPER_ADMIN"),
            Role::Parent => write!(f, "PARENT"),
            Role::Child => write!(f, "CHILD"),
            Role::PendingParent => write!(f, "PENDING_PARENT"),
            Role::PendingChild => write!(f, "PENDING_CHILD"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            "PARENT" => Ok(Role::Parent),
            "CHILD" => Ok(Role::Child),
            "PENDING_PARENT" => Ok(Role::PendingParent),
            "PENDING_CHILD" => Ok(Role::PendingChild),
            _ => Err(format!(
                "Invalid role '{}'. Valid options: SUPER_ADMIN, PARENT, CHILD, PENDING_PARENT, PENDING_CHILD",
                s
            )),
        }
    }
}

/// Approval status, independent of role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Suspended,
}

impl ApprovalStatus {
    pub const ALL: [ApprovalStatus; 4] = [
        ApprovalStatus::Pending,
        ApprovalStatus::Approved,
        ApprovalStatus::Rejected,
        ApprovalStatus::Suspended,
    ];
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "PENDING"),
            ApprovalStatus::Approved => write!(f, "APPROVED"),
            ApprovalStatus::Rejected => write!(f, "REJECTED"),
            ApprovalStatus::Suspended => write!(f, "SUSPENDED"),
        }
    }
}

/// Content-restriction strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterLevel {
    Strict,
    #[default]
    Moderate,
    None,
}

impl fmt::Display for FilterLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterLevel::Strict => write!(f, "STRICT"),
            FilterLevel::Moderate => write!(f, "MODERATE"),
            FilterLevel::None => write!(f, "NONE"),
        }
    }
}

impl FromStr for FilterLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "STRICT" => Ok(FilterLevel::Strict),
            "MODERATE" => Ok(FilterLevel::Moderate),
            "NONE" => Ok(FilterLevel::None),
            _ => Err(format!(
                "Invalid filter level '{}'. Valid options: STRICT, MODERATE, NONE",
                s
            )),
        }
    }
}
