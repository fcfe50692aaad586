//! Access policy: pure functions over a profile.

use crate::error::{DenialReason, Error, Result};
use crate::models::{ApprovalStatus, Role, UserProfile};

pub fn is_approved(profile: &UserProfile) -> bool {
    profile.approval_status == ApprovalStatus::Approved
}

/// Only approved admins, parents and children may use the proxy. Pending
/// roles never pass, whatever their status says.
pub fn can_access_proxy(profile: &UserProfile) -> bool {
    is_approved(profile)
        && matches!(profile.role, Role::SuperAdmin | Role::Parent | Role::Child)
}

/// Like [`can_access_proxy`], but reports why access is denied.
pub fn check_access(profile: &UserProfile) -> Result<()> {
    if let Some(reason) = DenialReason::from_status(profile.approval_status) {
        return Err(Error::AccessDenied(reason));
    }
    if profile.role.is_pending() {
        return Err(Error::AccessDenied(DenialReason::Role(profile.role)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FilterLevel;
    use chrono::Utc;

    fn profile(role: Role, status: ApprovalStatus) -> UserProfile {
        let mut p = UserProfile::pending_parent("u1", "u@example.com", FilterLevel::Moderate, Utc::now());
        p.role = role;
        p.approval_status = status;
        p
    }

    #[test]
    fn test_can_access_proxy_truth_table() {
        for role in Role::ALL {
            for status in ApprovalStatus::ALL {
                let expected = status == ApprovalStatus::Approved
                    && matches!(role, Role::SuperAdmin | Role::Parent | Role::Child);
                assert_eq!(
                    can_access_proxy(&profile(role, status)),
                    expected,
                    "role={} status={}",
                    role,
                    status
                );
            }
        }
    }

    #[test]
    fn test_pending_roles_never_pass_even_when_approved() {
        assert!(!can_access_proxy(&profile(Role::PendingParent, ApprovalStatus::Approved)));
        assert!(!can_access_proxy(&profile(Role::PendingChild, ApprovalStatus::Approved)));
    }

    #[test]
    fn test_check_access_reasons() {
        let reason = |role, status| match check_access(&profile(role, status)) {
            Err(Error::AccessDenied(reason)) => Some(reason),
            Ok(()) => None,
            Err(e) => panic!("unexpected error: {}", e),
        };

        assert_eq!(reason(Role::Child, ApprovalStatus::Approved), None);
        assert_eq!(
            reason(Role::PendingParent, ApprovalStatus::Pending),
            Some(DenialReason::Pending)
        );
        assert_eq!(
            reason(Role::Parent, ApprovalStatus::Suspended),
            Some(DenialReason::Suspended)
        );
        assert_eq!(
            reason(Role::PendingChild, ApprovalStatus::Rejected),
            Some(DenialReason::Rejected)
        );
        assert_eq!(
            reason(Role::PendingChild, ApprovalStatus::Approved),
            Some(DenialReason::Role(Role::PendingChild))
        );
    }

    #[test]
    fn test_check_access_agrees_with_can_access_proxy() {
        for role in Role::ALL {
            for status in ApprovalStatus::ALL {
                let p = profile(role, status);
                assert_eq!(check_access(&p).is_ok(), can_access_proxy(&p));
            }
        }
    }
}
