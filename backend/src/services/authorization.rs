//! Authorization Gate.
//!
//! A pure set-membership check with no role hierarchy: an operation that
//! should admit both admins and vendors must list both.

use crate::database::models::{Account, Role};
use crate::errors::{AuthError, AuthResult};
use std::collections::BTreeSet;
use std::fmt;

/// The exact set of roles an operation accepts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    pub fn of(roles: &[Role]) -> Self {
        Self(roles.iter().copied().collect())
    }

    pub fn only(role: Role) -> Self {
        Self::of(&[role])
    }

    /// Any authenticated account.
    pub fn any() -> Self {
        Self::of(&Role::ALL)
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Role::as_str).collect();
        f.write_str(&names.join(", "))
    }
}

/// Permits iff `account.role` is in `required`. An empty set permits nobody.
pub fn authorize(account: &Account, required: &RoleSet) -> bool {
    required.contains(account.role)
}

/// [`authorize`] as a typed result, yielding `Forbidden` on denial.
pub fn ensure_authorized(account: &Account, required: &RoleSet) -> AuthResult<()> {
    if authorize(account, required) {
        Ok(())
    } else {
        tracing::info!(
            account_id = %account.id,
            role = %account.role,
            required = %required,
            "Authorization denied"
        );
        Err(AuthError::forbidden(format!(
            "Not authorized. Required roles: {}",
            required
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::ConsentFlags;
    use crate::test_support::sample_account;
    use chrono::Utc;

    fn account(role: Role) -> Account {
        sample_account("acc", role, Utc::now(), ConsentFlags::default())
    }

    #[test]
    fn test_admin_only() {
        let admins = RoleSet::only(Role::Admin);
        assert!(!authorize(&account(Role::Vendor), &admins));
        assert!(authorize(&account(Role::Admin), &admins));
    }

    #[test]
    fn test_admin_or_vendor() {
        let staff = RoleSet::of(&[Role::Admin, Role::Vendor]);
        assert!(authorize(&account(Role::Admin), &staff));
        assert!(authorize(&account(Role::Vendor), &staff));
        assert!(!authorize(&account(Role::User), &staff));
    }

    #[test]
    fn test_no_hierarchy() {
        let vendors = RoleSet::only(Role::Vendor);
        assert!(!authorize(&account(Role::Admin), &vendors));
    }

    #[test]
    fn test_empty_set_denies_everyone() {
        let nobody = RoleSet::default();
        for role in Role::ALL {
            assert!(!authorize(&account(role), &nobody));
        }
    }

    #[test]
    fn test_denial_is_forbidden_kind() {
        let err = ensure_authorized(&account(Role::User), &RoleSet::only(Role::Admin)).unwrap_err();
        assert_eq!(err.kind(), "forbidden");
        assert!(err.to_string().contains("admin"));
    }
}
