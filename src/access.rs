//! Role-based access checks.
//!
//! There is no ambient "current user": every gated operation takes an
//! explicit [`Principal`] and the permission decision is a pure function
//! of role and action. Capability sets:
//!
//! - admin: everything, including user management and the master reset
//! - owner: save, edit, approve, tank edits, settings
//! - manager: save new data only

use serde::{Deserialize, Serialize};

/// User role, as stored in the `users.role` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Owner,
    Manager,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Owner => "owner",
            Role::Manager => "manager",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "owner" => Some(Role::Owner),
            "manager" => Some(Role::Manager),
            _ => None,
        }
    }
}

/// An authenticated user, produced by `users::login` and passed into
/// gated operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

/// Everything a caller can ask to do that is role-gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Save,
    Edit,
    Delete,
    Approve,
    ManageUsers,
    MasterReset,
    AccessSettings,
    EditTank,
    DeleteTank,
}

impl Action {
    fn as_str(&self) -> &'static str {
        match self {
            Action::Save => "save",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::Approve => "approve",
            Action::ManageUsers => "manage users",
            Action::MasterReset => "master reset",
            Action::AccessSettings => "access settings",
            Action::EditTank => "edit tank readings",
            Action::DeleteTank => "delete tank readings",
        }
    }
}

/// Pure {role, action} permission check.
pub fn role_allows(role: Role, action: Action) -> bool {
    match action {
        // All roles can record new data
        Action::Save => true,
        Action::Edit | Action::Approve | Action::AccessSettings | Action::EditTank => {
            matches!(role, Role::Admin | Role::Owner)
        }
        Action::Delete
        | Action::ManageUsers
        | Action::MasterReset
        | Action::DeleteTank => role == Role::Admin,
    }
}

/// Boundary check used by gated operations.
pub fn require(principal: &Principal, action: Action) -> Result<(), String> {
    if role_allows(principal.role, action) {
        Ok(())
    } else {
        Err(format!(
            "Permission denied: {} role cannot {}",
            principal.role.as_str(),
            action.as_str()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role) -> Principal {
        Principal {
            id: 1,
            username: "someone".into(),
            role,
        }
    }

    #[test]
    fn all_roles_can_save() {
        for role in [Role::Admin, Role::Owner, Role::Manager] {
            assert!(role_allows(role, Action::Save), "{role:?} should save");
        }
    }

    #[test]
    fn manager_cannot_edit_or_approve() {
        assert!(!role_allows(Role::Manager, Action::Edit));
        assert!(!role_allows(Role::Manager, Action::Approve));
        assert!(!role_allows(Role::Manager, Action::AccessSettings));
    }

    #[test]
    fn owner_can_approve_but_not_delete_or_reset() {
        assert!(role_allows(Role::Owner, Action::Approve));
        assert!(role_allows(Role::Owner, Action::EditTank));
        assert!(!role_allows(Role::Owner, Action::Delete));
        assert!(!role_allows(Role::Owner, Action::MasterReset));
        assert!(!role_allows(Role::Owner, Action::ManageUsers));
        assert!(!role_allows(Role::Owner, Action::DeleteTank));
    }

    #[test]
    fn admin_can_do_everything() {
        for action in [
            Action::Save,
            Action::Edit,
            Action::Delete,
            Action::Approve,
            Action::ManageUsers,
            Action::MasterReset,
            Action::AccessSettings,
            Action::EditTank,
            Action::DeleteTank,
        ] {
            assert!(role_allows(Role::Admin, action), "{action:?}");
        }
    }

    #[test]
    fn require_reports_role_and_action() {
        let err = require(&principal(Role::Manager), Action::Approve)
            .expect_err("manager approve should be denied");
        assert!(err.contains("manager"));
        assert!(err.contains("approve"));

        require(&principal(Role::Owner), Action::Approve).expect("owner approve allowed");
    }

    #[test]
    fn role_parse_roundtrip() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse(" Owner "), Some(Role::Owner));
        assert_eq!(Role::parse("MANAGER"), Some(Role::Manager));
        assert_eq!(Role::parse("cashier"), None);
    }
}
