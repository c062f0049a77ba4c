//! Users, roles and the verified actor identity

use crate::UserId;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Participant role
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Opens transactions by issuing purchase orders, confirms receipt
    Buyer,
    /// Ships goods, uploads bills of lading, issues invoices
    Seller,
    /// Issues letters of credit, pays invoices
    Bank,
    /// Verifies documents and file integrity
    Auditor,
}

/// A registered user.
///
/// Users are created by the auth collaborator and never modified here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub org: String,
    pub role: Role,
}

/// Fields supplied when the auth collaborator registers a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub org: String,
    pub role: Role,
}

/// Identity of the caller as admitted by the auth collaborator.
///
/// The workflow engine re-checks `role` and `org` against the stored [`User`]
/// before evaluating any guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
    pub org: String,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role, org: impl Into<String>) -> Self {
        Self {
            user_id,
            role,
            org: org.into(),
        }
    }

    /// Build the actor for a stored user
    pub fn from_user(user: &User) -> Self {
        Self::new(user.id, user.role, user.org.clone())
    }

    /// True if the claimed identity matches the stored user
    pub fn matches(&self, user: &User) -> bool {
        self.user_id == user.id && self.role == user.role && self.org == user.org
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_and_display() {
        assert_eq!("bank".parse::<Role>().unwrap(), Role::Bank);
        assert_eq!("AUDITOR".parse::<Role>().unwrap(), Role::Auditor);
        assert_eq!(Role::Seller.to_string(), "seller");
        assert!("shipper".parse::<Role>().is_err());
    }

    #[test]
    fn test_actor_matches_user() {
        let user = User {
            id: 7,
            name: "Asha".to_string(),
            email: "asha@acme.test".to_string(),
            org: "Acme".to_string(),
            role: Role::Buyer,
        };

        assert!(Actor::from_user(&user).matches(&user));
        assert!(!Actor::new(7, Role::Bank, "Acme").matches(&user));
        assert!(!Actor::new(7, Role::Buyer, "Other Org").matches(&user));
    }
}
