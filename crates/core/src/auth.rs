use serde::{Deserialize, Serialize};

use crate::UserId;

/// Account-level role assigned at registration, independent of space roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    /// Regular account.
    User,
    /// Platform administrator.
    Admin,
}

/// User information persisted in the authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    user_id: UserId,
    display_name: String,
    account_role: AccountRole,
}

impl UserIdentity {
    /// Creates a user identity from authentication data.
    #[must_use]
    pub fn new(user_id: UserId, display_name: impl Into<String>, account_role: AccountRole) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            account_role,
        }
    }

    /// Returns the stable account identifier.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the display name for the current user.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_str()
    }

    /// Returns the account-level role.
    #[must_use]
    pub fn account_role(&self) -> AccountRole {
        self.account_role
    }

    /// Returns whether the account is a platform administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.account_role == AccountRole::Admin
    }
}
