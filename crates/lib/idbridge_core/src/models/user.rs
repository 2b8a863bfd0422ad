//! External user projections.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::mapping::Role;

/// A tenant user row, keyed by role name.
///
/// Built at query time from whichever columns the mapping declares, so only
/// `id` and `email` are guaranteed present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalUser(pub BTreeMap<String, Option<String>>);

impl ExternalUser {
    pub fn get(&self, role: Role) -> Option<&str> {
        self.0.get(role.as_str()).and_then(|v| v.as_deref())
    }

    pub fn id(&self) -> &str {
        self.get(Role::Id).unwrap_or_default()
    }

    pub fn email(&self) -> &str {
        self.get(Role::Email).unwrap_or_default()
    }

    pub fn insert(&mut self, role: Role, value: Option<String>) {
        self.0.insert(role.as_str().to_string(), value);
    }
}

/// One page of users plus the total matching count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPage {
    pub users: Vec<ExternalUser>,
    pub total: i64,
}

/// Minimal projection handed back on magic-link sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimalUser {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub username: Option<String>,
    pub role: Option<String>,
}

impl From<&ExternalUser> for MinimalUser {
    fn from(user: &ExternalUser) -> Self {
        Self {
            id: user.id().to_string(),
            email: user.email().to_string(),
            name: user.get(Role::Name).map(str::to_string),
            username: user.get(Role::Username).map(str::to_string),
            role: user.get(Role::Role).map(str::to_string),
        }
    }
}

/// Session-table row, keyed by column name.
pub type SessionRow = BTreeMap<String, Option<String>>;
