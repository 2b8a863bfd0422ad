//! Schema mapping model — which tenant column plays which user-data role.

use serde::{Deserialize, Serialize};

use crate::ident::{self, InvalidIdentifier};

/// Semantic roles a tenant column can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Id,
    Email,
    Name,
    Username,
    Password,
    Avatar,
    Role,
    Status,
    CreatedAt,
    LastLogin,
    EmailVerified,
}

impl Role {
    /// All roles, in projection order.
    pub const ALL: [Role; 11] = [
        Role::Id,
        Role::Email,
        Role::Name,
        Role::Username,
        Role::Password,
        Role::Avatar,
        Role::Role,
        Role::Status,
        Role::CreatedAt,
        Role::LastLogin,
        Role::EmailVerified,
    ];

    /// Roles whose columns take part in free-text search.
    pub const SEARCHABLE: [Role; 3] = [Role::Email, Role::Name, Role::Username];

    /// Name used as the SQL alias and as the `ExternalUser` key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Id => "id",
            Role::Email => "email",
            Role::Name => "name",
            Role::Username => "username",
            Role::Password => "password",
            Role::Avatar => "avatar",
            Role::Role => "role",
            Role::Status => "status",
            Role::CreatedAt => "createdAt",
            Role::LastLogin => "lastLogin",
            Role::EmailVerified => "emailVerified",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column mapping for one tenant's users table.
///
/// Only `id_column` and `email_column` are required; every other role is
/// optional. Column names keep the case reported by the tenant catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaMapping {
    pub id_column: String,
    pub email_column: String,
    #[serde(default)]
    pub name_column: Option<String>,
    #[serde(default)]
    pub username_column: Option<String>,
    #[serde(default)]
    pub password_column: Option<String>,
    #[serde(default)]
    pub avatar_column: Option<String>,
    #[serde(default)]
    pub role_column: Option<String>,
    #[serde(default)]
    pub status_column: Option<String>,
    #[serde(default)]
    pub created_at_column: Option<String>,
    #[serde(default)]
    pub last_login_column: Option<String>,
    #[serde(default)]
    pub email_verified_column: Option<String>,
    #[serde(default)]
    pub session_table: Option<String>,
    #[serde(default)]
    pub session_user_column: Option<String>,
}

impl SchemaMapping {
    /// Mapping with only the required roles set.
    pub fn new(id_column: &str, email_column: &str) -> Self {
        Self {
            id_column: id_column.to_string(),
            email_column: email_column.to_string(),
            name_column: None,
            username_column: None,
            password_column: None,
            avatar_column: None,
            role_column: None,
            status_column: None,
            created_at_column: None,
            last_login_column: None,
            email_verified_column: None,
            session_table: None,
            session_user_column: None,
        }
    }

    /// Column mapped to a role, if any.
    pub fn column(&self, role: Role) -> Option<&str> {
        match role {
            Role::Id => Some(self.id_column.as_str()),
            Role::Email => Some(self.email_column.as_str()),
            Role::Name => self.name_column.as_deref(),
            Role::Username => self.username_column.as_deref(),
            Role::Password => self.password_column.as_deref(),
            Role::Avatar => self.avatar_column.as_deref(),
            Role::Role => self.role_column.as_deref(),
            Role::Status => self.status_column.as_deref(),
            Role::CreatedAt => self.created_at_column.as_deref(),
            Role::LastLogin => self.last_login_column.as_deref(),
            Role::EmailVerified => self.email_verified_column.as_deref(),
        }
    }

    pub fn set_column(&mut self, role: Role, column: Option<String>) {
        match role {
            Role::Id => {
                if let Some(c) = column {
                    self.id_column = c;
                }
            }
            Role::Email => {
                if let Some(c) = column {
                    self.email_column = c;
                }
            }
            Role::Name => self.name_column = column,
            Role::Username => self.username_column = column,
            Role::Password => self.password_column = column,
            Role::Avatar => self.avatar_column = column,
            Role::Role => self.role_column = column,
            Role::Status => self.status_column = column,
            Role::CreatedAt => self.created_at_column = column,
            Role::LastLogin => self.last_login_column = column,
            Role::EmailVerified => self.email_verified_column = column,
        }
    }

    /// Mapped `(role, column)` pairs, in projection order.
    pub fn mapped(&self) -> impl Iterator<Item = (Role, &str)> {
        Role::ALL
            .into_iter()
            .filter_map(|role| self.column(role).map(|c| (role, c)))
    }

    /// Check every mapped name against the identifier predicate.
    pub fn validate(&self) -> Result<(), InvalidIdentifier> {
        for (_, column) in self.mapped() {
            ident::validate(column)?;
        }
        if let Some(table) = &self.session_table {
            ident::validate(table)?;
        }
        if let Some(column) = &self.session_user_column {
            ident::validate(column)?;
        }
        Ok(())
    }
}
