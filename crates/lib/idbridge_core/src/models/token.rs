//! Auth token model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Kind of single-use token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    PasswordReset,
    EmailVerification,
    MagicLink,
}

impl TokenType {
    /// Database text representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::PasswordReset => "password_reset",
            TokenType::EmailVerification => "email_verification",
            TokenType::MagicLink => "magic_link",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "password_reset" => Some(TokenType::PasswordReset),
            "email_verification" => Some(TokenType::EmailVerification),
            "magic_link" => Some(TokenType::MagicLink),
            _ => None,
        }
    }

    /// Fixed lifetime per type; callers cannot override it.
    pub fn ttl(&self) -> Duration {
        match self {
            TokenType::PasswordReset => Duration::hours(1),
            TokenType::EmailVerification => Duration::hours(24),
            TokenType::MagicLink => Duration::minutes(15),
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted single-use token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    /// The secret itself.
    pub token: String,
    pub token_type: TokenType,
    pub database_id: String,
    pub external_user_id: String,
    /// Address the link was sent to.
    pub email: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl AuthToken {
    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
