//! User ban model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ban duration kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BanType {
    Permanent,
    Temporary,
}

impl BanType {
    /// Database text representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BanType::Permanent => "permanent",
            BanType::Temporary => "temporary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "permanent" => Some(BanType::Permanent),
            "temporary" => Some(BanType::Temporary),
            _ => None,
        }
    }
}

/// A ban on one external user of one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBan {
    pub id: String,
    pub database_id: String,
    pub external_user_id: String,
    pub reason: String,
    pub ban_type: BanType,
    pub banned_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Stored flag; see [`UserBan::is_effective_at`] for the time-aware view.
    pub active: bool,
    pub lifted_at: Option<DateTime<Utc>>,
    pub lifted_by: Option<String>,
}

impl UserBan {
    /// Stored flag AND (permanent OR not yet expired).
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        match (self.ban_type, self.expires_at) {
            (BanType::Permanent, _) => true,
            (BanType::Temporary, Some(expires_at)) => now < expires_at,
            (BanType::Temporary, None) => true,
        }
    }
}

/// Result of a ban check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanStatus {
    pub banned: bool,
    /// The effective ban, when `banned` is true.
    pub ban: Option<UserBan>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ban(ban_type: BanType, expires_at: Option<DateTime<Utc>>, active: bool) -> UserBan {
        UserBan {
            id: "b1".into(),
            database_id: "db".into(),
            external_user_id: "u1".into(),
            reason: "spam".into(),
            ban_type,
            banned_by: None,
            created_at: Utc::now(),
            expires_at,
            active,
            lifted_at: None,
            lifted_by: None,
        }
    }

    #[test]
    fn permanent_ban_is_effective_while_flagged() {
        let now = Utc::now();
        assert!(ban(BanType::Permanent, None, true).is_effective_at(now));
        assert!(!ban(BanType::Permanent, None, false).is_effective_at(now));
    }

    #[test]
    fn temporary_ban_lapses_at_expiry_even_when_flagged() {
        let now = Utc::now();
        let b = ban(BanType::Temporary, Some(now + Duration::hours(1)), true);
        assert!(b.is_effective_at(now));
        assert!(!b.is_effective_at(now + Duration::hours(1)));
        assert!(!b.is_effective_at(now + Duration::hours(2)));
    }
}
