//! Ban and moderation manager.
//!
//! At most one active ban exists per (tenant, external user); banning again
//! supersedes it in place. Whether a ban is in force is always decided at
//! read time from the stored flag and the expiry, never by a sweeper.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sqlx::AnyPool;
use thiserror::Error;
use tracing::{debug, info};

use crate::db::{from_millis, to_millis};
use crate::models::ban::{BanStatus, BanType, UserBan};
use crate::uuid::new_id;

/// Attempts before a racing insert gives up.
const MAX_SUPERSEDE_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum BanError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Operator input for [`ban`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanRequest {
    pub user_id: String,
    pub reason: String,
    #[serde(rename = "type")]
    pub ban_type: BanType,
    pub duration_hours: Option<f64>,
    pub banned_by: Option<String>,
}

type BanRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    i64,
    Option<i64>,
    i64,
    Option<i64>,
    Option<String>,
);

const BAN_COLUMNS: &str = "id, database_id, external_user_id, reason, ban_type, banned_by, \
                           created_at, expires_at, active, lifted_at, lifted_by";

/// Ban a user, superseding any active ban for the same user.
pub async fn ban(
    pool: &AnyPool,
    database_id: &str,
    request: &BanRequest,
    now: DateTime<Utc>,
) -> Result<UserBan, BanError> {
    if request.user_id.trim().is_empty() {
        return Err(BanError::Validation("userId is required".into()));
    }
    let expires_at = match request.ban_type {
        BanType::Permanent => None,
        BanType::Temporary => {
            let hours = request.duration_hours.ok_or_else(|| {
                BanError::Validation("durationHours is required for temporary bans".into())
            })?;
            if !hours.is_finite() || hours < 0.0 {
                return Err(BanError::Validation(
                    "durationHours must be a non-negative number".into(),
                ));
            }
            let expires_at = Duration::try_milliseconds((hours * 3_600_000.0).round() as i64)
                .and_then(|d| now.checked_add_signed(d))
                .ok_or_else(|| BanError::Validation("durationHours is out of range".into()))?;
            Some(expires_at)
        }
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        match supersede_or_insert(pool, database_id, request, expires_at, now).await {
            Ok(ban) => {
                info!(
                    database_id,
                    external_user_id = %ban.external_user_id,
                    ban_type = ban.ban_type.as_str(),
                    "user banned"
                );
                return Ok(ban);
            }
            // Two writers inserted at once; the loser retries as an update.
            Err(BanError::Db(sqlx::Error::Database(e)))
                if e.is_unique_violation() && attempt < MAX_SUPERSEDE_ATTEMPTS =>
            {
                debug!(attempt, "active ban appeared concurrently, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}

async fn supersede_or_insert(
    pool: &AnyPool,
    database_id: &str,
    request: &BanRequest,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<UserBan, BanError> {
    let mut tx = pool.begin().await?;

    let existing: Option<String> = sqlx::query_scalar(
        "SELECT id FROM user_bans \
         WHERE database_id = $1 AND external_user_id = $2 AND active = 1",
    )
    .bind(database_id)
    .bind(&request.user_id)
    .fetch_optional(&mut *tx)
    .await?;

    let id = match existing {
        Some(id) => {
            sqlx::query(
                "UPDATE user_bans SET reason = $1, ban_type = $2, banned_by = $3, \
                 created_at = $4, expires_at = $5, lifted_at = NULL, lifted_by = NULL \
                 WHERE id = $6",
            )
            .bind(&request.reason)
            .bind(request.ban_type.as_str())
            .bind(request.banned_by.as_deref())
            .bind(to_millis(now))
            .bind(expires_at.map(to_millis))
            .bind(&id)
            .execute(&mut *tx)
            .await?;
            id
        }
        None => {
            let id = new_id();
            sqlx::query(
                "INSERT INTO user_bans \
                 (id, database_id, external_user_id, reason, ban_type, banned_by, \
                  created_at, expires_at, active) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1)",
            )
            .bind(&id)
            .bind(database_id)
            .bind(&request.user_id)
            .bind(&request.reason)
            .bind(request.ban_type.as_str())
            .bind(request.banned_by.as_deref())
            .bind(to_millis(now))
            .bind(expires_at.map(to_millis))
            .execute(&mut *tx)
            .await?;
            id
        }
    };

    tx.commit().await?;

    Ok(UserBan {
        id,
        database_id: database_id.to_string(),
        external_user_id: request.user_id.clone(),
        reason: request.reason.clone(),
        ban_type: request.ban_type,
        banned_by: request.banned_by.clone(),
        created_at: from_millis(to_millis(now)),
        expires_at: expires_at.map(|at| from_millis(to_millis(at))),
        active: true,
        lifted_at: None,
        lifted_by: None,
    })
}

/// Time-aware ban check.
pub async fn check_ban(
    pool: &AnyPool,
    database_id: &str,
    external_user_id: &str,
    now: DateTime<Utc>,
) -> Result<BanStatus, BanError> {
    let row = sqlx::query_as::<_, BanRow>(&format!(
        "SELECT {BAN_COLUMNS} FROM user_bans \
         WHERE database_id = $1 AND external_user_id = $2 AND active = 1"
    ))
    .bind(database_id)
    .bind(external_user_id)
    .fetch_optional(pool)
    .await?;

    let ban = row.and_then(decode).filter(|b| b.is_effective_at(now));
    Ok(BanStatus {
        banned: ban.is_some(),
        ban,
    })
}

/// Lift the active ban, if any. Returns whether a ban was lifted.
pub async fn unban(
    pool: &AnyPool,
    database_id: &str,
    external_user_id: &str,
    lifted_by: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, BanError> {
    let result = sqlx::query(
        "UPDATE user_bans SET active = 0, lifted_at = $1, lifted_by = $2 \
         WHERE database_id = $3 AND external_user_id = $4 AND active = 1",
    )
    .bind(to_millis(now))
    .bind(lifted_by)
    .bind(database_id)
    .bind(external_user_id)
    .execute(pool)
    .await?;

    let lifted = result.rows_affected() > 0;
    if lifted {
        info!(database_id, external_user_id, "ban lifted");
    }
    Ok(lifted)
}

/// Bans for a tenant, newest first. `active_only` keeps bans still in force.
pub async fn list_bans(
    pool: &AnyPool,
    database_id: &str,
    active_only: bool,
    now: DateTime<Utc>,
) -> Result<Vec<UserBan>, BanError> {
    let rows = sqlx::query_as::<_, BanRow>(&format!(
        "SELECT {BAN_COLUMNS} FROM user_bans WHERE database_id = $1 \
         ORDER BY created_at DESC, id DESC"
    ))
    .bind(database_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(decode)
        .filter(|b| !active_only || b.is_effective_at(now))
        .collect())
}

fn decode(row: BanRow) -> Option<UserBan> {
    let (
        id,
        database_id,
        external_user_id,
        reason,
        ban_type,
        banned_by,
        created_at,
        expires_at,
        active,
        lifted_at,
        lifted_by,
    ) = row;
    Some(UserBan {
        id,
        database_id,
        external_user_id,
        reason,
        ban_type: BanType::parse(&ban_type)?,
        banned_by,
        created_at: from_millis(created_at),
        expires_at: expires_at.map(from_millis),
        active: active != 0,
        lifted_at: lifted_at.map(from_millis),
        lifted_by,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn control_plane() -> AnyPool {
        let pool = crate::db::connect("sqlite::memory:", 1).await.unwrap();
        crate::migrate::migrate(&pool).await.unwrap();
        sqlx::query(
            "INSERT INTO connected_databases \
             (id, name, app_name, endpoint, table_name, api_key_hash, created_at) \
             VALUES ('db-1', 'db', 'App', 'sqlite::memory:', 'users', 'h', 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_790_000_000, 0).unwrap()
    }

    fn request(ban_type: BanType, hours: Option<f64>, reason: &str) -> BanRequest {
        BanRequest {
            user_id: "42".into(),
            reason: reason.into(),
            ban_type,
            duration_hours: hours,
            banned_by: Some("ops".into()),
        }
    }

    #[tokio::test]
    async fn zero_hour_ban_is_not_in_force() {
        let pool = control_plane().await;
        let ban = ban(&pool, "db-1", &request(BanType::Temporary, Some(0.0), "spam"), t0())
            .await
            .unwrap();
        assert!(ban.active);

        let status = check_ban(&pool, "db-1", "42", t0()).await.unwrap();
        assert!(!status.banned);
        assert!(status.ban.is_none());
    }

    #[tokio::test]
    async fn temporary_ban_expires_by_time() {
        let pool = control_plane().await;
        ban(&pool, "db-1", &request(BanType::Temporary, Some(2.0), "spam"), t0())
            .await
            .unwrap();

        let during = check_ban(&pool, "db-1", "42", t0() + Duration::hours(1))
            .await
            .unwrap();
        assert!(during.banned);
        assert_eq!(during.ban.unwrap().expires_at, Some(t0() + Duration::hours(2)));

        let after = check_ban(&pool, "db-1", "42", t0() + Duration::hours(2))
            .await
            .unwrap();
        assert!(!after.banned);
    }

    #[tokio::test]
    async fn banning_again_supersedes_instead_of_duplicating() {
        let pool = control_plane().await;
        let first = ban(&pool, "db-1", &request(BanType::Temporary, Some(1.0), "spam"), t0())
            .await
            .unwrap();
        let second = ban(&pool, "db-1", &request(BanType::Permanent, None, "fraud"), t0())
            .await
            .unwrap();
        assert_eq!(first.id, second.id);

        let all = list_bans(&pool, "db-1", false, t0()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].reason, "fraud");
        assert_eq!(all[0].ban_type, BanType::Permanent);
        assert_eq!(all[0].expires_at, None);
    }

    #[tokio::test]
    async fn unban_is_idempotent_and_records_lift() {
        let pool = control_plane().await;
        ban(&pool, "db-1", &request(BanType::Permanent, None, "abuse"), t0())
            .await
            .unwrap();

        assert!(unban(&pool, "db-1", "42", Some("ops"), t0()).await.unwrap());
        assert!(!unban(&pool, "db-1", "42", Some("ops"), t0()).await.unwrap());
        assert!(!check_ban(&pool, "db-1", "42", t0()).await.unwrap().banned);

        let history = list_bans(&pool, "db-1", false, t0()).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].active);
        assert_eq!(history[0].lifted_at, Some(t0()));
        assert_eq!(history[0].lifted_by.as_deref(), Some("ops"));
        assert!(list_bans(&pool, "db-1", true, t0()).await.unwrap().is_empty());

        // A new ban after a lift is a fresh row.
        ban(&pool, "db-1", &request(BanType::Permanent, None, "again"), t0())
            .await
            .unwrap();
        assert_eq!(list_bans(&pool, "db-1", false, t0()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn temporary_ban_requires_a_valid_duration() {
        let pool = control_plane().await;
        for hours in [None, Some(-1.0), Some(f64::NAN)] {
            let err = ban(&pool, "db-1", &request(BanType::Temporary, hours, "x"), t0())
                .await
                .unwrap_err();
            assert!(matches!(err, BanError::Validation(_)));
        }
    }

    #[test]
    fn request_accepts_camel_case_with_type_key() {
        let req: BanRequest = serde_json::from_str(
            r#"{"userId":"7","reason":"spam","type":"temporary","durationHours":24}"#,
        )
        .unwrap();
        assert_eq!(req.ban_type, BanType::Temporary);
        assert_eq!(req.duration_hours, Some(24.0));
        assert_eq!(req.banned_by, None);
    }
}
