//! Single-use token lifecycle: issue, deliver, redeem, purge.
//!
//! A token is `issued` until it is either redeemed (terminal, stored as
//! `used_at`) or outlives `expires_at` (terminal, never stored). Redemption
//! is one conditional UPDATE so two concurrent attempts cannot both win.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::AnyPool;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{from_millis, to_millis};
use crate::models::tenant::ConnectedDatabase;
use crate::models::token::{AuthToken, TokenType};
use crate::notify::{Notification, Notifier};
use crate::secrets::{TOKEN_LEN, random_alphanumeric};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid token")]
    InvalidToken,

    #[error("Token is not a {expected} token")]
    WrongTokenType { expected: TokenType },

    #[error("Token has already been used")]
    TokenAlreadyUsed,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token belongs to a different tenant")]
    TokenTenantMismatch,

    #[error("Invalid link base: {0}")]
    InvalidLinkBase(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Outcome of [`send`]: the token always exists, delivery may have failed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentToken {
    #[serde(skip)]
    pub token: AuthToken,
    pub expires_at: DateTime<Utc>,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_error: Option<String>,
}

type TokenRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    i64,
    i64,
    Option<i64>,
);

const SELECT_TOKEN: &str = "SELECT token, token_type, database_id, external_user_id, email, \
                            issued_at, expires_at, used_at FROM auth_tokens WHERE token = $1";

/// Persist a fresh token; its lifetime is fixed by `token_type`.
pub async fn issue(
    pool: &AnyPool,
    database_id: &str,
    external_user_id: &str,
    email: Option<&str>,
    token_type: TokenType,
    now: DateTime<Utc>,
) -> Result<AuthToken, TokenError> {
    let token = AuthToken {
        token: random_alphanumeric(TOKEN_LEN),
        token_type,
        database_id: database_id.to_string(),
        external_user_id: external_user_id.to_string(),
        email: email.map(str::to_string),
        issued_at: now,
        expires_at: now + token_type.ttl(),
        used_at: None,
    };

    sqlx::query(
        "INSERT INTO auth_tokens \
         (token, token_type, database_id, external_user_id, email, issued_at, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(&token.token)
    .bind(token_type.as_str())
    .bind(&token.database_id)
    .bind(&token.external_user_id)
    .bind(token.email.as_deref())
    .bind(to_millis(token.issued_at))
    .bind(to_millis(token.expires_at))
    .execute(pool)
    .await?;

    info!(
        token_type = %token_type,
        database_id,
        external_user_id,
        "issued token"
    );
    Ok(token)
}

/// Issue a token and hand its link to the notifier.
///
/// A delivery failure is reported in the result; the token stays valid.
#[allow(clippy::too_many_arguments)]
pub async fn send(
    pool: &AnyPool,
    notifier: &dyn Notifier,
    tenant: &ConnectedDatabase,
    external_user_id: &str,
    email: &str,
    token_type: TokenType,
    link_base: &str,
    now: DateTime<Utc>,
) -> Result<SentToken, TokenError> {
    // Reject a bad base before a token exists for it.
    build_link(link_base, "")?;
    let token = issue(pool, &tenant.id, external_user_id, Some(email), token_type, now).await?;
    let link = build_link(link_base, &token.token)?;

    let notification = Notification {
        kind: token_type,
        database_id: tenant.id.clone(),
        app_name: tenant.app_name.clone(),
        user_id: external_user_id.to_string(),
        email: email.to_string(),
        link,
        expires_at: token.expires_at,
    };

    let delivery_error = match notifier.send(&notification).await {
        Ok(()) => None,
        Err(e) => {
            warn!(
                notifier = notifier.name(),
                token_type = %token_type,
                database_id = %tenant.id,
                "delivery failed, token kept: {e}"
            );
            Some(e.to_string())
        }
    };

    Ok(SentToken {
        expires_at: token.expires_at,
        delivered: delivery_error.is_none(),
        delivery_error,
        token,
    })
}

pub async fn find(pool: &AnyPool, token: &str) -> Result<Option<AuthToken>, TokenError> {
    let row = sqlx::query_as::<_, TokenRow>(SELECT_TOKEN)
        .bind(token)
        .fetch_optional(pool)
        .await?;
    Ok(row.and_then(decode))
}

/// Consume a token, returning its record with `used_at` set.
///
/// Checks run in order: existence, type, prior use, expiry, tenant scope.
pub async fn redeem(
    pool: &AnyPool,
    token: &str,
    expected: TokenType,
    tenant: Option<&str>,
    now: DateTime<Utc>,
) -> Result<AuthToken, TokenError> {
    let mut record = find(pool, token).await?.ok_or(TokenError::InvalidToken)?;

    if record.token_type != expected {
        return Err(TokenError::WrongTokenType { expected });
    }
    if record.is_used() {
        return Err(TokenError::TokenAlreadyUsed);
    }
    if record.is_expired_at(now) {
        return Err(TokenError::TokenExpired);
    }
    if tenant.is_some_and(|t| t != record.database_id) {
        return Err(TokenError::TokenTenantMismatch);
    }

    let now_ms = to_millis(now);
    let result = sqlx::query(
        "UPDATE auth_tokens SET used_at = $1 \
         WHERE token = $2 AND used_at IS NULL AND expires_at >= $1",
    )
    .bind(now_ms)
    .bind(token)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        // Lost the race against another redemption.
        return Err(TokenError::TokenAlreadyUsed);
    }

    record.used_at = Some(from_millis(now_ms));
    info!(
        token_type = %record.token_type,
        database_id = %record.database_id,
        external_user_id = %record.external_user_id,
        "redeemed token"
    );
    Ok(record)
}

/// Delete tokens that expired before `before`. Returns rows removed.
pub async fn purge_expired(pool: &AnyPool, before: DateTime<Utc>) -> Result<u64, TokenError> {
    let result = sqlx::query("DELETE FROM auth_tokens WHERE expires_at < $1")
        .bind(to_millis(before))
        .execute(pool)
        .await?;
    let purged = result.rows_affected();
    if purged > 0 {
        info!(purged, "purged expired tokens");
    }
    Ok(purged)
}

/// `{base}?token={secret}`, keeping any query the base already carries.
pub fn build_link(base: &str, token: &str) -> Result<String, TokenError> {
    let mut url =
        url::Url::parse(base).map_err(|e| TokenError::InvalidLinkBase(format!("{base}: {e}")))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.to_string())
}

fn decode(row: TokenRow) -> Option<AuthToken> {
    let (token, token_type, database_id, external_user_id, email, issued_at, expires_at, used_at) =
        row;
    Some(AuthToken {
        token,
        token_type: TokenType::parse(&token_type)?,
        database_id,
        external_user_id,
        email,
        issued_at: from_millis(issued_at),
        expires_at: from_millis(expires_at),
        used_at: used_at.map(from_millis),
    })
}
