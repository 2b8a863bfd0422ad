//! Identity flows: send a link, then redeem it.
//!
//! Control-plane writes (token redemption) always happen before tenant
//! writes. If the tenant write then fails the token stays consumed and the
//! operator re-issues; there is no cross-store rollback.

use chrono::Utc;
use idbridge_core::models::mapping::Role;
use idbridge_core::models::tenant::ConnectedDatabase;
use idbridge_core::models::token::TokenType;
use idbridge_core::models::user::MinimalUser;
use idbridge_core::password;
use idbridge_core::tokens::{self, SentToken};
use serde_json::json;
use tracing::{info, warn};

use super::tenant::{audit, repository};
use crate::AppState;
use crate::error::{AppError, AppResult};

/// Issue a token of `token_type` and deliver its link.
pub async fn send_link(
    state: &AppState,
    tenant: &ConnectedDatabase,
    user_id: &str,
    email: &str,
    token_type: TokenType,
    link_base: Option<&str>,
) -> AppResult<SentToken> {
    if user_id.trim().is_empty() {
        return Err(AppError::Validation("userId is required".into()));
    }
    if !email.contains('@') {
        return Err(AppError::Validation("a valid email is required".into()));
    }

    let default_base = match token_type {
        TokenType::PasswordReset => state.config.reset_url(),
        TokenType::EmailVerification => state.config.verify_url(),
        TokenType::MagicLink => state.config.login_url(),
    };
    let link_base = link_base.filter(|b| !b.is_empty()).unwrap_or(&default_base);

    let sent = tokens::send(
        &state.pool,
        state.notifier.as_ref(),
        tenant,
        user_id,
        email,
        token_type,
        link_base,
        Utc::now(),
    )
    .await?;

    audit(
        state,
        tenant,
        &format!("{token_type}.send"),
        json!({ "userId": user_id, "delivered": sent.delivered }),
    )
    .await;
    Ok(sent)
}

/// Redeem a reset token and store the new password hash. Returns the user id.
pub async fn reset_password(
    state: &AppState,
    tenant: &ConnectedDatabase,
    token: &str,
    new_password: &str,
) -> AppResult<String> {
    if new_password.is_empty() {
        return Err(AppError::Validation("newPassword is required".into()));
    }

    // Resolve everything that can fail before the token is consumed.
    let repo = repository(state, tenant).await?;
    if repo.mapping().password_column.is_none() {
        return Err(AppError::NoPasswordColumn);
    }
    let hash = password::hash_password(new_password)?;

    let redeemed = tokens::redeem(
        &state.pool,
        token,
        TokenType::PasswordReset,
        Some(&tenant.id),
        Utc::now(),
    )
    .await?;
    let user_id = redeemed.external_user_id;

    match repo.update_password(&user_id, &hash).await {
        Ok(0) => {
            warn!(
                database_id = %tenant.id,
                user_id = %user_id,
                "token consumed but user row not found"
            );
            return Err(AppError::NotFound(format!("user {user_id}")));
        }
        Ok(_) => {}
        Err(e) => {
            warn!(
                database_id = %tenant.id,
                user_id = %user_id,
                "token consumed, password not changed: {e}"
            );
            return Err(e.into());
        }
    }

    info!(database_id = %tenant.id, user_id = %user_id, "password reset");
    audit(state, tenant, "password_reset.verify", json!({ "userId": user_id })).await;
    Ok(user_id)
}

/// Redeem a verification token and mark the address verified.
/// Returns `(user_id, email)`.
pub async fn verify_email(
    state: &AppState,
    tenant: &ConnectedDatabase,
    token: &str,
) -> AppResult<(String, String)> {
    let repo = repository(state, tenant).await?;
    let now = Utc::now();
    let redeemed = tokens::redeem(
        &state.pool,
        token,
        TokenType::EmailVerification,
        Some(&tenant.id),
        now,
    )
    .await?;
    let user_id = redeemed.external_user_id;

    if let Err(e) = repo.mark_email_verified(&user_id, now).await {
        warn!(
            database_id = %tenant.id,
            user_id = %user_id,
            "token consumed, verified flag not written: {e}"
        );
        return Err(e.into());
    }

    let email = match redeemed.email {
        Some(email) => email,
        None => repo
            .get_by_id(&user_id)
            .await?
            .map(|u| u.email().to_string())
            .unwrap_or_default(),
    };

    audit(state, tenant, "email_verification.verify", json!({ "userId": user_id })).await;
    Ok((user_id, email))
}

/// Redeem a magic link and return the user to sign in. No tenant writes.
pub async fn verify_magic_link(
    state: &AppState,
    tenant: &ConnectedDatabase,
    token: &str,
) -> AppResult<MinimalUser> {
    let repo = repository(state, tenant).await?;
    let redeemed = tokens::redeem(
        &state.pool,
        token,
        TokenType::MagicLink,
        Some(&tenant.id),
        Utc::now(),
    )
    .await?;

    let user = repo
        .get_by_id(&redeemed.external_user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", redeemed.external_user_id)))?;

    audit(
        state,
        tenant,
        "magic_link.verify",
        json!({ "userId": user.get(Role::Id) }),
    )
    .await;
    Ok(MinimalUser::from(&user))
}
