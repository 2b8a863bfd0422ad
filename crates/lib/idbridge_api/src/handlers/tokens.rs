//! Password reset, email verification and magic-link handlers.

use axum::extract::State;
use axum::{Extension, Json};
use idbridge_core::models::token::TokenType;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedTenant;
use crate::models::{
    SendMagicLinkRequest, SendResetRequest, SendResponse, SendVerificationRequest,
    VerifyEmailResponse, VerifyMagicLinkResponse, VerifyResetRequest, VerifyResetResponse,
    VerifyTokenRequest,
};
use crate::services::identity;

/// `POST /api/password-reset/send`
pub async fn send_password_reset(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
    Json(body): Json<SendResetRequest>,
) -> AppResult<Json<SendResponse>> {
    let sent = identity::send_link(
        &state,
        &tenant,
        &body.user_id,
        &body.email,
        TokenType::PasswordReset,
        body.reset_url.as_deref(),
    )
    .await?;
    Ok(Json(sent.into()))
}

/// `POST /api/password-reset/verify`
pub async fn verify_password_reset(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
    Json(body): Json<VerifyResetRequest>,
) -> AppResult<Json<VerifyResetResponse>> {
    let user_id =
        identity::reset_password(&state, &tenant, &body.token, &body.new_password).await?;
    Ok(Json(VerifyResetResponse {
        success: true,
        user_id,
    }))
}

/// `POST /api/email-verification/send`
pub async fn send_verification(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
    Json(body): Json<SendVerificationRequest>,
) -> AppResult<Json<SendResponse>> {
    let sent = identity::send_link(
        &state,
        &tenant,
        &body.user_id,
        &body.email,
        TokenType::EmailVerification,
        body.verify_url.as_deref(),
    )
    .await?;
    Ok(Json(sent.into()))
}

/// `POST /api/email-verification/verify`
pub async fn verify_email(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
    Json(body): Json<VerifyTokenRequest>,
) -> AppResult<Json<VerifyEmailResponse>> {
    let (user_id, email) = identity::verify_email(&state, &tenant, &body.token).await?;
    Ok(Json(VerifyEmailResponse {
        success: true,
        user_id,
        email,
    }))
}

/// `POST /api/magic-link/send`
pub async fn send_magic_link(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
    Json(body): Json<SendMagicLinkRequest>,
) -> AppResult<Json<SendResponse>> {
    let sent = identity::send_link(
        &state,
        &tenant,
        &body.user_id,
        &body.email,
        TokenType::MagicLink,
        body.login_url.as_deref(),
    )
    .await?;
    Ok(Json(sent.into()))
}

/// `POST /api/magic-link/verify`
pub async fn verify_magic_link(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
    Json(body): Json<VerifyTokenRequest>,
) -> AppResult<Json<VerifyMagicLinkResponse>> {
    let user = identity::verify_magic_link(&state, &tenant, &body.token).await?;
    Ok(Json(VerifyMagicLinkResponse {
        success: true,
        user,
    }))
}
