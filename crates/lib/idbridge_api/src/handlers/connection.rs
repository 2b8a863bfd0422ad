//! Tenant connection handlers.

use axum::extract::State;
use axum::{Extension, Json};
use chrono::Utc;
use idbridge_core::tenants;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedTenant;
use crate::models::RefreshResponse;

/// `POST /api/connection/refresh` — recount users and cache the result.
pub async fn refresh(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
) -> AppResult<Json<RefreshResponse>> {
    let now = Utc::now();
    let user_count = tenants::refresh_stats(
        &state.pool,
        state.registry.as_ref(),
        state.cipher.as_ref(),
        &tenant,
        now,
    )
    .await?;
    Ok(Json(RefreshResponse {
        success: true,
        user_count,
        last_checked_at: now,
    }))
}
