//! Ban management handlers.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::Utc;
use idbridge_core::bans::{self, BanRequest};
use idbridge_core::models::ban::UserBan;
use serde_json::json;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedTenant;
use crate::models::{
    BanCheckQuery, BanCheckResponse, BanListResponse, ListBansQuery, UnbanResponse,
};
use crate::services::tenant::audit;

/// `GET /api/bans/check?userId=`
pub async fn check_ban(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
    Query(query): Query<BanCheckQuery>,
) -> AppResult<Json<BanCheckResponse>> {
    let status = bans::check_ban(&state.pool, &tenant.id, &query.user_id, Utc::now()).await?;
    Ok(Json(status.ban.into()))
}

/// `GET /api/bans`
pub async fn list_bans(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
    Query(query): Query<ListBansQuery>,
) -> AppResult<Json<BanListResponse>> {
    let bans = bans::list_bans(&state.pool, &tenant.id, query.active_only, Utc::now()).await?;
    Ok(Json(BanListResponse { bans }))
}

/// `POST /api/bans` — create or supersede the user's active ban.
pub async fn create_ban(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
    Json(mut body): Json<BanRequest>,
) -> AppResult<Json<UserBan>> {
    if body.banned_by.is_none() {
        body.banned_by = Some(format!("tenant:{}", tenant.name));
    }
    let ban = bans::ban(&state.pool, &tenant.id, &body, Utc::now()).await?;
    audit(
        &state,
        &tenant,
        "ban.create",
        json!({ "userId": ban.external_user_id, "type": ban.ban_type, "reason": ban.reason }),
    )
    .await;
    Ok(Json(ban))
}

/// `DELETE /api/bans/{userId}` — idempotent.
pub async fn lift_ban(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
    Path(user_id): Path<String>,
) -> AppResult<Json<UnbanResponse>> {
    let lifted_by = format!("tenant:{}", tenant.name);
    let lifted =
        bans::unban(&state.pool, &tenant.id, &user_id, Some(&lifted_by), Utc::now()).await?;
    if lifted {
        audit(&state, &tenant, "ban.lift", json!({ "userId": user_id })).await;
    }
    Ok(Json(UnbanResponse {
        success: true,
        lifted,
    }))
}
