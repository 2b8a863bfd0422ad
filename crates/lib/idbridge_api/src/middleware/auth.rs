//! Tenant authentication middleware: bearer key to tenant.

use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use idbridge_core::models::tenant::ConnectedDatabase;
use idbridge_core::tenants;

use crate::AppState;
use crate::error::AppError;

/// The active tenant a request is scoped to, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedTenant(pub ConnectedDatabase);

/// Axum middleware: extracts `Authorization: Bearer <key>`, resolves the
/// active tenant owning that key, and injects `AuthenticatedTenant`.
pub async fn require_tenant(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    let key = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))?;

    let tenant = tenants::get_by_api_key(&state.pool, key)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Unknown or inactive tenant key".into()))?;

    request.extensions_mut().insert(AuthenticatedTenant(tenant));
    Ok(next.run(request).await)
}
