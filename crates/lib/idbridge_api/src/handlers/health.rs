//! Health endpoint.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::models::HealthResponse;

/// `GET /api/health` — version and control-plane connectivity. Public.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_connected = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();
    Json(HealthResponse {
        status: if db_connected { "ok" } else { "degraded" },
        version: idbridge_core::version(),
        db_connected,
    })
}
