//! Schema introspection and mapping handlers.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::Utc;
use idbridge_core::introspect::{self, DatabaseOverview};
use idbridge_core::models::mapping::SchemaMapping;
use idbridge_core::tenants;
use serde_json::json;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedTenant;
use crate::models::{ColumnsResponse, MappingResponse, TablesResponse};
use crate::services::tenant::{audit, handle};

/// `GET /api/schema/tables`
pub async fn list_tables(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
) -> AppResult<Json<TablesResponse>> {
    let handle = handle(&state, &tenant).await?;
    let tables = introspect::get_tables(&handle).await?;
    Ok(Json(TablesResponse { tables }))
}

/// `GET /api/schema/tables/{table}/columns`
pub async fn table_columns(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
    Path(table): Path<String>,
) -> AppResult<Json<ColumnsResponse>> {
    let handle = handle(&state, &tenant).await?;
    let columns = introspect::get_table_columns(&handle, &table).await?;
    Ok(Json(ColumnsResponse { table, columns }))
}

/// `GET /api/schema/overview`
pub async fn overview(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
) -> AppResult<Json<DatabaseOverview>> {
    let handle = handle(&state, &tenant).await?;
    Ok(Json(introspect::get_database_overview(&handle).await?))
}

/// `GET /api/schema/mapping` — stored mapping, detected on first use.
pub async fn get_mapping(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
) -> AppResult<Json<MappingResponse>> {
    let handle = handle(&state, &tenant).await?;
    let mapping =
        tenants::load_or_detect_mapping(&state.pool, &handle, &tenant, Utc::now()).await?;
    Ok(Json(MappingResponse {
        table_name: tenant.table_name,
        mapping,
    }))
}

/// `PUT /api/schema/mapping` — operator override.
pub async fn put_mapping(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
    Json(mapping): Json<SchemaMapping>,
) -> AppResult<Json<MappingResponse>> {
    tenants::save_mapping(&state.pool, &tenant.id, &mapping, Utc::now()).await?;
    audit(&state, &tenant, "schema.mapping.update", json!(mapping)).await;
    Ok(Json(MappingResponse {
        table_name: tenant.table_name,
        mapping,
    }))
}

/// `POST /api/schema/detect` — re-run detection and persist the result.
pub async fn detect(
    State(state): State<AppState>,
    Extension(AuthenticatedTenant(tenant)): Extension<AuthenticatedTenant>,
) -> AppResult<Json<MappingResponse>> {
    let handle = handle(&state, &tenant).await?;
    let mapping = tenants::redetect_mapping(&state.pool, &handle, &tenant, Utc::now()).await?;
    audit(&state, &tenant, "schema.mapping.detect", json!(mapping)).await;
    Ok(Json(MappingResponse {
        table_name: tenant.table_name,
        mapping,
    }))
}
