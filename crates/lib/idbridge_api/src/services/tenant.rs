//! Tenant-database access for handlers.

use chrono::Utc;
use idbridge_core::models::audit::AuditEvent;
use idbridge_core::models::tenant::ConnectedDatabase;
use idbridge_core::registry::TenantHandle;
use idbridge_core::tenants;
use idbridge_core::users::UserRepository;

use crate::AppState;
use crate::error::AppResult;

/// Pooled handle to the tenant's database.
pub async fn handle(state: &AppState, tenant: &ConnectedDatabase) -> AppResult<TenantHandle> {
    Ok(tenants::connect(state.registry.as_ref(), tenant, state.cipher.as_ref()).await?)
}

/// User repository with the stored (or freshly detected) mapping.
pub async fn repository(state: &AppState, tenant: &ConnectedDatabase) -> AppResult<UserRepository> {
    Ok(tenants::open_repository(
        &state.pool,
        state.registry.as_ref(),
        state.cipher.as_ref(),
        tenant,
        Utc::now(),
    )
    .await?)
}

/// Record a mutating action against a tenant.
pub async fn audit(
    state: &AppState,
    tenant: &ConnectedDatabase,
    action: &str,
    details: serde_json::Value,
) {
    let actor = format!("tenant:{}", tenant.name);
    let event = AuditEvent::new(action, &actor, Some(&tenant.id)).with_details(details);
    state.audit.record(event).await;
}
