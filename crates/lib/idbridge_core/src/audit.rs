//! Audit trail for mutating operations.
//!
//! Recording is fire-and-forget: a failed write is logged and never fails
//! the operation being audited.

use async_trait::async_trait;
use sqlx::AnyPool;
use tracing::warn;

use crate::db::to_millis;
use crate::models::audit::AuditEvent;
use crate::uuid::new_id;

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Writes events to the control-plane `audit_events` table.
#[derive(Debug, Clone)]
pub struct DbAuditSink {
    pool: AnyPool,
}

impl DbAuditSink {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for DbAuditSink {
    async fn record(&self, event: AuditEvent) {
        let result = sqlx::query(
            "INSERT INTO audit_events (id, action, actor, database_id, details, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(new_id())
        .bind(&event.action)
        .bind(&event.actor)
        .bind(event.database_id.as_deref())
        .bind(event.details.to_string())
        .bind(to_millis(event.created_at))
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(action = %event.action, "failed to record audit event: {e}");
        }
    }
}

/// Most recent events, newest first, optionally for one tenant.
pub async fn recent_events(
    pool: &AnyPool,
    database_id: Option<&str>,
    limit: i64,
) -> Result<Vec<AuditEvent>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String, String, Option<String>, Option<String>, i64)>(
        "SELECT action, actor, database_id, details, created_at FROM audit_events \
         WHERE ($1 IS NULL OR database_id = $1) \
         ORDER BY created_at DESC, id DESC LIMIT $2",
    )
    .bind(database_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(action, actor, database_id, details, created_at)| AuditEvent {
            action,
            actor,
            database_id,
            details: details
                .and_then(|d| serde_json::from_str(&d).ok())
                .unwrap_or(serde_json::Value::Null),
            created_at: crate::db::from_millis(created_at),
        })
        .collect())
}
