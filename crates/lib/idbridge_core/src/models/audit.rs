//! Audit event model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only record of a mutating action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub action: String,
    pub actor: String,
    pub database_id: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: &str, actor: &str, database_id: Option<&str>) -> Self {
        Self {
            action: action.to_string(),
            actor: actor.to_string(),
            database_id: database_id.map(str::to_string),
            details: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}
