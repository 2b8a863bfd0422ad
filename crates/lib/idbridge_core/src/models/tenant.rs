//! Connected (tenant) database model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One tenant application and the external database holding its users.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedDatabase {
    pub id: String,
    pub name: String,
    pub app_name: String,
    pub endpoint: String,
    /// AES-256-GCM ciphertext of the connection credential, never serialized.
    #[serde(skip)]
    pub credential_encrypted: Option<String>,
    pub table_name: String,
    pub user_count: Option<i64>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Operator input for registering a tenant database.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConnection {
    pub name: String,
    pub app_name: String,
    pub endpoint: String,
    pub credential: Option<String>,
    pub table_name: String,
}
