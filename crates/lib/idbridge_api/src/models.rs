//! Request and response bodies. All JSON is camelCase.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use idbridge_core::introspect::TableColumn;
use idbridge_core::models::ban::{BanType, UserBan};
use idbridge_core::models::mapping::SchemaMapping;
use idbridge_core::models::user::{ExternalUser, MinimalUser, SessionRow};
use idbridge_core::tokens::SentToken;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub db_connected: bool,
}

// ---------------------------------------------------------------------------
// Token flows
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResetRequest {
    pub user_id: String,
    pub email: String,
    pub reset_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendVerificationRequest {
    pub user_id: String,
    pub email: String,
    pub verify_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMagicLinkRequest {
    pub user_id: String,
    pub email: String,
    pub login_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub success: bool,
    pub expires_at: DateTime<Utc>,
    pub delivered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_error: Option<String>,
}

impl From<SentToken> for SendResponse {
    fn from(sent: SentToken) -> Self {
        Self {
            success: true,
            expires_at: sent.expires_at,
            delivered: sent.delivered,
            delivery_error: sent.delivery_error,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResetRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResetResponse {
    pub success: bool,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyTokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailResponse {
    pub success: bool,
    pub user_id: String,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyMagicLinkResponse {
    pub success: bool,
    pub user: MinimalUser,
}

// ---------------------------------------------------------------------------
// Bans
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanCheckQuery {
    pub user_id: String,
}

/// `{banned: false}` or the effective ban's details.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanCheckResponse {
    pub banned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub ban_type: Option<BanType>,
    /// Present whenever `banned` is true; `null` for a permanent ban.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banned_at: Option<DateTime<Utc>>,
}

impl From<Option<UserBan>> for BanCheckResponse {
    fn from(ban: Option<UserBan>) -> Self {
        match ban {
            Some(ban) => Self {
                banned: true,
                reason: Some(ban.reason),
                ban_type: Some(ban.ban_type),
                expires_at: Some(ban.expires_at),
                banned_at: Some(ban.created_at),
            },
            None => Self {
                banned: false,
                reason: None,
                ban_type: None,
                expires_at: None,
                banned_at: None,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBansQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Serialize)]
pub struct BanListResponse {
    pub bans: Vec<UserBan>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnbanResponse {
    pub success: bool,
    pub lifted: bool,
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListResponse {
    pub users: Vec<ExternalUser>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// Column name to value.
    pub fields: BTreeMap<String, Option<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserResponse {
    pub success: bool,
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    /// Role name (`name`, `createdAt`) or raw column name.
    pub field: String,
    pub value: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MutationResponse {
    pub success: bool,
    pub affected: u64,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionRow>,
}

// ---------------------------------------------------------------------------
// Schema and connection
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct TablesResponse {
    pub tables: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ColumnsResponse {
    pub table: String,
    pub columns: Vec<TableColumn>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingResponse {
    pub table_name: String,
    pub mapping: SchemaMapping,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    pub user_count: i64,
    pub last_checked_at: DateTime<Utc>,
}
