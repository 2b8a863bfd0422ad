//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use idbridge_core::bans::BanError;
use idbridge_core::password::HashError;
use idbridge_core::registry::RegistryError;
use idbridge_core::tenants::TenantError;
use idbridge_core::tokens::TokenError;
use idbridge_core::users::RepoError;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    InvalidIdentifier(String),

    #[error("No password column is mapped for this tenant")]
    NoPasswordColumn,

    #[error("No fields provided")]
    NoFieldsProvided,

    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    #[error("Invalid token")]
    InvalidToken,

    #[error("{0}")]
    WrongTokenType(String),

    #[error("Token has already been used")]
    TokenAlreadyUsed,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token belongs to a different tenant")]
    TokenTenantMismatch,

    #[error("Tenant database unavailable: {0}")]
    TenantDbUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::InvalidIdentifier(_) => (StatusCode::BAD_REQUEST, "invalid_identifier"),
            AppError::NoPasswordColumn => (StatusCode::BAD_REQUEST, "no_password_column"),
            AppError::NoFieldsProvided => (StatusCode::BAD_REQUEST, "no_fields_provided"),
            AppError::TenantNotFound(_) => (StatusCode::NOT_FOUND, "tenant_not_found"),
            AppError::InvalidToken => (StatusCode::BAD_REQUEST, "invalid_token"),
            AppError::WrongTokenType(_) => (StatusCode::BAD_REQUEST, "wrong_token_type"),
            AppError::TokenAlreadyUsed => (StatusCode::CONFLICT, "token_already_used"),
            AppError::TokenExpired => (StatusCode::GONE, "token_expired"),
            AppError::TokenTenantMismatch => (StatusCode::FORBIDDEN, "token_tenant_mismatch"),
            AppError::TenantDbUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "tenant_db_unavailable")
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let message = match &self {
            AppError::Internal(detail) => {
                error!("internal error: {detail}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = Json(ErrorResponse {
            error: code.to_string(),
            message,
        });
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".into()),
            _ => AppError::Internal(e.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::InvalidIdentifier(e) => AppError::InvalidIdentifier(e.to_string()),
            RepoError::NoPasswordColumnMapped => AppError::NoPasswordColumn,
            RepoError::NoFieldsProvided => AppError::NoFieldsProvided,
            RepoError::TableNotFound(t) => AppError::NotFound(format!("table {t}")),
            RepoError::Connection(e) => AppError::TenantDbUnavailable(e.to_string()),
            RepoError::Query(sqlx::Error::Database(e)) => AppError::Validation(e.to_string()),
            RepoError::Query(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::UnsupportedEndpoint(_) | RegistryError::InvalidEndpoint(_) => {
                AppError::Validation(e.to_string())
            }
            RegistryError::Connection(e) => AppError::TenantDbUnavailable(e.to_string()),
        }
    }
}

impl From<TenantError> for AppError {
    fn from(e: TenantError) -> Self {
        match e {
            TenantError::NotFound(id) | TenantError::Inactive(id) => AppError::TenantNotFound(id),
            TenantError::Validation(msg) => AppError::Validation(msg),
            TenantError::Encryption(e) => AppError::Internal(e.to_string()),
            TenantError::Repo(e) => AppError::from(e),
            TenantError::Registry(e) => AppError::from(e),
            TenantError::Db(e) => AppError::from(e),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::InvalidToken => AppError::InvalidToken,
            TokenError::WrongTokenType { .. } => AppError::WrongTokenType(e.to_string()),
            TokenError::TokenAlreadyUsed => AppError::TokenAlreadyUsed,
            TokenError::TokenExpired => AppError::TokenExpired,
            TokenError::TokenTenantMismatch => AppError::TokenTenantMismatch,
            TokenError::InvalidLinkBase(msg) => AppError::Validation(msg),
            TokenError::Db(e) => AppError::from(e),
        }
    }
}

impl From<BanError> for AppError {
    fn from(e: BanError) -> Self {
        match e {
            BanError::Validation(msg) => AppError::Validation(msg),
            BanError::Db(e) => AppError::from(e),
        }
    }
}

impl From<HashError> for AppError {
    fn from(e: HashError) -> Self {
        AppError::Internal(e.to_string())
    }
}
