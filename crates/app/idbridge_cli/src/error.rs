use idbridge_core::bans::BanError;
use idbridge_core::secrets::SecretError;
use idbridge_core::tenants::TenantError;
use idbridge_core::tokens::TokenError;
use idbridge_core::users::RepoError;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{}", .0)]
    Custom(String),

    #[error("IO::{:?}: {}", .0, .0)]
    Io(#[from] std::io::Error),

    #[error("FlexiLogger::{:?}: {}", .0, .0)]
    FlexiLogger(#[from] flexi_logger::FlexiLoggerError),

    #[error("Database: {}", .0)]
    Db(#[from] sqlx::Error),

    #[error("Migration: {}", .0)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Json: {}", .0)]
    Json(#[from] serde_json::Error),

    #[error("{}", .0)]
    Tenant(#[from] TenantError),

    #[error("{}", .0)]
    Repo(#[from] RepoError),

    #[error("{}", .0)]
    Ban(#[from] BanError),

    #[error("{}", .0)]
    Token(#[from] TokenError),

    #[error("{}", .0)]
    Secret(#[from] SecretError),
}
