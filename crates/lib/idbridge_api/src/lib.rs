//! # idbridge_api
//!
//! HTTP API for the identity bridge. Every route except the health check is
//! scoped to one tenant by its bearer key.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use idbridge_core::audit::{AuditSink, DbAuditSink};
use idbridge_core::notify::Notifier;
use idbridge_core::registry::ConnectionProvider;
use idbridge_core::secrets::{CredentialCipher, SecretError};
use sqlx::AnyPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{bans, connection, health, schema, tokens, users};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Control-plane connection pool.
    pub pool: AnyPool,
    /// API configuration.
    pub config: ApiConfig,
    /// Tenant connection cache.
    pub registry: Arc<dyn ConnectionProvider>,
    /// Link delivery.
    pub notifier: Arc<dyn Notifier>,
    pub audit: Arc<dyn AuditSink>,
    /// Present when an encryption key is configured.
    pub cipher: Option<CredentialCipher>,
}

impl AppState {
    /// State with the control-plane audit sink.
    pub fn new(
        pool: AnyPool,
        config: ApiConfig,
        registry: Arc<dyn ConnectionProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, SecretError> {
        let cipher = config
            .encryption_key
            .as_deref()
            .map(CredentialCipher::new)
            .transpose()?;
        Ok(Self {
            audit: Arc::new(DbAuditSink::new(pool.clone())),
            pool,
            config,
            registry,
            notifier,
            cipher,
        })
    }
}

/// Run embedded control-plane migrations.
///
/// Delegates to `idbridge_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &AnyPool) -> Result<(), sqlx::migrate::MigrateError> {
    idbridge_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new().route("/api/health", get(health::health));

    let tenant = Router::new()
        .route(
            "/api/password-reset/send",
            post(tokens::send_password_reset),
        )
        .route(
            "/api/password-reset/verify",
            post(tokens::verify_password_reset),
        )
        .route(
            "/api/email-verification/send",
            post(tokens::send_verification),
        )
        .route(
            "/api/email-verification/verify",
            post(tokens::verify_email),
        )
        .route("/api/magic-link/send", post(tokens::send_magic_link))
        .route("/api/magic-link/verify", post(tokens::verify_magic_link))
        .route("/api/bans/check", get(bans::check_ban))
        .route("/api/bans", get(bans::list_bans).post(bans::create_ban))
        .route("/api/bans/{user_id}", axum::routing::delete(bans::lift_ban))
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/users/{id}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route(
            "/api/users/{id}/sessions",
            get(users::list_sessions).delete(users::delete_sessions),
        )
        .route("/api/schema/tables", get(schema::list_tables))
        .route(
            "/api/schema/tables/{table}/columns",
            get(schema::table_columns),
        )
        .route("/api/schema/overview", get(schema::overview))
        .route(
            "/api/schema/mapping",
            get(schema::get_mapping).put(schema::put_mapping),
        )
        .route("/api/schema/detect", post(schema::detect))
        .route("/api/connection/refresh", post(connection::refresh))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_tenant,
        ));

    Router::new()
        .merge(public)
        .merge(tenant)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
