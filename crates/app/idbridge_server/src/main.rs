//! idbridge API server binary.
//!
//! Connects the control plane, runs migrations and serves the tenant API
//! until interrupted. Tenant pools are closed on the way out.

use std::sync::Arc;

use clap::Parser;
use idbridge_api::config::{
    ApiConfig, DEFAULT_BIND_ADDR, DEFAULT_DATABASE_URL, DEFAULT_PUBLIC_BASE_URL,
};
use idbridge_core::notify::{LogNotifier, Notifier, WebhookNotifier};
use idbridge_core::registry::PoolRegistry;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "idbridge_server", about = "idbridge API server", version)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = DEFAULT_BIND_ADDR)]
    bind: String,

    /// Control-plane connection URL (PostgreSQL or SQLite).
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    database_url: String,

    /// Maximum number of control-plane connections in the pool.
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,

    /// Passphrase used to encrypt tenant credentials at rest.
    #[arg(long, env = "CREDENTIAL_ENCRYPTION_KEY", hide_env_values = true)]
    encryption_key: Option<String>,

    /// Base URL that default reset, verification and login links point at.
    #[arg(long, env = "PUBLIC_BASE_URL", default_value = DEFAULT_PUBLIC_BASE_URL)]
    public_base_url: String,

    /// Webhook receiving notifications as JSON. Notifications are only
    /// logged when unset.
    #[arg(long, env = "NOTIFY_WEBHOOK_URL")]
    notify_webhook: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,idbridge_api=debug,idbridge_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    info!(
        bind = %args.bind,
        max_connections = args.max_connections,
        "starting idbridge_server"
    );

    let pool = idbridge_core::db::connect(&args.database_url, args.max_connections).await?;

    info!("running database migrations");
    idbridge_api::migrate(&pool).await?;

    let config = ApiConfig {
        bind_addr: args.bind,
        database_url: args.database_url,
        max_connections: args.max_connections,
        encryption_key: args.encryption_key.filter(|k| !k.trim().is_empty()),
        public_base_url: args.public_base_url,
        notify_webhook_url: args.notify_webhook.filter(|u| !u.trim().is_empty()),
    };
    if config.encryption_key.is_none() {
        warn!("no credential encryption key configured; tenants with credentials cannot connect");
    }

    let notifier: Arc<dyn Notifier> = match config.notify_webhook_url.as_deref() {
        Some(url) => Arc::new(WebhookNotifier::new(url)?),
        None => Arc::new(LogNotifier),
    };
    info!(notifier = notifier.name(), "notifier ready");

    let registry = Arc::new(PoolRegistry::new());
    let state =
        idbridge_api::AppState::new(pool.clone(), config.clone(), registry.clone(), notifier)?;
    let app = idbridge_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    registry.close_all().await;
    pool.close().await;
    served?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
