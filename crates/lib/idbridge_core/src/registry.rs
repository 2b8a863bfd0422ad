//! Connection registry for tenant databases.
//!
//! Maps a tenant endpoint to a reusable pool handle. The registry is an
//! explicit object passed around behind [`ConnectionProvider`] so tests can
//! pre-seed or replace it, and so the server can close every pool on shutdown.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use thiserror::Error;
use tracing::{debug, info};

/// Default pool size per tenant endpoint.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default time to wait for a tenant connection.
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unsupported database endpoint: {0}")]
    UnsupportedEndpoint(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Connection failed: {0}")]
    Connection(#[source] sqlx::Error),
}

/// SQL dialect of a tenant database, derived from its endpoint scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    pub fn from_endpoint(endpoint: &str) -> Result<Self, RegistryError> {
        let scheme = endpoint.split(':').next().unwrap_or_default();
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "sqlite" => Ok(Dialect::Sqlite),
            _ => Err(RegistryError::UnsupportedEndpoint(scheme.to_string())),
        }
    }
}

/// A pooled connection to one tenant database.
#[derive(Debug, Clone)]
pub struct TenantHandle {
    pub pool: AnyPool,
    pub dialect: Dialect,
}

/// Resolves an endpoint (plus optional credential) to a usable handle.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn handle(
        &self,
        endpoint: &str,
        credential: Option<&str>,
    ) -> Result<TenantHandle, RegistryError>;
}

/// Process-wide, append-only pool cache keyed by endpoint.
///
/// A concurrent miss for the same endpoint may build two pools; the first
/// one inserted wins and the other is dropped.
pub struct PoolRegistry {
    handles: DashMap<String, TenantHandle>,
    max_connections: u32,
    acquire_timeout: Duration,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_CONNECTIONS, DEFAULT_ACQUIRE_TIMEOUT)
    }

    pub fn with_limits(max_connections: u32, acquire_timeout: Duration) -> Self {
        sqlx::any::install_default_drivers();
        Self {
            handles: DashMap::new(),
            max_connections: max_connections.max(1),
            acquire_timeout,
        }
    }

    /// Seed the cache with an existing handle (fixtures, shared pools).
    pub fn insert(&self, endpoint: &str, handle: TenantHandle) {
        self.handles.insert(endpoint.to_string(), handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Close every cached pool. Called once at process shutdown.
    pub async fn close_all(&self) {
        let pools: Vec<AnyPool> = self.handles.iter().map(|h| h.pool.clone()).collect();
        self.handles.clear();
        for pool in pools {
            pool.close().await;
        }
        info!("closed all tenant pools");
    }

    async fn open(
        &self,
        endpoint: &str,
        credential: Option<&str>,
    ) -> Result<TenantHandle, RegistryError> {
        let dialect = Dialect::from_endpoint(endpoint)?;
        let url = connection_url(endpoint, dialect, credential)?;

        let mut options = AnyPoolOptions::new().acquire_timeout(self.acquire_timeout);
        if crate::db::is_in_memory(endpoint) {
            options = options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            options = options.max_connections(self.max_connections);
        }

        let pool = options
            .connect(&url)
            .await
            .map_err(RegistryError::Connection)?;
        debug!(?dialect, "opened tenant pool");
        Ok(TenantHandle { pool, dialect })
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionProvider for PoolRegistry {
    async fn handle(
        &self,
        endpoint: &str,
        credential: Option<&str>,
    ) -> Result<TenantHandle, RegistryError> {
        if let Some(existing) = self.handles.get(endpoint) {
            return Ok(existing.value().clone());
        }

        let handle = self.open(endpoint, credential).await?;
        let entry = self
            .handles
            .entry(endpoint.to_string())
            .or_insert(handle);
        Ok(entry.value().clone())
    }
}

/// Build the driver URL, injecting the credential as the password for
/// network databases.
fn connection_url(
    endpoint: &str,
    dialect: Dialect,
    credential: Option<&str>,
) -> Result<String, RegistryError> {
    match (dialect, credential) {
        (Dialect::Postgres, Some(secret)) if !secret.is_empty() => {
            let mut url = url::Url::parse(endpoint)
                .map_err(|e| RegistryError::InvalidEndpoint(e.to_string()))?;
            url.set_password(Some(secret))
                .map_err(|_| RegistryError::InvalidEndpoint("cannot carry a password".into()))?;
            Ok(url.to_string())
        }
        _ => Ok(endpoint.to_string()),
    }
}
