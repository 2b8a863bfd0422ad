//! Control-plane database connection.
//!
//! The control plane stores tenants, schema mappings, tokens, bans and audit
//! events. It is reached through sqlx's `Any` driver so the same code runs on
//! PostgreSQL in production and SQLite for development and tests.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;

/// Maximum time to wait for a pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect to the control-plane database.
///
/// In-memory SQLite URLs are pinned to a single, never-recycled connection:
/// each SQLite connection to `:memory:` is its own database.
pub async fn connect(url: &str, max_connections: u32) -> Result<AnyPool, sqlx::Error> {
    sqlx::any::install_default_drivers();

    let mut options = AnyPoolOptions::new().acquire_timeout(ACQUIRE_TIMEOUT);
    if is_in_memory(url) {
        options = options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    } else {
        options = options.max_connections(max_connections.max(1));
    }

    let pool = options.connect(url).await?;
    tracing::debug!(in_memory = is_in_memory(url), "control-plane pool ready");
    Ok(pool)
}

/// Whether a URL points at an in-memory SQLite database.
pub fn is_in_memory(url: &str) -> bool {
    url.starts_with("sqlite:") && (url.contains(":memory:") || url.contains("mode=memory"))
}

/// Timestamps are persisted as Unix milliseconds (portable across backends).
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Inverse of [`to_millis`]; out-of-range values collapse to the epoch.
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
