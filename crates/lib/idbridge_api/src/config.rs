//! API server configuration.

/// Default control-plane database.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://idbridge.db?mode=rwc";

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3100";

/// Default base for links sent to end users.
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// Control-plane connection URL (PostgreSQL or SQLite).
    pub database_url: String,
    /// Control-plane pool size.
    pub max_connections: u32,
    /// Passphrase for tenant credential encryption.
    pub encryption_key: Option<String>,
    /// Base URL that default reset/verify/login links are built from.
    pub public_base_url: String,
    /// Webhook receiving notifications; `None` logs them instead.
    pub notify_webhook_url: Option<String>,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                    | Default                          |
    /// |-----------------------------|----------------------------------|
    /// | `BIND_ADDR`                 | `127.0.0.1:3100`                 |
    /// | `DATABASE_URL`              | `sqlite://idbridge.db?mode=rwc`  |
    /// | `DATABASE_MAX_CONNECTIONS`  | `10`                             |
    /// | `CREDENTIAL_ENCRYPTION_KEY` | unset                            |
    /// | `PUBLIC_BASE_URL`           | `http://localhost:3000`          |
    /// | `NOTIFY_WEBHOOK_URL`        | unset                            |
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.into()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.into()),
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            encryption_key: non_empty_env("CREDENTIAL_ENCRYPTION_KEY"),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_PUBLIC_BASE_URL.into()),
            notify_webhook_url: non_empty_env("NOTIFY_WEBHOOK_URL"),
        }
    }

    pub fn reset_url(&self) -> String {
        self.link("reset-password")
    }

    pub fn verify_url(&self) -> String {
        self.link("verify-email")
    }

    pub fn login_url(&self) -> String {
        self.link("magic-link")
    }

    fn link(&self, path: &str) -> String {
        format!("{}/{path}", self.public_base_url.trim_end_matches('/'))
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
