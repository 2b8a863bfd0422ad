//! Tenant (connected database) store.
//!
//! Tenants live in the control plane; this module also bridges a tenant
//! record to its external database: decrypting the credential, obtaining a
//! pooled handle, and loading or detecting the schema mapping.

pub mod queries;

use chrono::{DateTime, Utc};
use sqlx::AnyPool;
use thiserror::Error;
use tracing::info;

use crate::introspect;
use crate::models::mapping::SchemaMapping;
use crate::models::tenant::ConnectedDatabase;
use crate::registry::{ConnectionProvider, RegistryError, TenantHandle};
use crate::secrets::{CredentialCipher, SecretError};
use crate::users::{RepoError, UserRepository};

pub use queries::{
    deactivate, get, get_by_api_key, list, load_mapping, record_stats, register, rotate_api_key,
    save_mapping,
};

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("Tenant not found: {0}")]
    NotFound(String),

    #[error("Tenant is inactive: {0}")]
    Inactive(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Encryption(#[from] SecretError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Fetch a tenant that must exist and be active.
pub async fn require_active(pool: &AnyPool, id: &str) -> Result<ConnectedDatabase, TenantError> {
    let tenant = get(pool, id)
        .await?
        .ok_or_else(|| TenantError::NotFound(id.to_string()))?;
    if !tenant.active {
        return Err(TenantError::Inactive(id.to_string()));
    }
    Ok(tenant)
}

/// Plaintext connection credential, if one is stored.
pub fn credential(
    tenant: &ConnectedDatabase,
    cipher: Option<&CredentialCipher>,
) -> Result<Option<String>, TenantError> {
    match (&tenant.credential_encrypted, cipher) {
        (None, _) => Ok(None),
        (Some(sealed), Some(cipher)) => Ok(Some(cipher.open(sealed)?)),
        (Some(_), None) => Err(TenantError::Validation(
            "tenant has an encrypted credential but no encryption key is configured".into(),
        )),
    }
}

/// Pooled handle to the tenant's database.
pub async fn connect(
    provider: &dyn ConnectionProvider,
    tenant: &ConnectedDatabase,
    cipher: Option<&CredentialCipher>,
) -> Result<TenantHandle, TenantError> {
    let secret = credential(tenant, cipher)?;
    Ok(provider.handle(&tenant.endpoint, secret.as_deref()).await?)
}

/// Stored mapping, or a detected one which is then persisted.
pub async fn load_or_detect_mapping(
    pool: &AnyPool,
    handle: &TenantHandle,
    tenant: &ConnectedDatabase,
    now: DateTime<Utc>,
) -> Result<SchemaMapping, TenantError> {
    if let Some(mapping) = load_mapping(pool, &tenant.id).await? {
        return Ok(mapping);
    }
    redetect_mapping(pool, handle, tenant, now).await
}

/// Run detection against the tenant table and overwrite the stored mapping.
pub async fn redetect_mapping(
    pool: &AnyPool,
    handle: &TenantHandle,
    tenant: &ConnectedDatabase,
    now: DateTime<Utc>,
) -> Result<SchemaMapping, TenantError> {
    let mapping = introspect::detect(handle, &tenant.table_name).await?;
    save_mapping(pool, &tenant.id, &mapping, now).await?;
    info!(database_id = %tenant.id, table = %tenant.table_name, "schema mapping detected");
    Ok(mapping)
}

/// Repository over the tenant's users table, mapping resolved on the way.
pub async fn open_repository(
    pool: &AnyPool,
    provider: &dyn ConnectionProvider,
    cipher: Option<&CredentialCipher>,
    tenant: &ConnectedDatabase,
    now: DateTime<Utc>,
) -> Result<UserRepository, TenantError> {
    let handle = connect(provider, tenant, cipher).await?;
    let mapping = load_or_detect_mapping(pool, &handle, tenant, now).await?;
    Ok(UserRepository::new(handle, tenant.table_name.clone(), mapping))
}

/// Recount the tenant's users and cache the result. Returns the count.
pub async fn refresh_stats(
    pool: &AnyPool,
    provider: &dyn ConnectionProvider,
    cipher: Option<&CredentialCipher>,
    tenant: &ConnectedDatabase,
    now: DateTime<Utc>,
) -> Result<i64, TenantError> {
    let repo = open_repository(pool, provider, cipher, tenant, now).await?;
    let count = repo.count().await?;
    record_stats(pool, &tenant.id, count, now).await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tenant::NewConnection;
    use crate::registry::PoolRegistry;

    async fn control_plane() -> AnyPool {
        let pool = crate::db::connect("sqlite::memory:", 1).await.unwrap();
        crate::migrate::migrate(&pool).await.unwrap();
        pool
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_790_000_000, 0).unwrap()
    }

    fn new_connection(endpoint: &str, table: &str, credential: Option<&str>) -> NewConnection {
        NewConnection {
            name: "shop-prod".into(),
            app_name: "Shop".into(),
            endpoint: endpoint.into(),
            credential: credential.map(str::to_string),
            table_name: table.into(),
        }
    }

    #[tokio::test]
    async fn register_stores_only_key_hash_and_sealed_credential() {
        let pool = control_plane().await;
        let cipher = CredentialCipher::new("k").unwrap();
        let (tenant, key) = register(
            &pool,
            Some(&cipher),
            &new_connection("postgres://app@db/shop", "users", Some("pw")),
            t0(),
        )
        .await
        .unwrap();

        let stored_hash: String =
            sqlx::query_scalar("SELECT api_key_hash FROM connected_databases WHERE id = $1")
                .bind(&tenant.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_ne!(stored_hash, key);

        let found = get_by_api_key(&pool, &key).await.unwrap().unwrap();
        assert_eq!(found.id, tenant.id);
        assert_eq!(credential(&found, Some(&cipher)).unwrap().as_deref(), Some("pw"));
        assert!(credential(&found, None).is_err());
    }

    #[tokio::test]
    async fn register_rejects_bad_input() {
        let pool = control_plane().await;
        for (endpoint, table, cred) in [
            ("sqlite::memory:", "users; --", None),
            ("mysql://db/shop", "users", None),
            ("postgres://db/shop", "users", Some("pw")),
        ] {
            assert!(
                register(&pool, None, &new_connection(endpoint, table, cred), t0())
                    .await
                    .is_err(),
                "{endpoint} {table}"
            );
        }
        assert!(list(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rotation_and_deactivation_revoke_keys() {
        let pool = control_plane().await;
        let (tenant, old_key) = register(
            &pool,
            None,
            &new_connection("sqlite::memory:", "users", None),
            t0(),
        )
        .await
        .unwrap();

        let new_key = rotate_api_key(&pool, &tenant.id).await.unwrap();
        assert!(get_by_api_key(&pool, &old_key).await.unwrap().is_none());
        assert!(get_by_api_key(&pool, &new_key).await.unwrap().is_some());

        assert!(deactivate(&pool, &tenant.id).await.unwrap());
        assert!(!deactivate(&pool, &tenant.id).await.unwrap());
        assert!(get_by_api_key(&pool, &new_key).await.unwrap().is_none());
        assert!(matches!(
            require_active(&pool, &tenant.id).await,
            Err(TenantError::Inactive(_))
        ));
        assert!(matches!(
            rotate_api_key(&pool, "missing").await,
            Err(TenantError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn mapping_is_detected_once_then_loaded() {
        let pool = control_plane().await;
        let registry = PoolRegistry::new();
        let (tenant, _) = register(
            &pool,
            None,
            &new_connection("sqlite::memory:", "members", None),
            t0(),
        )
        .await
        .unwrap();

        let handle = connect(&registry, &tenant, None).await.unwrap();
        for sql in [
            "CREATE TABLE members (id INTEGER PRIMARY KEY, email TEXT, full_name TEXT)",
            "INSERT INTO members (email, full_name) VALUES ('a@b.com', 'Ann'), ('c@d.com', 'Cy')",
        ] {
            sqlx::query(sql).execute(&handle.pool).await.unwrap();
        }

        let detected = load_or_detect_mapping(&pool, &handle, &tenant, t0())
            .await
            .unwrap();
        assert_eq!(detected.name_column.as_deref(), Some("full_name"));

        // Operator override wins over detection from now on.
        let mut edited = detected.clone();
        edited.name_column = None;
        save_mapping(&pool, &tenant.id, &edited, t0()).await.unwrap();
        let loaded = load_or_detect_mapping(&pool, &handle, &tenant, t0())
            .await
            .unwrap();
        assert_eq!(loaded, edited);

        let count = refresh_stats(&pool, &registry, None, &tenant, t0()).await.unwrap();
        assert_eq!(count, 2);
        let refreshed = get(&pool, &tenant.id).await.unwrap().unwrap();
        assert_eq!(refreshed.user_count, Some(2));
        assert_eq!(refreshed.last_checked_at, Some(t0()));
    }

    #[tokio::test]
    async fn save_mapping_validates_names() {
        let pool = control_plane().await;
        let (tenant, _) = register(
            &pool,
            None,
            &new_connection("sqlite::memory:", "users", None),
            t0(),
        )
        .await
        .unwrap();

        let mut mapping = SchemaMapping::new("id", "email");
        mapping.role_column = Some("role\" --".into());
        assert!(matches!(
            save_mapping(&pool, &tenant.id, &mapping, t0()).await,
            Err(TenantError::Validation(_))
        ));

        let mut half = SchemaMapping::new("id", "email");
        half.session_table = Some("sessions".into());
        assert!(save_mapping(&pool, &tenant.id, &half, t0()).await.is_err());
        assert!(load_mapping(&pool, &tenant.id).await.unwrap().is_none());
    }
}
