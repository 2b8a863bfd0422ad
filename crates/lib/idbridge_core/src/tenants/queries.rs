//! Control-plane queries for tenants and their schema mappings.

use chrono::{DateTime, Utc};
use sqlx::AnyPool;

use super::TenantError;
use crate::db::{from_millis, to_millis};
use crate::ident;
use crate::models::mapping::SchemaMapping;
use crate::models::tenant::{ConnectedDatabase, NewConnection};
use crate::registry::Dialect;
use crate::secrets::{self, CredentialCipher};
use crate::uuid::new_id;

type TenantRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    Option<i64>,
    Option<i64>,
    i64,
    i64,
);

const TENANT_COLUMNS: &str = "id, name, app_name, endpoint, credential_encrypted, table_name, \
                              user_count, last_checked_at, active, created_at";

type MappingRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

/// Register a tenant. Returns the record and the plaintext bearer key,
/// which is not stored and cannot be recovered later.
pub async fn register(
    pool: &AnyPool,
    cipher: Option<&CredentialCipher>,
    input: &NewConnection,
    now: DateTime<Utc>,
) -> Result<(ConnectedDatabase, String), TenantError> {
    if input.name.trim().is_empty() {
        return Err(TenantError::Validation("name is required".into()));
    }
    Dialect::from_endpoint(&input.endpoint)?;
    ident::validate(&input.table_name).map_err(|e| TenantError::Validation(e.to_string()))?;

    let credential_encrypted = match input.credential.as_deref() {
        Some(secret) if !secret.is_empty() => {
            let cipher = cipher.ok_or_else(|| {
                TenantError::Validation(
                    "a credential was supplied but no encryption key is configured".into(),
                )
            })?;
            Some(cipher.seal(secret)?)
        }
        _ => None,
    };

    let api_key = secrets::generate_api_key();
    let tenant = ConnectedDatabase {
        id: new_id(),
        name: input.name.trim().to_string(),
        app_name: input.app_name.trim().to_string(),
        endpoint: input.endpoint.clone(),
        credential_encrypted,
        table_name: input.table_name.clone(),
        user_count: None,
        last_checked_at: None,
        active: true,
        created_at: from_millis(to_millis(now)),
    };

    sqlx::query(
        "INSERT INTO connected_databases \
         (id, name, app_name, endpoint, credential_encrypted, table_name, api_key_hash, \
          active, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $8)",
    )
    .bind(&tenant.id)
    .bind(&tenant.name)
    .bind(&tenant.app_name)
    .bind(&tenant.endpoint)
    .bind(tenant.credential_encrypted.as_deref())
    .bind(&tenant.table_name)
    .bind(secrets::hash_api_key(&api_key))
    .bind(to_millis(tenant.created_at))
    .execute(pool)
    .await?;

    Ok((tenant, api_key))
}

pub async fn get(pool: &AnyPool, id: &str) -> Result<Option<ConnectedDatabase>, TenantError> {
    let row = sqlx::query_as::<_, TenantRow>(&format!(
        "SELECT {TENANT_COLUMNS} FROM connected_databases WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(decode))
}

/// Active tenant owning a bearer key.
pub async fn get_by_api_key(
    pool: &AnyPool,
    api_key: &str,
) -> Result<Option<ConnectedDatabase>, TenantError> {
    let row = sqlx::query_as::<_, TenantRow>(&format!(
        "SELECT {TENANT_COLUMNS} FROM connected_databases \
         WHERE api_key_hash = $1 AND active = 1"
    ))
    .bind(secrets::hash_api_key(api_key))
    .fetch_optional(pool)
    .await?;
    Ok(row.map(decode))
}

pub async fn list(pool: &AnyPool) -> Result<Vec<ConnectedDatabase>, TenantError> {
    let rows = sqlx::query_as::<_, TenantRow>(&format!(
        "SELECT {TENANT_COLUMNS} FROM connected_databases ORDER BY created_at, id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(decode).collect())
}

/// Soft-delete: the tenant keeps its history but its key stops working.
pub async fn deactivate(pool: &AnyPool, id: &str) -> Result<bool, TenantError> {
    let result =
        sqlx::query("UPDATE connected_databases SET active = 0 WHERE id = $1 AND active = 1")
            .bind(id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Replace the bearer key; the old one stops working immediately.
pub async fn rotate_api_key(pool: &AnyPool, id: &str) -> Result<String, TenantError> {
    let api_key = secrets::generate_api_key();
    let result = sqlx::query("UPDATE connected_databases SET api_key_hash = $1 WHERE id = $2")
        .bind(secrets::hash_api_key(&api_key))
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(TenantError::NotFound(id.to_string()));
    }
    Ok(api_key)
}

pub async fn record_stats(
    pool: &AnyPool,
    id: &str,
    user_count: i64,
    now: DateTime<Utc>,
) -> Result<(), TenantError> {
    sqlx::query(
        "UPDATE connected_databases SET user_count = $1, last_checked_at = $2 WHERE id = $3",
    )
    .bind(user_count)
    .bind(to_millis(now))
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn load_mapping(
    pool: &AnyPool,
    database_id: &str,
) -> Result<Option<SchemaMapping>, TenantError> {
    let row = sqlx::query_as::<_, MappingRow>(
        "SELECT id_column, email_column, name_column, username_column, password_column, \
                avatar_column, role_column, status_column, created_at_column, \
                last_login_column, email_verified_column, session_table, session_user_column \
         FROM schema_mappings WHERE database_id = $1",
    )
    .bind(database_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(
        |(
            id_column,
            email_column,
            name_column,
            username_column,
            password_column,
            avatar_column,
            role_column,
            status_column,
            created_at_column,
            last_login_column,
            email_verified_column,
            session_table,
            session_user_column,
        )| SchemaMapping {
            id_column,
            email_column,
            name_column,
            username_column,
            password_column,
            avatar_column,
            role_column,
            status_column,
            created_at_column,
            last_login_column,
            email_verified_column,
            session_table,
            session_user_column,
        },
    ))
}

/// Insert or replace a tenant's mapping. Every name is validated first.
pub async fn save_mapping(
    pool: &AnyPool,
    database_id: &str,
    mapping: &SchemaMapping,
    now: DateTime<Utc>,
) -> Result<(), TenantError> {
    mapping
        .validate()
        .map_err(|e| TenantError::Validation(e.to_string()))?;
    if mapping.session_table.is_some() != mapping.session_user_column.is_some() {
        return Err(TenantError::Validation(
            "sessionTable and sessionUserColumn must be set together".into(),
        ));
    }

    sqlx::query(
        "INSERT INTO schema_mappings \
         (database_id, id_column, email_column, name_column, username_column, \
          password_column, avatar_column, role_column, status_column, created_at_column, \
          last_login_column, email_verified_column, session_table, session_user_column, \
          updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
         ON CONFLICT (database_id) DO UPDATE SET \
          id_column = excluded.id_column, \
          email_column = excluded.email_column, \
          name_column = excluded.name_column, \
          username_column = excluded.username_column, \
          password_column = excluded.password_column, \
          avatar_column = excluded.avatar_column, \
          role_column = excluded.role_column, \
          status_column = excluded.status_column, \
          created_at_column = excluded.created_at_column, \
          last_login_column = excluded.last_login_column, \
          email_verified_column = excluded.email_verified_column, \
          session_table = excluded.session_table, \
          session_user_column = excluded.session_user_column, \
          updated_at = excluded.updated_at",
    )
    .bind(database_id)
    .bind(&mapping.id_column)
    .bind(&mapping.email_column)
    .bind(mapping.name_column.as_deref())
    .bind(mapping.username_column.as_deref())
    .bind(mapping.password_column.as_deref())
    .bind(mapping.avatar_column.as_deref())
    .bind(mapping.role_column.as_deref())
    .bind(mapping.status_column.as_deref())
    .bind(mapping.created_at_column.as_deref())
    .bind(mapping.last_login_column.as_deref())
    .bind(mapping.email_verified_column.as_deref())
    .bind(mapping.session_table.as_deref())
    .bind(mapping.session_user_column.as_deref())
    .bind(to_millis(now))
    .execute(pool)
    .await?;
    Ok(())
}

fn decode(row: TenantRow) -> ConnectedDatabase {
    let (
        id,
        name,
        app_name,
        endpoint,
        credential_encrypted,
        table_name,
        user_count,
        last_checked_at,
        active,
        created_at,
    ) = row;
    ConnectedDatabase {
        id,
        name,
        app_name,
        endpoint,
        credential_encrypted,
        table_name,
        user_count,
        last_checked_at: last_checked_at.map(from_millis),
        active: active != 0,
        created_at: from_millis(created_at),
    }
}
