//! Tenant schema introspection.
//!
//! Raw catalog listings (tables, columns, sizes) plus the heuristic that
//! proposes a [`SchemaMapping`] for a users table by matching column names
//! against ordered candidate lists.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ident;
use crate::models::mapping::{Role, SchemaMapping};
use crate::registry::{Dialect, TenantHandle};
use crate::users::RepoError;

/// Candidate column names per role, highest priority first (lowercase).
const CANDIDATES: &[(Role, &[&str])] = &[
    (Role::Id, &["id", "user_id", "userid", "uid", "uuid"]),
    (Role::Email, &["email", "user_email", "email_address", "emailaddress", "mail"]),
    (
        Role::Name,
        &["name", "full_name", "fullname", "display_name", "displayname"],
    ),
    (Role::Username, &["username", "user_name", "login", "handle"]),
    (
        Role::Password,
        &[
            "password",
            "password_hash",
            "passwordhash",
            "hashed_password",
            "encrypted_password",
            "passwd",
        ],
    ),
    (
        Role::Avatar,
        &["avatar", "avatar_url", "avatarurl", "image", "picture", "photo_url", "profile_image"],
    ),
    (Role::Role, &["role", "user_role", "roles"]),
    (Role::Status, &["status", "state", "account_status"]),
    (
        Role::CreatedAt,
        &["created_at", "createdat", "date_joined", "inserted_at", "registered_at", "created"],
    ),
    (
        Role::LastLogin,
        &["last_login", "last_login_at", "lastlogin", "last_sign_in_at", "last_seen_at"],
    ),
    (
        Role::EmailVerified,
        &[
            "email_verified",
            "email_verified_at",
            "emailverified",
            "email_confirmed_at",
            "is_verified",
            "verified",
        ],
    ),
];

const SESSION_TABLES: &[&str] = &["sessions", "user_sessions", "session", "auth_sessions"];

const SESSION_USER_COLUMNS: &[&str] = &["user_id", "userid", "uid", "account_id"];

/// One column of a tenant table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableColumn {
    pub name: String,
    /// Type as reported by the catalog (`data_type` / declared type).
    pub data_type: String,
    /// PostgreSQL catalog type name (e.g. `int4`, `timestamptz`).
    pub udt_name: Option<String>,
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    pub name: String,
    /// `None` when the name cannot be used as an identifier.
    pub row_count: Option<i64>,
    pub size_bytes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseOverview {
    pub tables: Vec<TableSummary>,
    pub total_size_bytes: Option<i64>,
}

/// List base tables in the tenant database.
pub async fn get_tables(handle: &TenantHandle) -> Result<Vec<String>, RepoError> {
    let sql = match handle.dialect {
        Dialect::Postgres => {
            "SELECT CAST(table_name AS TEXT) FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
             ORDER BY 1"
        }
        Dialect::Sqlite => {
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name"
        }
    };
    let tables = sqlx::query_scalar::<_, String>(sql)
        .fetch_all(&handle.pool)
        .await?;
    Ok(tables)
}

/// List a table's columns in ordinal order. Empty when the table is missing.
pub async fn get_table_columns(
    handle: &TenantHandle,
    table: &str,
) -> Result<Vec<TableColumn>, RepoError> {
    let table = ident::validate(table)?;

    let columns = match handle.dialect {
        Dialect::Postgres => sqlx::query_as::<_, (String, String, String, String)>(
            "SELECT CAST(column_name AS TEXT), CAST(data_type AS TEXT), \
                    CAST(udt_name AS TEXT), CAST(is_nullable AS TEXT) \
             FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&handle.pool)
        .await?
        .into_iter()
        .map(|(name, data_type, udt_name, is_nullable)| TableColumn {
            name,
            data_type,
            udt_name: Some(udt_name),
            nullable: is_nullable == "YES",
        })
        .collect(),
        Dialect::Sqlite => sqlx::query_as::<_, (String, String, i64)>(
            "SELECT name, type, \"notnull\" FROM pragma_table_info($1) ORDER BY cid",
        )
        .bind(table)
        .fetch_all(&handle.pool)
        .await?
        .into_iter()
        .map(|(name, data_type, not_null)| TableColumn {
            name,
            data_type,
            udt_name: None,
            nullable: not_null == 0,
        })
        .collect(),
    };
    Ok(columns)
}

/// Per-table row counts and storage estimates.
pub async fn get_database_overview(handle: &TenantHandle) -> Result<DatabaseOverview, RepoError> {
    let mut tables = Vec::new();

    for name in get_tables(handle).await? {
        let Ok(quoted) = ident::quote(&name) else {
            warn!(table = %name, "skipping row count for table with unsafe name");
            tables.push(TableSummary {
                name,
                row_count: None,
                size_bytes: None,
            });
            continue;
        };

        let row_count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {quoted}"))
            .fetch_one(&handle.pool)
            .await?;

        let size_bytes = match handle.dialect {
            Dialect::Postgres => {
                sqlx::query_scalar::<_, Option<i64>>(
                    "SELECT pg_total_relation_size(to_regclass($1))",
                )
                .bind(&quoted)
                .fetch_one(&handle.pool)
                .await?
            }
            Dialect::Sqlite => None,
        };

        tables.push(TableSummary {
            name,
            row_count: Some(row_count),
            size_bytes,
        });
    }

    let total_size_bytes = match handle.dialect {
        Dialect::Postgres => {
            sqlx::query_scalar::<_, i64>("SELECT pg_database_size(current_database())")
                .fetch_optional(&handle.pool)
                .await?
        }
        Dialect::Sqlite => {
            sqlx::query_scalar::<_, i64>(
                "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
            )
            .fetch_optional(&handle.pool)
            .await?
        }
    };

    Ok(DatabaseOverview {
        tables,
        total_size_bytes,
    })
}

/// Propose a mapping for `table` from its column names.
///
/// Best effort: operators may override the result.
pub async fn detect(handle: &TenantHandle, table: &str) -> Result<SchemaMapping, RepoError> {
    let columns = get_table_columns(handle, table).await?;
    if columns.is_empty() {
        return Err(RepoError::TableNotFound(table.to_string()));
    }
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let mut mapping = propose_mapping(&names);

    let tables = get_tables(handle).await?;
    let others: Vec<&str> = tables
        .iter()
        .map(String::as_str)
        .filter(|t| !t.eq_ignore_ascii_case(table))
        .collect();
    if let Some(session_table) = pick(&others, SESSION_TABLES) {
        let session_columns = get_table_columns(handle, session_table).await?;
        let session_names: Vec<&str> = session_columns.iter().map(|c| c.name.as_str()).collect();
        if let Some(user_column) = pick(&session_names, SESSION_USER_COLUMNS) {
            mapping.session_table = Some(session_table.to_string());
            mapping.session_user_column = Some(user_column.to_string());
        }
    }

    debug!(
        table,
        mapped = mapping.mapped().count(),
        sessions = mapping.session_table.is_some(),
        "proposed schema mapping"
    );
    Ok(mapping)
}

/// Match column names against every role's candidates.
///
/// `id` and `email` fall back to the literal names when nothing matches.
pub fn propose_mapping(columns: &[&str]) -> SchemaMapping {
    let mut mapping = SchemaMapping::new("id", "email");
    for (role, candidates) in CANDIDATES {
        if let Some(column) = pick(columns, candidates) {
            mapping.set_column(*role, Some(column.to_string()));
        }
    }
    mapping
}

/// First candidate (in priority order) present among `names`, compared
/// case-insensitively; returns the name as the catalog spells it.
fn pick<'a>(names: &[&'a str], candidates: &[&str]) -> Option<&'a str> {
    candidates.iter().find_map(|candidate| {
        names
            .iter()
            .find(|name| name.to_ascii_lowercase() == *candidate)
            .copied()
    })
}
