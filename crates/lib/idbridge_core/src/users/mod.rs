//! Generic user repository.
//!
//! CRUD against a tenant's users table whose shape is known only through a
//! [`SchemaMapping`]. Table and column names go through the identifier
//! validator right before they are spliced into SQL; values are always bound.

pub mod sql;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::any::AnyRow;
use thiserror::Error;
use tracing::debug;

use crate::ident::{self, InvalidIdentifier};
use crate::introspect;
use crate::models::mapping::{Role, SchemaMapping};
use crate::models::user::{ExternalUser, SessionRow, UserPage};
use crate::registry::{Dialect, TenantHandle};

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: i64 = 500;

/// Page size when the caller does not choose one.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Tenant-database errors.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdentifier),

    #[error("No password column is mapped for this table")]
    NoPasswordColumnMapped,

    #[error("No fields provided")]
    NoFieldsProvided,

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Tenant database unreachable: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Tenant query failed: {0}")]
    Query(#[source] sqlx::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => RepoError::Connection(e),
            other => RepoError::Query(other),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

/// Search, pagination and ordering for [`UserRepository::query`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserQuery {
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
    /// Role name (`createdAt`) or raw column name.
    pub sort_by: Option<String>,
    pub sort_dir: SortDir,
}

impl Default for UserQuery {
    fn default() -> Self {
        Self {
            search: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
            sort_by: None,
            sort_dir: SortDir::Desc,
        }
    }
}

impl UserQuery {
    fn clamped(&self) -> Self {
        Self {
            limit: self.limit.clamp(1, MAX_PAGE_SIZE),
            offset: self.offset.max(0),
            ..self.clone()
        }
    }
}

/// Repository over one tenant users table.
#[derive(Debug, Clone)]
pub struct UserRepository {
    handle: TenantHandle,
    table: String,
    mapping: SchemaMapping,
}

impl UserRepository {
    pub fn new(handle: TenantHandle, table: impl Into<String>, mapping: SchemaMapping) -> Self {
        Self {
            handle,
            table: table.into(),
            mapping,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn mapping(&self) -> &SchemaMapping {
        &self.mapping
    }

    pub fn handle(&self) -> &TenantHandle {
        &self.handle
    }

    /// Page of users plus the true total for the same filter.
    pub async fn query(&self, query: &UserQuery) -> Result<UserPage, RepoError> {
        let query = query.clamped();
        let types = self.column_types(&self.table).await?;
        let (page, count) =
            sql::select_page(self.handle.dialect, &types, &self.table, &self.mapping, &query)?;
        debug!(table = %self.table, sql = %page.sql, "user page query");

        let rows = page.query().fetch_all(&self.handle.pool).await?;
        let users = rows
            .iter()
            .map(|row| self.decode_user(row))
            .collect::<Result<Vec<_>, _>>()?;

        let total: i64 = count.query().fetch_one(&self.handle.pool).await?.try_get(0)?;
        Ok(UserPage { users, total })
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<ExternalUser>, RepoError> {
        let types = self.column_types(&self.table).await?;
        let stmt = sql::select_by_id(self.handle.dialect, &types, &self.table, &self.mapping, id)?;
        let row = stmt.query().fetch_optional(&self.handle.pool).await?;
        row.map(|row| self.decode_user(&row)).transpose()
    }

    /// Write one column; returns the number of rows touched.
    pub async fn update_field(
        &self,
        id: &str,
        column: &str,
        value: Option<String>,
    ) -> Result<u64, RepoError> {
        ident::validate(column)?;
        let types = self.column_types(&self.table).await?;
        let stmt = sql::update_field(
            self.handle.dialect,
            &types,
            &self.table,
            &self.mapping.id_column,
            id,
            column,
            value,
        )?;
        debug!(table = %self.table, sql = %stmt.sql, "user update");
        let result = stmt.query().execute(&self.handle.pool).await?;
        Ok(result.rows_affected())
    }

    /// Store an already-hashed password in the mapped password column.
    pub async fn update_password(&self, id: &str, hash: &str) -> Result<u64, RepoError> {
        let column = self
            .mapping
            .password_column
            .as_deref()
            .ok_or(RepoError::NoPasswordColumnMapped)?;
        self.update_field(id, column, Some(hash.to_string())).await
    }

    /// Record that the user's email was verified, if a column is mapped.
    ///
    /// The marker matches the column type: a timestamp for date/time columns
    /// and for untyped columns named `*_at`, `1` for integer (and SQLite
    /// boolean) columns, `true` otherwise.
    pub async fn mark_email_verified(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>, RepoError> {
        let Some(column) = self.mapping.email_verified_column.clone() else {
            return Ok(None);
        };
        let columns = introspect::get_table_columns(&self.handle, &self.table).await?;
        let data_type = columns
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.data_type.to_ascii_lowercase())
            .unwrap_or_default();
        let marker = verified_marker(self.handle.dialect, &column, &data_type, now);
        self.update_field(id, &column, Some(marker)).await.map(Some)
    }

    /// Insert a user from column/value pairs; empty values are dropped.
    /// Returns the new row's id.
    pub async fn create(
        &self,
        fields: &BTreeMap<String, Option<String>>,
    ) -> Result<String, RepoError> {
        for column in fields.keys() {
            ident::validate(column)?;
        }
        let present: Vec<(&str, &str)> = fields
            .iter()
            .filter_map(|(column, value)| match value.as_deref() {
                Some(v) if !v.is_empty() => Some((column.as_str(), v)),
                _ => None,
            })
            .collect();
        if present.is_empty() {
            return Err(RepoError::NoFieldsProvided);
        }

        let types = self.column_types(&self.table).await?;
        let stmt = sql::insert(
            self.handle.dialect,
            &types,
            &self.table,
            &self.mapping.id_column,
            &present,
        )?;
        debug!(table = %self.table, sql = %stmt.sql, "user insert");
        let row = stmt.query().fetch_one(&self.handle.pool).await?;
        let id: Option<String> = row.try_get(0)?;
        Ok(id.unwrap_or_default())
    }

    pub async fn delete(&self, id: &str) -> Result<u64, RepoError> {
        let types = self.column_types(&self.table).await?;
        let stmt = sql::delete_by(
            self.handle.dialect,
            &types,
            &self.table,
            &self.mapping.id_column,
            id,
        )?;
        let result = stmt.query().execute(&self.handle.pool).await?;
        Ok(result.rows_affected())
    }

    /// Sessions belonging to a user; empty when no session table is mapped.
    pub async fn list_sessions(&self, id: &str) -> Result<Vec<SessionRow>, RepoError> {
        let Some((table, user_column)) = self.session_target() else {
            return Ok(Vec::new());
        };
        let columns: Vec<String> = introspect::get_table_columns(&self.handle, table)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        if columns.is_empty() {
            return Err(RepoError::TableNotFound(table.to_string()));
        }
        let types = self.column_types(table).await?;
        let stmt =
            sql::select_sessions(self.handle.dialect, &types, table, user_column, &columns, id)?;
        let rows = stmt.query().fetch_all(&self.handle.pool).await?;
        rows.iter()
            .map(|row| -> Result<SessionRow, RepoError> {
                let mut session = SessionRow::new();
                for column in &columns {
                    session.insert(column.clone(), row.try_get(column.as_str())?);
                }
                Ok(session)
            })
            .collect()
    }

    /// Force logout: remove every session row for the user.
    pub async fn delete_sessions(&self, id: &str) -> Result<u64, RepoError> {
        let Some((table, user_column)) = self.session_target() else {
            return Ok(0);
        };
        let types = self.column_types(table).await?;
        let stmt = sql::delete_by(self.handle.dialect, &types, table, user_column, id)?;
        let result = stmt.query().execute(&self.handle.pool).await?;
        Ok(result.rows_affected())
    }

    /// Total rows in the users table.
    pub async fn count(&self) -> Result<i64, RepoError> {
        let count: i64 = sqlx::query_scalar(&sql::count_all(&self.table)?)
            .fetch_one(&self.handle.pool)
            .await?;
        Ok(count)
    }

    fn session_target(&self) -> Option<(&str, &str)> {
        match (&self.mapping.session_table, &self.mapping.session_user_column) {
            (Some(table), Some(column)) => Some((table.as_str(), column.as_str())),
            _ => None,
        }
    }

    /// Column name to catalog type, needed only for PostgreSQL casts.
    async fn column_types(&self, table: &str) -> Result<HashMap<String, String>, RepoError> {
        match self.handle.dialect {
            Dialect::Sqlite => {
                ident::validate(table)?;
                Ok(HashMap::new())
            }
            Dialect::Postgres => Ok(introspect::get_table_columns(&self.handle, table)
                .await?
                .into_iter()
                .filter_map(|c| c.udt_name.map(|udt| (c.name, udt)))
                .collect()),
        }
    }

    fn decode_user(&self, row: &AnyRow) -> Result<ExternalUser, RepoError> {
        let mut user = ExternalUser::default();
        for (role, _) in self.mapping.mapped() {
            if role == Role::Password {
                continue;
            }
            user.insert(role, row.try_get(role.as_str())?);
        }
        Ok(user)
    }
}

fn verified_marker(
    dialect: Dialect,
    column: &str,
    data_type: &str,
    now: DateTime<Utc>,
) -> String {
    let timestamp = now.format("%Y-%m-%d %H:%M:%S%:z").to_string();
    if data_type.contains("time") || data_type.contains("date") {
        timestamp
    } else if data_type.contains("int") || (dialect == Dialect::Sqlite && data_type.contains("bool"))
    {
        "1".to_string()
    } else if column.to_ascii_lowercase().ends_with("_at") {
        // SQLite declares timestamps as TEXT; the name is the only hint.
        timestamp
    } else {
        "true".to_string()
    }
}
