//! Statement builders for the user repository.
//!
//! Identifiers are quoted through [`ident::quote`]; every value becomes a
//! numbered placeholder bound later, so builders never see user text inside
//! the SQL string.

use std::collections::HashMap;

use sqlx::any::{Any, AnyArguments};
use sqlx::query::Query;

use super::{RepoError, SortDir, UserQuery};
use crate::ident;
use crate::models::mapping::{Role, SchemaMapping};
use crate::registry::Dialect;

/// A value waiting to be bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Text(Option<String>),
    Int(i64),
}

/// SQL text plus its parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
}

impl Statement {
    /// Attach the parameters to a query over `self.sql`.
    pub fn query(&self) -> Query<'_, Any, AnyArguments<'_>> {
        let mut query = sqlx::query(&self.sql);
        for param in &self.params {
            query = match param {
                Param::Text(value) => query.bind(value.clone()),
                Param::Int(value) => query.bind(*value),
            };
        }
        query
    }
}

/// Accumulates parameters and hands out placeholders.
///
/// On PostgreSQL a value headed for a known column is cast to that column's
/// catalog type, since text parameters do not coerce implicitly there.
pub struct Binder<'a> {
    dialect: Dialect,
    column_types: &'a HashMap<String, String>,
    params: Vec<Param>,
}

impl<'a> Binder<'a> {
    pub fn new(dialect: Dialect, column_types: &'a HashMap<String, String>) -> Self {
        Self {
            dialect,
            column_types,
            params: Vec::new(),
        }
    }

    /// Bind a value compared against or written into `column`.
    pub fn for_column(&mut self, column: &str, value: Option<String>) -> String {
        self.params.push(Param::Text(value));
        let placeholder = format!("${}", self.params.len());
        match self.dialect {
            Dialect::Postgres => match self.column_types.get(column).map(|t| ident::quote(t)) {
                Some(Ok(udt)) => format!("CAST({placeholder} AS {udt})"),
                _ => placeholder,
            },
            Dialect::Sqlite => placeholder,
        }
    }

    pub fn text(&mut self, value: String) -> String {
        self.params.push(Param::Text(Some(value)));
        format!("${}", self.params.len())
    }

    pub fn int(&mut self, value: i64) -> String {
        self.params.push(Param::Int(value));
        format!("${}", self.params.len())
    }

    pub fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            params: self.params,
        }
    }
}

/// `CAST("col" AS TEXT) AS "role", ...` over every mapped role except the
/// password, which never leaves the tenant database.
pub fn projection(mapping: &SchemaMapping) -> Result<String, RepoError> {
    let mut parts = Vec::new();
    for (role, column) in mapping.mapped() {
        if role == Role::Password {
            continue;
        }
        parts.push(format!(
            "CAST({} AS TEXT) AS \"{}\"",
            ident::quote(column)?,
            role.as_str()
        ));
    }
    Ok(parts.join(", "))
}

/// Page query and its matching `COUNT(*)`, sharing one predicate.
pub fn select_page(
    dialect: Dialect,
    column_types: &HashMap<String, String>,
    table: &str,
    mapping: &SchemaMapping,
    query: &UserQuery,
) -> Result<(Statement, Statement), RepoError> {
    let table = ident::quote(table)?;
    let projection = projection(mapping)?;

    let id = ident::quote(&mapping.id_column)?;
    let sort = match query.sort_by.as_deref() {
        Some(key) => match Role::parse(key).and_then(|role| mapping.column(role)) {
            Some(column) => ident::quote(column)?,
            None => ident::quote(key)?,
        },
        None => match &mapping.created_at_column {
            Some(column) => ident::quote(column)?,
            None => id.clone(),
        },
    };
    let dir = match query.sort_dir {
        SortDir::Asc => "ASC",
        SortDir::Desc => "DESC",
    };
    let order = if sort == id {
        format!("{sort} {dir}")
    } else {
        format!("{sort} {dir}, {id} {dir}")
    };

    let mut page = Binder::new(dialect, column_types);
    let mut count = Binder::new(dialect, column_types);
    let filter = match search_term(query) {
        Some(term) => {
            let page_filter = search_predicate(mapping, &term, &mut page)?;
            search_predicate(mapping, &term, &mut count)?;
            format!(" WHERE {page_filter}")
        }
        None => String::new(),
    };

    let limit = page.int(query.limit);
    let offset = page.int(query.offset);
    let page_sql = format!(
        "SELECT {projection} FROM {table}{filter} ORDER BY {order} LIMIT {limit} OFFSET {offset}"
    );
    let count_sql = format!("SELECT COUNT(*) FROM {table}{filter}");

    Ok((page.finish(page_sql), count.finish(count_sql)))
}

fn search_term(query: &UserQuery) -> Option<String> {
    let term = query.search.as_deref()?.trim();
    if term.is_empty() {
        return None;
    }
    Some(format!("%{}%", term.to_lowercase()))
}

/// `LOWER(CAST(col AS TEXT)) LIKE $n OR ...` across searchable roles.
fn search_predicate(
    mapping: &SchemaMapping,
    term: &str,
    binder: &mut Binder<'_>,
) -> Result<String, RepoError> {
    let mut clauses = Vec::new();
    for role in Role::SEARCHABLE {
        if let Some(column) = mapping.column(role) {
            let column = ident::quote(column)?;
            let placeholder = binder.text(term.to_string());
            clauses.push(format!("LOWER(CAST({column} AS TEXT)) LIKE {placeholder}"));
        }
    }
    Ok(format!("({})", clauses.join(" OR ")))
}

pub fn select_by_id(
    dialect: Dialect,
    column_types: &HashMap<String, String>,
    table: &str,
    mapping: &SchemaMapping,
    id: &str,
) -> Result<Statement, RepoError> {
    let table = ident::quote(table)?;
    let projection = projection(mapping)?;
    let id_column = ident::quote(&mapping.id_column)?;
    let mut binder = Binder::new(dialect, column_types);
    let id = binder.for_column(&mapping.id_column, Some(id.to_string()));
    Ok(binder.finish(format!(
        "SELECT {projection} FROM {table} WHERE {id_column} = {id} LIMIT 1"
    )))
}

pub fn update_field(
    dialect: Dialect,
    column_types: &HashMap<String, String>,
    table: &str,
    id_column: &str,
    id: &str,
    column: &str,
    value: Option<String>,
) -> Result<Statement, RepoError> {
    let table = ident::quote(table)?;
    let target = ident::quote(column)?;
    let id_quoted = ident::quote(id_column)?;
    let mut binder = Binder::new(dialect, column_types);
    let value = binder.for_column(column, value);
    let id = binder.for_column(id_column, Some(id.to_string()));
    Ok(binder.finish(format!(
        "UPDATE {table} SET {target} = {value} WHERE {id_quoted} = {id}"
    )))
}

/// `INSERT ... RETURNING CAST(id AS TEXT)`; `fields` must be non-empty.
pub fn insert(
    dialect: Dialect,
    column_types: &HashMap<String, String>,
    table: &str,
    id_column: &str,
    fields: &[(&str, &str)],
) -> Result<Statement, RepoError> {
    let table = ident::quote(table)?;
    let id = ident::quote(id_column)?;
    let mut binder = Binder::new(dialect, column_types);
    let mut columns = Vec::with_capacity(fields.len());
    let mut values = Vec::with_capacity(fields.len());
    for (column, value) in fields {
        columns.push(ident::quote(column)?);
        values.push(binder.for_column(column, Some(value.to_string())));
    }
    Ok(binder.finish(format!(
        "INSERT INTO {table} ({}) VALUES ({}) RETURNING CAST({id} AS TEXT)",
        columns.join(", "),
        values.join(", ")
    )))
}

pub fn delete_by(
    dialect: Dialect,
    column_types: &HashMap<String, String>,
    table: &str,
    column: &str,
    value: &str,
) -> Result<Statement, RepoError> {
    let table = ident::quote(table)?;
    let quoted = ident::quote(column)?;
    let mut binder = Binder::new(dialect, column_types);
    let value = binder.for_column(column, Some(value.to_string()));
    Ok(binder.finish(format!("DELETE FROM {table} WHERE {quoted} = {value}")))
}

/// Every listed column of a session table, cast to text and aliased to
/// its own name.
pub fn select_sessions(
    dialect: Dialect,
    column_types: &HashMap<String, String>,
    table: &str,
    user_column: &str,
    columns: &[String],
    user_id: &str,
) -> Result<Statement, RepoError> {
    let table = ident::quote(table)?;
    let user_quoted = ident::quote(user_column)?;
    let mut projected = Vec::with_capacity(columns.len());
    for column in columns {
        let quoted = ident::quote(column)?;
        projected.push(format!("CAST({quoted} AS TEXT) AS {quoted}"));
    }
    let mut binder = Binder::new(dialect, column_types);
    let user = binder.for_column(user_column, Some(user_id.to_string()));
    Ok(binder.finish(format!(
        "SELECT {} FROM {table} WHERE {user_quoted} = {user}",
        projected.join(", ")
    )))
}

pub fn count_all(table: &str) -> Result<String, RepoError> {
    Ok(format!("SELECT COUNT(*) FROM {}", ident::quote(table)?))
}
