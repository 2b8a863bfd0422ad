//! SQL identifier gatekeeping.
//!
//! Table and column names cannot be bound as query parameters, so every
//! identifier that ends up in generated SQL text goes through [`validate`]
//! (usually via [`quote`]) immediately before it is spliced. Values are never
//! passed through here; they are always bound.

use thiserror::Error;

/// Rejected identifier, carrying the offending text verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid identifier: {0:?}")]
pub struct InvalidIdentifier(pub String);

/// Accept `^[A-Za-z_][A-Za-z0-9_]*$`, returning the input unchanged.
pub fn validate(identifier: &str) -> Result<&str, InvalidIdentifier> {
    let mut chars = identifier.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(identifier)
    } else {
        Err(InvalidIdentifier(identifier.to_string()))
    }
}

/// Validate and wrap in double quotes, preserving the identifier's case.
///
/// Both PostgreSQL and SQLite accept `"name"`; validated identifiers never
/// contain a quote, so no escaping is needed.
pub fn quote(identifier: &str) -> Result<String, InvalidIdentifier> {
    validate(identifier).map(|id| format!("\"{id}\""))
}
