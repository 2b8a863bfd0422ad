//! # idbridge_core
//!
//! Schema-agnostic identity bridge: introspects arbitrary tenant user
//! tables, runs validated dynamic SQL against them, and manages single-use
//! tokens and bans in the control-plane store.

pub mod audit;
pub mod bans;
pub mod db;
pub mod ident;
pub mod introspect;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod password;
pub mod registry;
pub mod secrets;
pub mod tenants;
pub mod tokens;
pub mod users;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
