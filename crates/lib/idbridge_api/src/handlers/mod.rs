//! Request handlers.

pub mod bans;
pub mod connection;
pub mod health;
pub mod schema;
pub mod tokens;
pub mod users;
