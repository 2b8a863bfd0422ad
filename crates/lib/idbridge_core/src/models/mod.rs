//! Domain models.
//!
//! Control-plane rows are converted into these at the query boundary
//! (timestamps from Unix milliseconds, flags from 0/1).

pub mod audit;
pub mod ban;
pub mod mapping;
pub mod tenant;
pub mod token;
pub mod user;
