//! Business flows shared by handlers.

pub mod identity;
pub mod tenant;
