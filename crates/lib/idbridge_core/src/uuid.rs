//! Time-ordered identifiers for control-plane rows.
//!
//! Tenants, bans and audit events are keyed by UUIDv7 so that ids sort by
//! creation time on every backend without a sequence.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// UUIDv7 rendered as a hyphenated string, the form stored in TEXT keys.
pub fn new_id() -> String {
    uuidv7().to_string()
}
