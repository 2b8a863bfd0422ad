//! Password hashing for tenant users.
//!
//! New passwords set through a reset flow are hashed here before being
//! written into the tenant's mapped password column.

use thiserror::Error;

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

#[derive(Debug, Error)]
#[error("Password hashing failed: {0}")]
pub struct HashError(String);

/// Hash a password with bcrypt (cost 10).
pub fn hash_password(password: &str) -> Result<String, HashError> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| HashError(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, HashError> {
    bcrypt::verify(password, hash).map_err(|e| HashError(format!("bcrypt verify: {e}")))
}
