//! Authentication and authorization logic.
//!
//! Password hashing, JWT signing, refresh-token bookkeeping in the secret
//! cache, and the pure decisions behind the route guards.

pub mod guards;
pub mod jwt;
pub mod password;
pub mod queries;
pub mod tokens;

use thiserror::Error;

use crate::cache::CacheError;
use crate::store::StoreError;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    CredentialError,

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Internal error: {0}")]
    Internal(String),
}
