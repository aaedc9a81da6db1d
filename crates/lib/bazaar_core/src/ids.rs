//! Identifier helpers.
//!
//! Conversations and messages use app-side UUIDv7 so that primary keys sort
//! by creation time. Users keep Postgres' `gen_random_uuid()` (v4).
//! Token ids are random v4 UUIDs; one-time secrets are 64 alphanumeric chars.

use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// Generate a unique token id (`jti`).
pub fn new_jti() -> String {
    Uuid::new_v4().to_string()
}

/// Generate an unguessable one-time token (password reset, email verification).
pub fn new_one_time_token() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}
