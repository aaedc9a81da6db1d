//! Domain models shared by the store, cache and API layers.

pub mod auth;
pub mod chat;

use thiserror::Error;

/// Raised when a stored enum column holds an unknown value.
#[derive(Debug, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
