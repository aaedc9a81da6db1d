//! # bazaar_core
//!
//! Core domain logic for Bazaar: the credential store, the secret cache,
//! token issuance and the chat persistence layer shared by `bazaar_api`.

pub mod auth;
pub mod cache;
pub mod chat;
pub mod ids;
pub mod migrate;
pub mod models;
pub mod shops;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
