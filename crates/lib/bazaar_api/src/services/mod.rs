//! Application services behind the handlers.

pub mod auth;
pub mod chat;
pub mod cookies;
