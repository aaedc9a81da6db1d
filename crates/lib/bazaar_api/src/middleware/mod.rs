//! Request middleware: authentication first, then per-route gates.

pub mod auth;
pub mod guards;
