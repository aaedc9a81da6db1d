//! Chat relay domain: persistence queries and the pub/sub event envelope.

pub mod events;
pub mod queries;
