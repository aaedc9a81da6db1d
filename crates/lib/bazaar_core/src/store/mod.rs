//! Persistence seams.
//!
//! Services depend on these traits rather than on a concrete pool so the
//! same flows run against Postgres (`PgStore`) or in-process (`MemoryStore`).

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::UnknownVariant;
use crate::models::auth::{NewUser, Role, UserWithPassword};
use crate::models::chat::{Conversation, Message, MessageRole, NewMessage, ShopStaff};

pub use memory::MemoryStore;
pub use pg::PgStore;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt row: {0}")]
    Corrupt(#[from] UnknownVariant),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                StoreError::NotFound(db.message().to_string())
            }
            _ => StoreError::Db(e),
        }
    }
}

/// User records and role assignments.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str)
    -> Result<Option<UserWithPassword>, StoreError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<UserWithPassword>, StoreError>;

    /// Create a user and assign the CUSTOMER role.
    async fn create_user(&self, new_user: NewUser<'_>) -> Result<UserWithPassword, StoreError>;

    async fn user_roles(&self, user_id: Uuid) -> Result<Vec<Role>, StoreError>;

    async fn grant_role(&self, user_id: Uuid, role: Role) -> Result<(), StoreError>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), StoreError>;

    async fn mark_verified(&self, user_id: Uuid) -> Result<(), StoreError>;
}

/// Shop staff lookups.
#[async_trait]
pub trait StaffDirectory: Send + Sync {
    async fn find_membership(
        &self,
        shop_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ShopStaff>, StoreError>;

    /// Insert or replace a membership.
    async fn add_staff(&self, staff: ShopStaff) -> Result<(), StoreError>;
}

/// Conversation and message persistence.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn find_open_conversation(
        &self,
        buyer_user_id: Uuid,
        shop_id: Uuid,
    ) -> Result<Option<Conversation>, StoreError>;

    /// Create an OPEN conversation, or return the one that already exists
    /// for the pair.
    async fn create_conversation(
        &self,
        buyer_user_id: Uuid,
        shop_id: Uuid,
    ) -> Result<Conversation, StoreError>;

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError>;

    async fn list_buyer_conversations(
        &self,
        buyer_user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>, StoreError>;

    async fn list_shop_conversations(
        &self,
        shop_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>, StoreError>;

    /// Persist a message and bump the conversation's `updated_at`.
    async fn insert_message(&self, message: NewMessage) -> Result<Message, StoreError>;

    async fn get_message(&self, id: Uuid) -> Result<Option<Message>, StoreError>;

    /// Messages oldest first.
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, StoreError>;

    /// The newest `limit` messages, returned oldest first.
    async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Message>, StoreError>;

    /// Set `read_at` on unread messages sent by `sender_role`, optionally only
    /// those created at or before `up_to`. Returns the number updated.
    async fn mark_read(
        &self,
        conversation_id: Uuid,
        sender_role: MessageRole,
        up_to: Option<DateTime<Utc>>,
        read_at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}
