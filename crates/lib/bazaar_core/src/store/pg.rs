//! Postgres-backed stores. Thin adapters over the query modules.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{ChatStore, CredentialStore, StaffDirectory, StoreError};
use crate::auth::queries as auth_queries;
use crate::chat::queries as chat_queries;
use crate::models::auth::{NewUser, Role, UserWithPassword};
use crate::models::chat::{Conversation, Message, MessageRole, NewMessage, ShopStaff};
use crate::shops;

/// All persistence traits over one connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserWithPassword>, StoreError> {
        auth_queries::find_user_by_email(&self.pool, email).await
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<UserWithPassword>, StoreError> {
        auth_queries::find_user_by_id(&self.pool, user_id).await
    }

    async fn create_user(&self, new_user: NewUser<'_>) -> Result<UserWithPassword, StoreError> {
        auth_queries::create_user(&self.pool, new_user).await
    }

    async fn user_roles(&self, user_id: Uuid) -> Result<Vec<Role>, StoreError> {
        auth_queries::get_user_roles(&self.pool, user_id).await
    }

    async fn grant_role(&self, user_id: Uuid, role: Role) -> Result<(), StoreError> {
        auth_queries::grant_role(&self.pool, user_id, role).await
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        auth_queries::update_password(&self.pool, user_id, password_hash).await
    }

    async fn mark_verified(&self, user_id: Uuid) -> Result<(), StoreError> {
        auth_queries::mark_verified(&self.pool, user_id).await
    }
}

#[async_trait]
impl StaffDirectory for PgStore {
    async fn find_membership(
        &self,
        shop_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ShopStaff>, StoreError> {
        shops::find_membership(&self.pool, shop_id, user_id).await
    }

    async fn add_staff(&self, staff: ShopStaff) -> Result<(), StoreError> {
        shops::add_staff(&self.pool, &staff).await
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn find_open_conversation(
        &self,
        buyer_user_id: Uuid,
        shop_id: Uuid,
    ) -> Result<Option<Conversation>, StoreError> {
        chat_queries::find_open_conversation(&self.pool, buyer_user_id, shop_id).await
    }

    async fn create_conversation(
        &self,
        buyer_user_id: Uuid,
        shop_id: Uuid,
    ) -> Result<Conversation, StoreError> {
        chat_queries::create_conversation(&self.pool, buyer_user_id, shop_id).await
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        chat_queries::get_conversation(&self.pool, id).await
    }

    async fn list_buyer_conversations(
        &self,
        buyer_user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>, StoreError> {
        chat_queries::list_buyer_conversations(&self.pool, buyer_user_id, limit, offset).await
    }

    async fn list_shop_conversations(
        &self,
        shop_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>, StoreError> {
        chat_queries::list_shop_conversations(&self.pool, shop_id, limit, offset).await
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        chat_queries::insert_message(&self.pool, message).await
    }

    async fn get_message(&self, id: Uuid) -> Result<Option<Message>, StoreError> {
        chat_queries::get_message(&self.pool, id).await
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, StoreError> {
        chat_queries::list_messages(&self.pool, conversation_id, limit, offset).await
    }

    async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Message>, StoreError> {
        chat_queries::recent_messages(&self.pool, conversation_id, limit).await
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        sender_role: MessageRole,
        up_to: Option<DateTime<Utc>>,
        read_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        chat_queries::mark_read(&self.pool, conversation_id, sender_role, up_to, read_at).await
    }
}
