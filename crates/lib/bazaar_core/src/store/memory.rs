//! In-process store for tests and single-instance development runs.
//!
//! Mirrors the Postgres semantics the services rely on: unique emails,
//! CUSTOMER on creation, one open conversation per pair, and message
//! ordering by `(created_at, id)`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ChatStore, CredentialStore, StaffDirectory, StoreError};
use crate::ids::uuidv7;
use crate::models::auth::{NewUser, Role, User, UserStatus, UserWithPassword};
use crate::models::chat::{
    Conversation, ConversationStatus, Message, MessageRole, NewMessage, ShopStaff,
};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, UserWithPassword>,
    emails: HashMap<String, Uuid>,
    roles: HashMap<Uuid, Vec<Role>>,
    staff: HashMap<(Uuid, Uuid), ShopStaff>,
    conversations: HashMap<Uuid, Conversation>,
    messages: Vec<Message>,
}

/// Implements every store trait over a single lock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page<T: Clone>(items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserWithPassword>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .emails
            .get(email)
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<UserWithPassword>, StoreError> {
        Ok(self.inner.read().await.users.get(&user_id).cloned())
    }

    async fn create_user(&self, new_user: NewUser<'_>) -> Result<UserWithPassword, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.emails.contains_key(new_user.email) {
            return Err(StoreError::Conflict(format!(
                "email {} already exists",
                new_user.email
            )));
        }
        let record = UserWithPassword {
            user: User {
                id: Uuid::new_v4(),
                email: new_user.email.to_string(),
                name: new_user.name.map(str::to_string),
                status: new_user.status,
                created_at: Utc::now(),
            },
            password_hash: new_user.password_hash.map(str::to_string),
        };
        let id = record.user.id;
        inner.emails.insert(record.user.email.clone(), id);
        inner.users.insert(id, record.clone());
        inner.roles.insert(id, vec![Role::Customer]);
        Ok(record)
    }

    async fn user_roles(&self, user_id: Uuid) -> Result<Vec<Role>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .roles
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn grant_role(&self, user_id: Uuid, role: Role) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let roles = inner.roles.entry(user_id).or_default();
        if !roles.contains(&role) {
            roles.push(role);
        }
        Ok(())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        record.password_hash = Some(password_hash.to_string());
        Ok(())
    }

    async fn mark_verified(&self, user_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        record.user.status = UserStatus::Verified;
        Ok(())
    }
}

#[async_trait]
impl StaffDirectory for MemoryStore {
    async fn find_membership(
        &self,
        shop_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ShopStaff>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .staff
            .get(&(shop_id, user_id))
            .cloned())
    }

    async fn add_staff(&self, staff: ShopStaff) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.staff.insert((staff.shop_id, staff.user_id), staff);
        Ok(())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn find_open_conversation(
        &self,
        buyer_user_id: Uuid,
        shop_id: Uuid,
    ) -> Result<Option<Conversation>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .conversations
            .values()
            .find(|c| {
                c.buyer_user_id == buyer_user_id
                    && c.shop_id == shop_id
                    && c.status == ConversationStatus::Open
            })
            .cloned())
    }

    async fn create_conversation(
        &self,
        buyer_user_id: Uuid,
        shop_id: Uuid,
    ) -> Result<Conversation, StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.conversations.values().find(|c| {
            c.buyer_user_id == buyer_user_id
                && c.shop_id == shop_id
                && c.status == ConversationStatus::Open
        }) {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let conversation = Conversation {
            id: uuidv7(),
            buyer_user_id,
            shop_id,
            status: ConversationStatus::Open,
            created_at: now,
            updated_at: now,
        };
        inner
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        Ok(self.inner.read().await.conversations.get(&id).cloned())
    }

    async fn list_buyer_conversations(
        &self,
        buyer_user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>, StoreError> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.buyer_user_id == buyer_user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(page(rows, limit, offset))
    }

    async fn list_shop_conversations(
        &self,
        shop_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>, StoreError> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.shop_id == shop_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(page(rows, limit, offset))
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let conversation = inner
            .conversations
            .get_mut(&message.conversation_id)
            .ok_or_else(|| {
                StoreError::NotFound(format!("conversation {}", message.conversation_id))
            })?;
        conversation.updated_at = now;
        let stored = Message {
            id: uuidv7(),
            conversation_id: message.conversation_id,
            sender_user_id: message.sender_user_id,
            role: message.role,
            body: message.body,
            attachments: message.attachments,
            created_at: now,
            read_at: None,
        };
        inner.messages.push(stored.clone());
        Ok(stored)
    }

    async fn get_message(&self, id: Uuid) -> Result<Option<Message>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.messages.iter().find(|m| m.id == id).cloned())
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.read().await;
        let rows: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        Ok(page(rows, limit, offset))
    }

    async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.read().await;
        let rows: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        let skip = rows.len().saturating_sub(limit.max(0) as usize);
        Ok(rows.into_iter().skip(skip).collect())
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        sender_role: MessageRole,
        up_to: Option<DateTime<Utc>>,
        read_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let mut updated = 0;
        for message in inner.messages.iter_mut().filter(|m| {
            m.conversation_id == conversation_id
                && m.role == sender_role
                && m.read_at.is_none()
                && up_to.is_none_or(|t| m.created_at <= t)
        }) {
            message.read_at = Some(read_at);
            updated += 1;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser<'_> {
        NewUser {
            email,
            name: None,
            password_hash: Some("hash"),
            status: UserStatus::Unverified,
        }
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = MemoryStore::new();
        store.create_user(new_user("a@x.com")).await.unwrap();
        let err = store.create_user(new_user("a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn new_users_are_customers() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@x.com")).await.unwrap();
        assert_eq!(
            store.user_roles(user.user.id).await.unwrap(),
            vec![Role::Customer]
        );
        store.grant_role(user.user.id, Role::Admin).await.unwrap();
        store.grant_role(user.user.id, Role::Admin).await.unwrap();
        assert_eq!(store.user_roles(user.user.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn create_conversation_reuses_open_pair() {
        let store = MemoryStore::new();
        let (buyer, shop) = (Uuid::new_v4(), Uuid::new_v4());
        let a = store.create_conversation(buyer, shop).await.unwrap();
        let b = store.create_conversation(buyer, shop).await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn recent_messages_returns_tail_in_order() {
        let store = MemoryStore::new();
        let conv = store
            .create_conversation(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        for i in 0..5 {
            store
                .insert_message(NewMessage {
                    conversation_id: conv.id,
                    sender_user_id: conv.buyer_user_id,
                    role: MessageRole::Buyer,
                    body: format!("m{i}"),
                    attachments: None,
                })
                .await
                .unwrap();
        }
        let tail = store.recent_messages(conv.id, 2).await.unwrap();
        let bodies: Vec<_> = tail.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["m3", "m4"]);

        let page = store.list_messages(conv.id, 2, 1).await.unwrap();
        let bodies: Vec<_> = page.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn insert_message_requires_conversation() {
        let store = MemoryStore::new();
        let err = store
            .insert_message(NewMessage {
                conversation_id: Uuid::new_v4(),
                sender_user_id: Uuid::new_v4(),
                role: MessageRole::Buyer,
                body: "x".into(),
                attachments: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
