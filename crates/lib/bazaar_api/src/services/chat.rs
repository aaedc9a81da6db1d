//! Chat service: conversations, messages and read receipts.
//!
//! Every state change is published to the secret cache; sockets only ever
//! receive events through the relay listener, so all instances deliver the
//! same stream.

use std::sync::Arc;

use bazaar_core::cache::SecretCache;
use bazaar_core::chat::events::{ChatEvent, ReadReceipt};
use bazaar_core::models::chat::{Conversation, Message, MessageRole, NewMessage};
use bazaar_core::store::{ChatStore, StaffDirectory};
use chrono::Utc;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Default page size for conversation listings.
pub const DEFAULT_CONVERSATION_LIMIT: i64 = 20;

/// Default page size for message listings.
pub const DEFAULT_MESSAGE_LIMIT: i64 = 50;

/// How a user takes part in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participant {
    pub role: MessageRole,
    pub shop_id: Uuid,
}

#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    staff: Arc<dyn StaffDirectory>,
    cache: Arc<dyn SecretCache>,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        staff: Arc<dyn StaffDirectory>,
        cache: Arc<dyn SecretCache>,
    ) -> Self {
        Self {
            store,
            staff,
            cache,
        }
    }

    /// Open a conversation with a shop, reusing the buyer's OPEN one.
    pub async fn start(&self, buyer_user_id: Uuid, shop_id: Uuid) -> AppResult<Conversation> {
        if let Some(existing) = self
            .store
            .find_open_conversation(buyer_user_id, shop_id)
            .await?
        {
            return Ok(existing);
        }
        let conversation = self
            .store
            .create_conversation(buyer_user_id, shop_id)
            .await?;
        debug!(conversation_id = %conversation.id, %shop_id, "conversation started");
        Ok(conversation)
    }

    pub async fn list_mine(
        &self,
        buyer_user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Conversation>> {
        Ok(self
            .store
            .list_buyer_conversations(buyer_user_id, limit, offset)
            .await?)
    }

    pub async fn list_shop(
        &self,
        shop_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Conversation>> {
        Ok(self
            .store
            .list_shop_conversations(shop_id, limit, offset)
            .await?)
    }

    /// Resolve the caller's side of a conversation: the buyer is BUYER, any
    /// staff member of the shop is SELLER, anyone else is refused.
    pub async fn assert_participant(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> AppResult<Participant> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Conversation not found".into()))?;
        if conversation.buyer_user_id == user_id {
            return Ok(Participant {
                role: MessageRole::Buyer,
                shop_id: conversation.shop_id,
            });
        }
        if self
            .staff
            .find_membership(conversation.shop_id, user_id)
            .await?
            .is_some()
        {
            return Ok(Participant {
                role: MessageRole::Seller,
                shop_id: conversation.shop_id,
            });
        }
        Err(AppError::Forbidden("Not a participant".into()))
    }

    pub async fn list_messages(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Message>> {
        self.assert_participant(user_id, conversation_id).await?;
        Ok(self
            .store
            .list_messages(conversation_id, limit, offset)
            .await?)
    }

    /// The newest `limit` messages, oldest first.
    pub async fn recent_messages(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<Message>> {
        self.assert_participant(user_id, conversation_id).await?;
        Ok(self
            .store
            .recent_messages(conversation_id, limit.max(0))
            .await?)
    }

    pub async fn send_message(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        body: String,
        attachments: Option<Value>,
    ) -> AppResult<Message> {
        let participant = self.assert_participant(user_id, conversation_id).await?;
        if body.trim().is_empty() {
            return Err(AppError::Validation("body should not be empty".into()));
        }
        let message = self
            .store
            .insert_message(NewMessage {
                conversation_id,
                sender_user_id: user_id,
                role: participant.role,
                body,
                attachments: attachments.filter(|v| !v.is_null()),
            })
            .await?;

        self.publish(&ChatEvent::Message {
            conversation_id,
            data: message.clone(),
        })
        .await?;
        Ok(message)
    }

    /// Mark the other side's unread messages as read, optionally only up to
    /// and including `read_up_to_id`.
    pub async fn mark_read(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        read_up_to_id: Option<Uuid>,
    ) -> AppResult<u64> {
        let participant = self.assert_participant(user_id, conversation_id).await?;

        let threshold = match read_up_to_id {
            Some(message_id) => {
                let message = self
                    .store
                    .get_message(message_id)
                    .await?
                    .filter(|m| m.conversation_id == conversation_id)
                    .ok_or_else(|| AppError::NotFound("Message not in conversation".into()))?;
                Some(message.created_at)
            }
            None => None,
        };

        let updated = self
            .store
            .mark_read(
                conversation_id,
                participant.role.opposite(),
                threshold,
                Utc::now(),
            )
            .await?;

        self.publish(&ChatEvent::Read {
            conversation_id,
            data: ReadReceipt {
                by_user_id: user_id,
                read_up_to_id,
                updated,
            },
        })
        .await?;
        Ok(updated)
    }

    async fn publish(&self, event: &ChatEvent) -> AppResult<()> {
        let payload = event
            .encode()
            .map_err(|e| AppError::Internal(format!("encode chat event: {e}")))?;
        self.cache.publish(&event.channel(), &payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bazaar_core::cache::MemoryCache;
    use bazaar_core::chat::events::CHANNEL_PATTERN;
    use bazaar_core::models::chat::ShopStaff;
    use bazaar_core::store::MemoryStore;
    use futures_util::StreamExt;

    use super::*;

    struct Fixture {
        service: ChatService,
        store: Arc<MemoryStore>,
        cache: Arc<MemoryCache>,
        buyer: Uuid,
        seller: Uuid,
        shop: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let (buyer, seller, shop) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store
            .add_staff(ShopStaff {
                shop_id: shop,
                user_id: seller,
                role: "agent".into(),
                permissions: vec!["chat.read".into()],
            })
            .await
            .unwrap();
        Fixture {
            service: ChatService::new(store.clone(), store.clone(), cache.clone()),
            store,
            cache,
            buyer,
            seller,
            shop,
        }
    }

    #[tokio::test]
    async fn start_reuses_open_conversation() {
        let f = fixture().await;
        let a = f.service.start(f.buyer, f.shop).await.unwrap();
        let b = f.service.start(f.buyer, f.shop).await.unwrap();
        assert_eq!(a.id, b.id);
        let mine = f.service.list_mine(f.buyer, 20, 0).await.unwrap();
        assert_eq!(mine.len(), 1);
    }

    #[tokio::test]
    async fn participants_resolve_to_roles() {
        let f = fixture().await;
        let conv = f.service.start(f.buyer, f.shop).await.unwrap();
        let buyer = f.service.assert_participant(f.buyer, conv.id).await.unwrap();
        assert_eq!(buyer.role, MessageRole::Buyer);
        let seller = f
            .service
            .assert_participant(f.seller, conv.id)
            .await
            .unwrap();
        assert_eq!(seller.role, MessageRole::Seller);
        assert_eq!(seller.shop_id, f.shop);

        let outsider = f.service.assert_participant(Uuid::new_v4(), conv.id).await;
        assert!(matches!(outsider, Err(AppError::Forbidden(_))));
        let missing = f.service.assert_participant(f.buyer, Uuid::new_v4()).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn send_message_persists_and_publishes() {
        let f = fixture().await;
        let mut events = f.cache.psubscribe(CHANNEL_PATTERN).await.unwrap();
        let conv = f.service.start(f.buyer, f.shop).await.unwrap();
        let message = f
            .service
            .send_message(f.seller, conv.id, "hello".into(), None)
            .await
            .unwrap();
        assert_eq!(message.role, MessageRole::Seller);

        let published = events.next().await.unwrap();
        match ChatEvent::decode(&published.payload).unwrap() {
            ChatEvent::Message { data, .. } => assert_eq!(data.id, message.id),
            other => panic!("unexpected event {other:?}"),
        }

        let stored = f.store.get_conversation(conv.id).await.unwrap().unwrap();
        assert!(stored.updated_at >= conv.updated_at);
    }

    #[tokio::test]
    async fn blank_body_is_rejected() {
        let f = fixture().await;
        let conv = f.service.start(f.buyer, f.shop).await.unwrap();
        let err = f
            .service
            .send_message(f.buyer, conv.id, "   ".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_and_one_sided() {
        let f = fixture().await;
        let conv = f.service.start(f.buyer, f.shop).await.unwrap();
        for body in ["a", "b"] {
            f.service
                .send_message(f.buyer, conv.id, body.into(), None)
                .await
                .unwrap();
        }
        f.service
            .send_message(f.seller, conv.id, "reply".into(), None)
            .await
            .unwrap();

        assert_eq!(f.service.mark_read(f.seller, conv.id, None).await.unwrap(), 2);
        assert_eq!(f.service.mark_read(f.seller, conv.id, None).await.unwrap(), 0);
        assert_eq!(f.service.mark_read(f.buyer, conv.id, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mark_read_up_to_message_is_inclusive_and_idempotent() {
        let f = fixture().await;
        let conv = f.service.start(f.buyer, f.shop).await.unwrap();
        let first = f
            .service
            .send_message(f.buyer, conv.id, "m1".into(), None)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        f.service
            .send_message(f.buyer, conv.id, "m2".into(), None)
            .await
            .unwrap();

        let up_to = Some(first.id);
        assert_eq!(f.service.mark_read(f.seller, conv.id, up_to).await.unwrap(), 1);
        assert_eq!(f.service.mark_read(f.seller, conv.id, up_to).await.unwrap(), 0);
        assert_eq!(f.service.mark_read(f.seller, conv.id, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mark_read_rejects_foreign_message_id() {
        let f = fixture().await;
        let conv = f.service.start(f.buyer, f.shop).await.unwrap();
        let other = f.service.start(f.buyer, Uuid::new_v4()).await.unwrap();
        let foreign = f
            .service
            .send_message(f.buyer, other.id, "x".into(), None)
            .await
            .unwrap();
        let err = f
            .service
            .mark_read(f.seller, conv.id, Some(foreign.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
