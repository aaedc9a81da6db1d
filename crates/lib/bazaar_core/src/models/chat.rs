//! Chat domain models.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownVariant;

/// Conversation lifecycle. Conversations are never closed automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationStatus {
    Open,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Open => "OPEN",
            ConversationStatus::Closed => "CLOSED",
        }
    }
}

impl FromStr for ConversationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(ConversationStatus::Open),
            "CLOSED" => Ok(ConversationStatus::Closed),
            other => Err(UnknownVariant::new("conversation status", other)),
        }
    }
}

/// Side of the conversation a message was sent from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageRole {
    Buyer,
    Seller,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::Buyer => "BUYER",
            MessageRole::Seller => "SELLER",
        }
    }

    /// The other side of the conversation.
    pub fn opposite(&self) -> MessageRole {
        match self {
            MessageRole::Buyer => MessageRole::Seller,
            MessageRole::Seller => MessageRole::Buyer,
        }
    }
}

impl FromStr for MessageRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUYER" => Ok(MessageRole::Buyer),
            "SELLER" => Ok(MessageRole::Seller),
            other => Err(UnknownVariant::new("message role", other)),
        }
    }
}

/// Buyer ↔ shop conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub buyer_user_id: Uuid,
    pub shop_id: Uuid,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Chat message. Immutable apart from `read_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_user_id: Uuid,
    pub role: MessageRole,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Input for persisting a message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_user_id: Uuid,
    pub role: MessageRole,
    pub body: String,
    pub attachments: Option<serde_json::Value>,
}

/// Shop staff membership with its granted permission strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopStaff {
    pub shop_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub permissions: Vec<String>,
}
