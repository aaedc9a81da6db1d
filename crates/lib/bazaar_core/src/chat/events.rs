//! Pub/sub event envelope for the chat relay.
//!
//! Every instance publishes chat events to the secret cache and subscribes
//! to a single pattern; the envelope carries its own conversation id so the
//! subscriber never has to parse channel names.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::chat::Message;

/// Pattern matching every conversation channel.
pub const CHANNEL_PATTERN: &str = "chat:conv:*:*";

/// Channel carrying new messages for a conversation.
pub fn message_channel(conversation_id: Uuid) -> String {
    format!("chat:conv:{conversation_id}:message")
}

/// Channel carrying read receipts for a conversation.
pub fn read_channel(conversation_id: Uuid) -> String {
    format!("chat:conv:{conversation_id}:read")
}

/// Read receipt payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub by_user_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_up_to_id: Option<Uuid>,
    pub updated: u64,
}

/// Tagged chat event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    rename_all = "lowercase",
    rename_all_fields = "camelCase"
)]
pub enum ChatEvent {
    Message {
        conversation_id: Uuid,
        data: Message,
    },
    Read {
        conversation_id: Uuid,
        data: ReadReceipt,
    },
}

impl ChatEvent {
    pub fn conversation_id(&self) -> Uuid {
        match self {
            ChatEvent::Message {
                conversation_id, ..
            }
            | ChatEvent::Read {
                conversation_id, ..
            } => *conversation_id,
        }
    }

    /// The channel this event is published on.
    pub fn channel(&self) -> String {
        match self {
            ChatEvent::Message {
                conversation_id, ..
            } => message_channel(*conversation_id),
            ChatEvent::Read {
                conversation_id, ..
            } => read_channel(*conversation_id),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::chat::MessageRole;

    fn sample_message(conversation_id: Uuid) -> Message {
        Message {
            id: Uuid::now_v7(),
            conversation_id,
            sender_user_id: Uuid::new_v4(),
            role: MessageRole::Buyer,
            body: "hi".into(),
            attachments: None,
            created_at: Utc::now(),
            read_at: None,
        }
    }

    #[test]
    fn channels_are_scoped_per_conversation() {
        let id = Uuid::nil();
        assert_eq!(
            message_channel(id),
            "chat:conv:00000000-0000-0000-0000-000000000000:message"
        );
        assert_eq!(
            read_channel(id),
            "chat:conv:00000000-0000-0000-0000-000000000000:read"
        );
    }

    #[test]
    fn envelope_is_tagged_by_kind() {
        let conv = Uuid::new_v4();
        let event = ChatEvent::Read {
            conversation_id: conv,
            data: ReadReceipt {
                by_user_id: Uuid::nil(),
                read_up_to_id: None,
                updated: 3,
            },
        };
        let json: serde_json::Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
        assert_eq!(json["kind"], "read");
        assert_eq!(json["conversationId"], conv.to_string());
        assert_eq!(json["data"]["updated"], 3);
        assert!(json["data"].get("readUpToId").is_none());
    }

    #[test]
    fn decode_recovers_message_event() {
        let conv = Uuid::new_v4();
        let event = ChatEvent::Message {
            conversation_id: conv,
            data: sample_message(conv),
        };
        let decoded = ChatEvent::decode(&event.encode().unwrap()).unwrap();
        assert_eq!(decoded.conversation_id(), conv);
        assert_eq!(decoded.channel(), message_channel(conv));
        assert_eq!(decoded, event);
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        let raw = r#"{"kind":"typing","conversationId":"00000000-0000-0000-0000-000000000000"}"#;
        assert!(ChatEvent::decode(raw).is_err());
        assert!(ChatEvent::decode("not json").is_err());
    }
}
