//! Socket frame shapes: `{event, data, ref?}` in both directions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;

pub const JOIN: &str = "chat:join";
pub const SEND: &str = "chat:message:send";
pub const READ: &str = "chat:message:read";

pub const MESSAGE_NEW: &str = "chat:message:new";
pub const MESSAGE_READ: &str = "chat:message:read";
pub const BACKFILL: &str = "chat:messages:backfill";
pub const ACK: &str = "ack";
pub const ERROR: &str = "error";

/// A client frame. `ref` is echoed on the matching `ack` or `error`.
#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, rename = "ref")]
    pub reference: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct OutboundFrame<'a, T> {
    pub event: &'a str,
    pub data: T,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    pub conversation_id: Uuid,
    #[serde(default)]
    pub backfill: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    pub conversation_id: Uuid,
    pub body: String,
    #[serde(default)]
    pub attachments: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadPayload {
    pub conversation_id: Uuid,
    #[serde(default)]
    pub read_up_to_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ErrorData<'a> {
    pub code: &'a str,
    pub message: String,
}

/// Serialize an event frame. Serialization of these shapes cannot fail in
/// practice; a failure degrades to an `error` frame.
pub fn encode<T: Serialize>(event: &str, data: T, reference: Option<Value>) -> String {
    let frame = OutboundFrame {
        event,
        data,
        reference,
    };
    serde_json::to_string(&frame).unwrap_or_else(|e| {
        format!(r#"{{"event":"error","data":{{"code":"INTERNAL_SERVER_ERROR","message":"{e}"}}}}"#)
    })
}

pub fn error(reference: Option<Value>, err: &AppError) -> String {
    encode(
        ERROR,
        ErrorData {
            code: err.code(),
            message: err.public_message(),
        },
        reference,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_frame_reads_ref() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"event":"chat:join","data":{"conversationId":"00000000-0000-0000-0000-000000000000"},"ref":7}"#)
                .unwrap();
        assert_eq!(frame.event, JOIN);
        assert_eq!(frame.reference, Some(Value::from(7)));
        let join: JoinPayload = serde_json::from_value(frame.data).unwrap();
        assert_eq!(join.conversation_id, Uuid::nil());
        assert!(join.backfill.is_none());
    }

    #[test]
    fn error_frame_carries_code_and_ref() {
        let text = error(
            Some(Value::from("r1")),
            &AppError::Forbidden("Not a participant".into()),
        );
        let json: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["event"], "error");
        assert_eq!(json["ref"], "r1");
        assert_eq!(json["data"]["code"], "FORBIDDEN");
        assert_eq!(json["data"]["message"], "Not a participant");
    }

    #[test]
    fn ref_is_omitted_when_absent() {
        let json: Value = serde_json::from_str(&encode(MESSAGE_NEW, 1, None)).unwrap();
        assert!(json.get("ref").is_none());
    }
}
