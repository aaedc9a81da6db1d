//! WebSocket chat gateway.
//!
//! A socket authenticates once on connect. Commands only acknowledge;
//! `chat:message:new` and `chat:message:read` arrive exclusively through the
//! relay listener, so every instance delivers the same events.

pub mod frames;
pub mod hub;
pub mod relay;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::debug;
use uuid::Uuid;

use self::frames::{ACK, BACKFILL, InboundFrame, JoinPayload, ReadPayload, SendPayload};
use self::hub::SocketId;
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::AppQuery;

pub use self::hub::ChatHub;
pub use self::relay::start_relay;

const MAX_BACKFILL: i64 = 200;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

/// Token from the `Authorization` header, else the `token` query parameter,
/// with any `Bearer ` prefix removed.
/// A blank header falls through to the query parameter.
pub fn socket_token(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bare_token)
        .or_else(|| query.and_then(bare_token))
}

fn bare_token(raw: &str) -> Option<String> {
    let token = raw.trim();
    let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// `GET /ws`: upgrade to a chat socket.
pub async fn ws_handler(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ConnectQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = socket_token(&headers, query.token.as_deref());
    ws.on_upgrade(move |socket| session(state, socket, token))
}

/// Per-connection state used by command handlers.
struct Session<'a> {
    state: &'a AppState,
    user_id: Uuid,
    socket_id: SocketId,
    tx: &'a UnboundedSender<String>,
}

async fn session(state: AppState, socket: WebSocket, token: Option<String>) {
    let (mut sink, mut stream) = socket.split();

    let user_id = token
        .as_deref()
        .and_then(|t| state.tokens.verify_access(t).ok())
        .and_then(|claims| claims.user_id());
    let Some(user_id) = user_id else {
        debug!("socket rejected: missing or invalid token");
        let frame = frames::error(None, &AppError::Unauthorized("Unauthorized".into()));
        let _ = sink.send(Message::Text(frame.into())).await;
        let _ = sink.send(Message::Close(None)).await;
        return;
    };

    let socket_id = state.hub.next_socket_id();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });
    debug!(%user_id, socket_id, "socket connected");

    let session = Session {
        state: &state,
        user_id,
        socket_id,
        tx: &tx,
    };
    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                let reply = session.handle(text.as_str()).await;
                if tx.send(reply).is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.hub.leave_all(socket_id);
    drop(tx);
    let _ = writer.await;
    debug!(%user_id, socket_id, "socket disconnected");
}

fn payload<T: DeserializeOwned>(data: Value) -> AppResult<T> {
    serde_json::from_value(data).map_err(|e| AppError::Validation(format!("invalid payload: {e}")))
}

impl Session<'_> {
    /// Handle one client frame, returning the `ack` or `error` reply.
    async fn handle(&self, text: &str) -> String {
        let frame: InboundFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                return frames::error(None, &AppError::Validation(format!("invalid frame: {e}")));
            }
        };
        let reference = frame.reference.clone();
        let result = match frame.event.as_str() {
            frames::JOIN => self.join(frame.data).await,
            frames::SEND => self.send(frame.data).await,
            frames::READ => self.read(frame.data).await,
            other => Err(AppError::Validation(format!("unknown event: {other}"))),
        };
        match result {
            Ok(data) => frames::encode(ACK, data, reference),
            Err(err) => frames::error(reference, &err),
        }
    }

    async fn join(&self, data: Value) -> AppResult<Value> {
        let JoinPayload {
            conversation_id,
            backfill,
        } = payload(data)?;
        let chat = &self.state.chat;
        chat.assert_participant(self.user_id, conversation_id).await?;
        // Join the room before reading the backfill. A message published in
        // between reaches the socket twice (live and backfilled), never zero
        // times; clients de-duplicate by message id.
        self.state
            .hub
            .join(conversation_id, self.socket_id, self.tx.clone());

        let limit = backfill
            .unwrap_or(self.state.config.backfill_limit)
            .clamp(0, MAX_BACKFILL);
        let items = chat
            .recent_messages(self.user_id, conversation_id, limit)
            .await?;
        let backfill = frames::encode(
            BACKFILL,
            json!({ "conversationId": conversation_id, "items": items }),
            None,
        );
        let _ = self.tx.send(backfill);
        Ok(json!({ "ok": true, "room": format!("conv:{conversation_id}") }))
    }

    async fn send(&self, data: Value) -> AppResult<Value> {
        let SendPayload {
            conversation_id,
            body,
            attachments,
        } = payload(data)?;
        let message = self
            .state
            .chat
            .send_message(self.user_id, conversation_id, body, attachments)
            .await?;
        Ok(json!({ "ok": true, "id": message.id }))
    }

    async fn read(&self, data: Value) -> AppResult<Value> {
        let ReadPayload {
            conversation_id,
            read_up_to_id,
        } = payload(data)?;
        let updated = self
            .state
            .chat
            .mark_read(self.user_id, conversation_id, read_up_to_id)
            .await?;
        Ok(json!({ "ok": true, "updated": updated }))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn header_token_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(socket_token(&headers, Some("xyz")).as_deref(), Some("abc"));
    }

    #[test]
    fn query_token_prefix_is_stripped() {
        let headers = HeaderMap::new();
        assert_eq!(
            socket_token(&headers, Some("Bearer xyz")).as_deref(),
            Some("xyz")
        );
        assert_eq!(socket_token(&headers, Some("xyz")).as_deref(), Some("xyz"));
        assert_eq!(socket_token(&headers, None), None);
        assert_eq!(socket_token(&headers, Some("")), None);
    }

    #[test]
    fn blank_header_falls_back_to_query() {
        for blank in ["", "   ", "Bearer ", "Bearer    "] {
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, HeaderValue::from_static(blank));
            assert_eq!(
                socket_token(&headers, Some("xyz")).as_deref(),
                Some("xyz"),
                "header {blank:?}"
            );
            assert_eq!(socket_token(&headers, None), None, "header {blank:?}");
        }
    }
}
