//! Relay listener: one pattern subscription per instance, fanning chat
//! events out to local rooms.

use std::sync::Arc;
use std::time::Duration;

use bazaar_core::cache::{CacheError, CacheStream, SecretCache};
use bazaar_core::chat::events::{CHANNEL_PATTERN, ChatEvent, ReadReceipt};
use futures_util::StreamExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::frames::{self, MESSAGE_NEW, MESSAGE_READ};
use super::hub::ChatHub;

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Read receipt as delivered to sockets.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadFrame<'a> {
    conversation_id: Uuid,
    #[serde(flatten)]
    receipt: &'a ReadReceipt,
}

/// Deliver one raw pub/sub payload to the local room. Malformed payloads are
/// dropped. Returns the number of sockets reached.
pub fn dispatch(hub: &ChatHub, payload: &str) -> usize {
    let event = match ChatEvent::decode(payload) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "dropping malformed chat event");
            return 0;
        }
    };
    let conversation_id = event.conversation_id();
    let frame = match &event {
        ChatEvent::Message { data, .. } => frames::encode(MESSAGE_NEW, data, None),
        ChatEvent::Read { data, .. } => frames::encode(
            MESSAGE_READ,
            ReadFrame {
                conversation_id,
                receipt: data,
            },
            None,
        ),
    };
    hub.broadcast(conversation_id, &frame)
}

/// Subscribe, then spawn the listener. The subscription is live when this
/// returns, so events published afterwards are never missed.
pub async fn start_relay(
    cache: Arc<dyn SecretCache>,
    hub: ChatHub,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, CacheError> {
    let stream = cache.psubscribe(CHANNEL_PATTERN).await?;
    info!(pattern = CHANNEL_PATTERN, "chat relay subscribed");
    Ok(tokio::spawn(run(cache, hub, cancel, stream)))
}

async fn run(
    cache: Arc<dyn SecretCache>,
    hub: ChatHub,
    cancel: CancellationToken,
    mut stream: CacheStream,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = stream.next() => match next {
                Some(msg) => {
                    dispatch(&hub, &msg.payload);
                }
                None => {
                    warn!("chat relay subscription ended, resubscribing");
                    stream = match resubscribe(&*cache, &cancel).await {
                        Some(stream) => stream,
                        None => break,
                    };
                }
            },
        }
    }
    info!("chat relay stopped");
}

/// Retry the subscription until it succeeds or shutdown is requested.
async fn resubscribe(cache: &dyn SecretCache, cancel: &CancellationToken) -> Option<CacheStream> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
        }
        match cache.psubscribe(CHANNEL_PATTERN).await {
            Ok(stream) => return Some(stream),
            Err(e) => warn!(error = %e, "chat relay resubscribe failed"),
        }
    }
}
