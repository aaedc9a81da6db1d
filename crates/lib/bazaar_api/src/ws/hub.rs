//! Local conversation rooms: which sockets on this instance follow which
//! conversation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Identifies one socket session on this instance.
pub type SocketId = u64;

struct Member {
    socket_id: SocketId,
    tx: UnboundedSender<String>,
}

#[derive(Default)]
struct HubInner {
    rooms: DashMap<Uuid, Vec<Member>>,
    next_id: AtomicU64,
}

#[derive(Clone, Default)]
pub struct ChatHub {
    inner: Arc<HubInner>,
}

impl ChatHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_socket_id(&self) -> SocketId {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Add a socket to a conversation room. Joining twice is a no-op.
    pub fn join(&self, conversation_id: Uuid, socket_id: SocketId, tx: UnboundedSender<String>) {
        let mut members = self.inner.rooms.entry(conversation_id).or_default();
        if !members.iter().any(|m| m.socket_id == socket_id) {
            members.push(Member { socket_id, tx });
        }
    }

    /// Drop a socket from every room it joined.
    pub fn leave_all(&self, socket_id: SocketId) {
        self.inner.rooms.retain(|_, members| {
            members.retain(|m| m.socket_id != socket_id);
            !members.is_empty()
        });
    }

    /// Send `frame` to every socket in the room. Returns the delivery count.
    pub fn broadcast(&self, conversation_id: Uuid, frame: &str) -> usize {
        let Some(mut members) = self.inner.rooms.get_mut(&conversation_id) else {
            return 0;
        };
        members.retain(|m| m.tx.send(frame.to_string()).is_ok());
        members.len()
    }

    pub fn room_size(&self, conversation_id: Uuid) -> usize {
        self.inner
            .rooms
            .get(&conversation_id)
            .map_or(0, |members| members.len())
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;

    #[test]
    fn broadcast_reaches_room_members_only() {
        let hub = ChatHub::new();
        let (conv, other) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();
        let (s1, s2) = (hub.next_socket_id(), hub.next_socket_id());
        hub.join(conv, s1, tx1.clone());
        hub.join(conv, s1, tx1);
        hub.join(other, s2, tx2);

        assert_eq!(hub.room_size(conv), 1);
        assert_eq!(hub.broadcast(conv, "x"), 1);
        assert_eq!(rx1.try_recv().unwrap(), "x");
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn leave_all_empties_rooms() {
        let hub = ChatHub::new();
        let conv = Uuid::new_v4();
        let (tx, _rx) = unbounded_channel();
        let socket = hub.next_socket_id();
        hub.join(conv, socket, tx);
        hub.leave_all(socket);
        assert_eq!(hub.room_size(conv), 0);
        assert_eq!(hub.broadcast(conv, "x"), 0);
    }

    #[test]
    fn closed_sockets_are_pruned_on_broadcast() {
        let hub = ChatHub::new();
        let conv = Uuid::new_v4();
        let (tx, rx) = unbounded_channel();
        hub.join(conv, hub.next_socket_id(), tx);
        drop(rx);
        assert_eq!(hub.broadcast(conv, "x"), 0);
    }
}
