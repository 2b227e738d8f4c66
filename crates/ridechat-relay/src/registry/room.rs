//! Room registry: an arena of connection handles plus booking-keyed rooms.
//!
//! Both maps live behind one lock so membership and the arena never disagree.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

/// Transport-assigned connection identifier.
pub type ConnectionId = u64;

/// Serialized server frame, shared by every recipient of a broadcast.
pub type OutboundFrame = Arc<str>;

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, mpsc::Sender<OutboundFrame>>,
    rooms: HashMap<i64, HashSet<ConnectionId>>,
}

/// Thread-safe registry of connections and the booking rooms they joined.
#[derive(Clone)]
pub struct RoomRegistry {
    inner: Arc<RwLock<Inner>>,
    next_id: Arc<AtomicU64>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a live connection and return its id.
    pub async fn register(&self, tx: mpsc::Sender<OutboundFrame>) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.write().await.connections.insert(id, tx);
        debug!(conn_id = id, "Connection registered");
        id
    }

    /// Drop a connection and remove it from every room it joined.
    ///
    /// Returns the bookings the connection was a member of.
    pub async fn unregister(&self, id: ConnectionId) -> Vec<i64> {
        let mut inner = self.inner.write().await;
        if inner.connections.remove(&id).is_none() {
            warn!(conn_id = id, "Tried to unregister unknown connection");
        }

        let mut left = Vec::new();
        inner.rooms.retain(|booking_id, members| {
            if members.remove(&id) {
                left.push(*booking_id);
            }
            !members.is_empty()
        });
        debug!(conn_id = id, rooms = left.len(), "Connection unregistered");
        left
    }

    /// Add a connection to a booking room. Returns `false` if it was already
    /// a member.
    pub async fn join(&self, booking_id: i64, id: ConnectionId) -> bool {
        let added = self
            .inner
            .write()
            .await
            .rooms
            .entry(booking_id)
            .or_default()
            .insert(id);
        if added {
            info!(booking_id, conn_id = id, "Connection joined room");
        }
        added
    }

    /// Remove a connection from a booking room. Empty rooms are discarded.
    pub async fn leave(&self, booking_id: i64, id: ConnectionId) -> bool {
        let mut inner = self.inner.write().await;
        let Some(members) = inner.rooms.get_mut(&booking_id) else {
            return false;
        };
        let removed = members.remove(&id);
        if members.is_empty() {
            inner.rooms.remove(&booking_id);
        }
        removed
    }

    /// Send a frame to every member of a room, optionally skipping one
    /// connection. Returns the number of connections the frame was queued for.
    ///
    /// Frames to a connection whose outbound queue is full are dropped for
    /// that connection only.
    pub async fn broadcast(
        &self,
        booking_id: i64,
        frame: OutboundFrame,
        excluding: Option<ConnectionId>,
    ) -> usize {
        let inner = self.inner.read().await;
        let Some(members) = inner.rooms.get(&booking_id) else {
            return 0;
        };

        let mut delivered = 0;
        for id in members {
            if Some(*id) == excluding {
                continue;
            }
            let Some(tx) = inner.connections.get(id) else {
                continue;
            };
            match tx.try_send(Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(booking_id, conn_id = *id, "Outbound queue full, dropping frame");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(booking_id, conn_id = *id, "Outbound queue closed");
                }
            }
        }
        delivered
    }

    /// Queue a frame for a single connection.
    pub async fn send_to(&self, id: ConnectionId, frame: OutboundFrame) -> bool {
        let inner = self.inner.read().await;
        inner
            .connections
            .get(&id)
            .is_some_and(|tx| tx.try_send(frame).is_ok())
    }

    pub async fn is_member(&self, booking_id: i64, id: ConnectionId) -> bool {
        self.inner
            .read()
            .await
            .rooms
            .get(&booking_id)
            .is_some_and(|m| m.contains(&id))
    }

    /// Ids of the connections currently in a room.
    pub async fn members(&self, booking_id: i64) -> Vec<ConnectionId> {
        self.inner
            .read()
            .await
            .rooms
            .get(&booking_id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Count of live connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// Count of non-empty rooms.
    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn frame(s: &str) -> OutboundFrame {
        Arc::from(s)
    }

    #[tokio::test]
    async fn register_assigns_distinct_ids() {
        let registry = RoomRegistry::new();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);

        let a = registry.register(tx1).await;
        let b = registry.register(tx2).await;
        assert_ne!(a, b);
        assert_eq!(registry.connection_count().await, 2);
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let registry = RoomRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        let id = registry.register(tx).await;

        assert!(registry.join(42, id).await);
        assert!(!registry.join(42, id).await);
        assert_eq!(registry.members(42).await, vec![id]);
    }

    #[tokio::test]
    async fn broadcast_reaches_room_only() {
        let registry = RoomRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        let (tx3, mut rx3) = mpsc::channel(4);
        let a = registry.register(tx1).await;
        let b = registry.register(tx2).await;
        let c = registry.register(tx3).await;
        registry.join(1, a).await;
        registry.join(1, b).await;
        registry.join(2, c).await;

        assert_eq!(registry.broadcast(1, frame("hello"), None).await, 2);
        assert_eq!(&*rx1.recv().await.unwrap(), "hello");
        assert_eq!(&*rx2.recv().await.unwrap(), "hello");
        assert!(rx3.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_can_exclude_sender() {
        let registry = RoomRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        let a = registry.register(tx1).await;
        let b = registry.register(tx2).await;
        registry.join(7, a).await;
        registry.join(7, b).await;

        assert_eq!(registry.broadcast(7, frame("typing"), Some(a)).await, 1);
        assert!(rx1.try_recv().is_err());
        assert_eq!(&*rx2.recv().await.unwrap(), "typing");
    }

    #[tokio::test]
    async fn full_queue_drops_for_that_connection_only() {
        let registry = RoomRegistry::new();
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        let slow = registry.register(slow_tx).await;
        let fast = registry.register(fast_tx).await;
        registry.join(3, slow).await;
        registry.join(3, fast).await;

        assert_eq!(registry.broadcast(3, frame("one"), None).await, 2);
        assert_eq!(registry.broadcast(3, frame("two"), None).await, 1);
        assert_eq!(&*fast_rx.recv().await.unwrap(), "one");
        assert_eq!(&*fast_rx.recv().await.unwrap(), "two");
    }

    #[tokio::test]
    async fn unregister_removes_membership_and_empty_rooms() {
        let registry = RoomRegistry::new();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);
        let a = registry.register(tx1).await;
        let b = registry.register(tx2).await;
        registry.join(1, a).await;
        registry.join(2, a).await;
        registry.join(2, b).await;

        let mut left = registry.unregister(a).await;
        left.sort_unstable();
        assert_eq!(left, vec![1, 2]);
        assert_eq!(registry.room_count().await, 1);
        assert_eq!(registry.members(2).await, vec![b]);
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn leave_discards_empty_room() {
        let registry = RoomRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        let id = registry.register(tx).await;
        registry.join(9, id).await;

        assert!(registry.leave(9, id).await);
        assert!(!registry.leave(9, id).await);
        assert!(!registry.is_member(9, id).await);
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn broadcast_to_unknown_room_is_noop() {
        let registry = RoomRegistry::new();
        assert_eq!(registry.broadcast(404, frame("x"), None).await, 0);
    }

    #[tokio::test]
    async fn send_to_single_connection() {
        let registry = RoomRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        let id = registry.register(tx).await;

        assert!(registry.send_to(id, frame("ack")).await);
        assert_eq!(&*rx.recv().await.unwrap(), "ack");
        assert!(!registry.send_to(id + 100, frame("ack")).await);
    }
}
