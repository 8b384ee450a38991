use chrono::{DateTime, Utc};
use hub_protocol::{WsEnvelope, ServerEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::mpsc;

use crate::sharded::ShardedMap;

/// Everything that can land in a connection's outbound queue: a hub-minted
/// event (call state, message delivery, errors) or another client's signed
/// envelope forwarded verbatim (WebRTC offer/answer/ICE, call accept/reject/end).
/// The relay path never re-wraps the inner envelope in a `ServerEvent` --
/// only the original sender's signature should ever cover it.
#[derive(Clone, Debug)]
pub enum OutboundFrame {
    Event(ServerEvent),
    Relay(WsEnvelope),
}

/// Handle to one live WebSocket connection's write side, keyed by the
/// registered address. A second `Identity`-scoped map isn't needed: the
/// hub's addressing scheme is the pubkey-derived address itself, so the
/// connection registry doubles as the presence registry.
#[derive(Clone)]
pub struct Connection {
    id: u64,
    tx: mpsc::Sender<OutboundFrame>,
    last_seen_millis: Arc<AtomicI64>,
}

impl Connection {
    pub fn new(id: u64, tx: mpsc::Sender<OutboundFrame>) -> Self {
        Self {
            id,
            tx,
            last_seen_millis: Arc::new(AtomicI64::new(Utc::now().timestamp_millis())),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn touch(&self) {
        self.last_seen_millis
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_seen_millis.load(Ordering::Relaxed))
            .unwrap_or_else(Utc::now)
    }

    pub async fn send_event(&self, event: ServerEvent) -> bool {
        self.tx.send(OutboundFrame::Event(event)).await.is_ok()
    }

    pub async fn send_relay(&self, envelope: WsEnvelope) -> bool {
        self.tx.send(OutboundFrame::Relay(envelope)).await.is_ok()
    }
}

/// Sharded address -> connection registry. A single address may only ever
/// own one live connection; registering a new one for an already-connected
/// address displaces the old one (the old connection's writer task observes
/// its channel close and tears itself down).
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<ShardedMap<String, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShardedMap::new()),
        }
    }

    /// Registers `connection` for `address`, returning the connection it
    /// displaced, if any, so the caller can close it out.
    pub async fn register(&self, address: &str, connection: Connection) -> Option<Connection> {
        self.inner.insert(address.to_owned(), connection).await
    }

    /// Removes `address`'s registration, but only if it still points at
    /// `connection_id` — guards against a disconnect handler racing with a
    /// newer connection that already displaced it.
    pub async fn unregister(&self, address: &str, connection_id: u64) {
        self.inner
            .remove_if(&address.to_owned(), |existing| existing.id() == connection_id)
            .await;
    }

    pub async fn get(&self, address: &str) -> Option<Connection> {
        self.inner.get(&address.to_owned()).await
    }

    pub async fn is_online(&self, address: &str) -> bool {
        self.inner.contains(&address.to_owned()).await
    }

    pub async fn touch(&self, address: &str) {
        if let Some(conn) = self.get(address).await {
            conn.touch();
        }
    }

    /// Connections whose last heartbeat predates `threshold` — candidates
    /// for the sweeper to forcibly disconnect.
    pub async fn stale_before(&self, threshold: DateTime<Utc>) -> Vec<(String, Connection)> {
        let mut stale = Vec::new();
        self.inner
            .retain(|address, conn| {
                if conn.last_seen() < threshold {
                    stale.push((address.clone(), conn.clone()));
                }
                true
            })
            .await;
        stale
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection(id: u64) -> (Connection, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel::<OutboundFrame>(8);
        (Connection::new(id, tx), rx)
    }

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = make_connection(1);
        assert!(registry.register("call:abc", conn).await.is_none());
        assert!(registry.is_online("call:abc").await);
    }

    #[tokio::test]
    async fn registering_a_second_connection_displaces_the_first() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = make_connection(1);
        let (second, _rx2) = make_connection(2);

        registry.register("call:abc", first).await;
        let displaced = registry.register("call:abc", second).await;

        assert_eq!(displaced.expect("first connection was displaced").id(), 1);
        assert_eq!(
            registry.get("call:abc").await.expect("still registered").id(),
            2
        );
    }

    #[tokio::test]
    async fn unregister_is_a_no_op_for_a_stale_connection_id() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = make_connection(1);
        let (second, _rx2) = make_connection(2);

        registry.register("call:abc", first).await;
        registry.register("call:abc", second).await;

        // The old connection's cleanup handler races in with its own id (1),
        // which no longer matches the live registration (2).
        registry.unregister("call:abc", 1).await;
        assert_eq!(
            registry.get("call:abc").await.expect("still registered").id(),
            2
        );

        registry.unregister("call:abc", 2).await;
        assert!(registry.get("call:abc").await.is_none());
    }
}
