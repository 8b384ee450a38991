use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::sharded::ShardedMap;

/// How long a `(from_address, nonce)` pair is remembered for replay
/// rejection. Matches the envelope freshness window with slack: a message
/// can't be replayed after its timestamp has aged out anyway, so nonces
/// only need to outlive that window, not forever.
pub const NONCE_TTL: Duration = Duration::minutes(5);

/// Sharded record of every `(address, nonce)` pair seen recently, so a
/// captured-and-replayed envelope is rejected even if its timestamp is
/// still inside the freshness window.
#[derive(Clone)]
pub struct NonceMemo {
    inner: Arc<ShardedMap<(String, String), DateTime<Utc>>>,
}

impl NonceMemo {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShardedMap::new()),
        }
    }

    /// Records `(address, nonce)` as seen at `now`. Returns `true` if this
    /// is the first time it's been observed, `false` if it's a replay.
    pub async fn observe(&self, address: &str, nonce: &str, now: DateTime<Utc>) -> bool {
        let key = (address.to_owned(), nonce.to_owned());
        self.inner.insert(key, now).await.is_none()
    }

    /// Drops entries older than `NONCE_TTL`. Run periodically by the
    /// background sweeper so the memo doesn't grow unbounded.
    pub async fn prune(&self, now: DateTime<Utc>) {
        self.inner
            .retain(|_, seen_at| now.signed_duration_since(*seen_at) < NONCE_TTL)
            .await;
    }
}

impl Default for NonceMemo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_observation_is_accepted_second_is_a_replay() {
        let memo = NonceMemo::new();
        let now = Utc::now();
        assert!(memo.observe("call:abc", "n1", now).await);
        assert!(!memo.observe("call:abc", "n1", now).await);
    }

    #[tokio::test]
    async fn same_nonce_from_different_addresses_does_not_collide() {
        let memo = NonceMemo::new();
        let now = Utc::now();
        assert!(memo.observe("call:abc", "n1", now).await);
        assert!(memo.observe("call:def", "n1", now).await);
    }

    #[tokio::test]
    async fn prune_drops_entries_older_than_the_ttl() {
        let memo = NonceMemo::new();
        let old = Utc::now() - Duration::minutes(10);
        memo.observe("call:abc", "n1", old).await;
        memo.prune(Utc::now()).await;
        // A pruned nonce is no longer remembered, so it would be accepted again.
        assert!(memo.observe("call:abc", "n1", Utc::now()).await);
    }
}
