use chrono::{DateTime, Utc};
use hub_core::Plan;
use std::sync::Arc;
use uuid::Uuid;

use crate::sharded::ShardedMap;

/// A call between `call:init` and `call:accept`/`call:reject`. Lives only in
/// memory: if the hub restarts mid-ring, the call is simply gone and both
/// sides time out waiting for a response, same as any other dropped ring.
#[derive(Debug, Clone)]
pub struct RingState {
    pub caller_address: String,
    pub callee_address: String,
    pub caller_plan: Plan,
    pub callee_plan: Plan,
    pub video: bool,
    pub consume_pass: Option<String>,
    pub rung_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct RingRegistry {
    inner: Arc<ShardedMap<Uuid, RingState>>,
}

impl RingRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShardedMap::new()),
        }
    }

    pub async fn insert(&self, call_session_id: Uuid, state: RingState) {
        self.inner.insert(call_session_id, state).await;
    }

    pub async fn get(&self, call_session_id: Uuid) -> Option<RingState> {
        self.inner.get(&call_session_id).await
    }

    pub async fn remove(&self, call_session_id: Uuid) -> Option<RingState> {
        self.inner.remove(&call_session_id).await
    }
}

impl Default for RingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ring() -> RingState {
        RingState {
            caller_address: "call:caller".to_owned(),
            callee_address: "call:callee".to_owned(),
            caller_plan: Plan::Free,
            callee_plan: Plan::Free,
            video: false,
            consume_pass: None,
            rung_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_then_get_returns_the_same_ring() {
        let registry = RingRegistry::new();
        let id = Uuid::new_v4();
        registry.insert(id, sample_ring()).await;

        let found = registry.get(id).await.expect("ring should be present");
        assert_eq!(found.caller_address, "call:caller");
    }

    #[tokio::test]
    async fn remove_takes_the_ring_out_and_get_no_longer_finds_it() {
        let registry = RingRegistry::new();
        let id = Uuid::new_v4();
        registry.insert(id, sample_ring()).await;

        let removed = registry.remove(id).await;
        assert!(removed.is_some());
        assert!(registry.get(id).await.is_none());
    }

    #[tokio::test]
    async fn unknown_call_session_id_is_absent() {
        let registry = RingRegistry::new();
        assert!(registry.get(Uuid::new_v4()).await.is_none());
    }
}
