use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Number of stripes backing each `ShardedMap`. Chosen to keep lock
/// contention low under the hub's expected connection counts without
/// over-allocating for small deployments.
pub const SHARD_COUNT: usize = 32;

/// A map split into independently-locked stripes, so concurrent access to
/// unrelated keys never blocks on the same `RwLock`. Used for the connection
/// registry and the nonce replay memo, both of which are read and written on
/// every inbound frame across every connection.
pub struct ShardedMap<K, V> {
    shards: Vec<RwLock<HashMap<K, V>>>,
}

impl<K, V> ShardedMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(RwLock::new(HashMap::new()));
        }
        Self { shards }
    }

    fn shard_index(&self, key: &K) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let shard = &self.shards[self.shard_index(key)];
        shard.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &K) -> bool {
        let shard = &self.shards[self.shard_index(key)];
        shard.read().await.contains_key(key)
    }

    /// Inserts `value`, returning whatever was previously stored at `key`.
    pub async fn insert(&self, key: K, value: V) -> Option<V> {
        let shard = &self.shards[self.shard_index(&key)];
        shard.write().await.insert(key, value)
    }

    pub async fn remove(&self, key: &K) -> Option<V> {
        let shard = &self.shards[self.shard_index(key)];
        shard.write().await.remove(key)
    }

    /// Removes `key` only if its current value satisfies `predicate`, so a
    /// caller can avoid clobbering a value a concurrent writer already
    /// replaced (e.g. a newer connection for the same address).
    pub async fn remove_if(&self, key: &K, predicate: impl FnOnce(&V) -> bool) -> bool {
        let shard = &self.shards[self.shard_index(key)];
        let mut guard = shard.write().await;
        if let Some(existing) = guard.get(key) {
            if predicate(existing) {
                guard.remove(key);
                return true;
            }
        }
        false
    }

    pub async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.read().await.len();
        }
        total
    }

    /// Retains only entries for which `keep` returns true, across every
    /// shard. Used by the background sweeper to prune expired nonces.
    pub async fn retain(&self, mut keep: impl FnMut(&K, &V) -> bool) {
        for shard in &self.shards {
            shard.write().await.retain(|k, v| keep(k, v));
        }
    }
}

impl<K, V> Default for ShardedMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let map: ShardedMap<String, i32> = ShardedMap::new();
        assert_eq!(map.insert("a".to_owned(), 1).await, None);
        assert_eq!(map.get(&"a".to_owned()).await, Some(1));
    }

    #[tokio::test]
    async fn insert_returns_previous_value() {
        let map: ShardedMap<String, i32> = ShardedMap::new();
        map.insert("a".to_owned(), 1).await;
        assert_eq!(map.insert("a".to_owned(), 2).await, Some(1));
        assert_eq!(map.get(&"a".to_owned()).await, Some(2));
    }

    #[tokio::test]
    async fn remove_if_only_removes_matching_value() {
        let map: ShardedMap<String, i32> = ShardedMap::new();
        map.insert("a".to_owned(), 1).await;
        assert!(!map.remove_if(&"a".to_owned(), |v| *v == 99).await);
        assert_eq!(map.get(&"a".to_owned()).await, Some(1));
        assert!(map.remove_if(&"a".to_owned(), |v| *v == 1).await);
        assert_eq!(map.get(&"a".to_owned()).await, None);
    }

    #[tokio::test]
    async fn retain_prunes_across_shards() {
        let map: ShardedMap<String, i32> = ShardedMap::new();
        for i in 0..100 {
            map.insert(format!("key-{i}"), i).await;
        }
        map.retain(|_, v| *v % 2 == 0).await;
        assert_eq!(map.len().await, 50);
    }
}
