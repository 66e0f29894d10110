//! Persistent store seam
//!
//! The engine's in-memory state is the source of truth for a process
//! lifetime; a `KeyValueStore` is a durability aid that mirrors lock
//! transitions and metrics snapshots so external processes can observe them
//! and a restarted engine can inspect what it held. Nothing in the engine
//! ever blocks a decision on the store.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Minimal get/set/ttl contract the engine requires from external storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value, `None` if absent or expired
    async fn get(&self, key: &str) -> Option<String>;

    /// Store a value, optionally expiring after `ttl`
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>);

    /// Remove a value
    async fn delete(&self, key: &str);
}

/// In-memory store with lazy TTL expiry
///
/// Useful as a default and in tests; swap in a real store (file, redis,
/// whatever the host provides) for cross-process durability.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, (String, Option<Instant>)>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        let (value, deadline) = entries.get(key)?;
        if let Some(deadline) = deadline {
            if Instant::now() > *deadline {
                return None;
            }
        }
        Some(value.clone())
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) {
        let deadline = ttl.map(|ttl| Instant::now() + ttl);
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value, deadline));
    }

    async fn delete(&self, key: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store.set("locks/fileA", "owner-1".into(), None).await;

        assert_eq!(store.get("locks/fileA").await.as_deref(), Some("owner-1"));

        store.delete("locks/fileA").await;
        assert_eq!(store.get("locks/fileA").await, None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .set("k", "v".into(), Some(Duration::from_millis(20)))
            .await;

        assert_eq!(store.get("k").await.as_deref(), Some("v"));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn test_overwrite() {
        let store = MemoryStore::new();
        store.set("k", "v1".into(), None).await;
        store.set("k", "v2".into(), None).await;
        assert_eq!(store.get("k").await.as_deref(), Some("v2"));
    }
}
