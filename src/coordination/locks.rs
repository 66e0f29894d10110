//! Coordination lock manager
//!
//! TTL-bounded mutual-exclusion locks over named resources. Expiry is lazy:
//! a lock whose `expires_at` has passed is treated as free at the next
//! acquisition attempt, so a crashed or stuck owner can never starve a
//! resource permanently. A periodic sweep drops expired entries for
//! housekeeping and metrics; it is not required for correctness.
//!
//! The table is plain owned state: it is only ever mutated from the
//! scheduler's serialized decision path.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A TTL-bounded exclusive lock on one resource key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationLock {
    /// The locked resource
    pub resource_key: String,

    /// Request currently holding the lock
    pub owner: Uuid,

    /// Acquisition timestamp
    pub acquired_at: DateTime<Utc>,

    /// Time-to-live granted at acquisition
    pub ttl: Duration,

    /// Instant after which the lock is implicitly free
    pub expires_at: DateTime<Utc>,
}

impl CoordinationLock {
    fn new(resource_key: String, owner: Uuid, ttl: Duration) -> Self {
        let acquired_at = Utc::now();
        let expires_at = acquired_at
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        Self {
            resource_key,
            owner,
            acquired_at,
            ttl,
            expires_at,
        }
    }

    /// Check whether the lock has outlived its TTL
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Result of an acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// The lock was granted to the caller
    Acquired,
    /// The caller already holds a live lock on this key
    AlreadyOwner,
    /// A different owner holds a live lock
    HeldByOther {
        /// The live owner
        owner: Uuid,
    },
}

/// Table of live coordination locks
#[derive(Debug, Default)]
pub struct LockManager {
    locks: HashMap<String, CoordinationLock>,
}

impl LockManager {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to acquire `key` for `owner` with the given TTL
    ///
    /// Succeeds when the key is unlocked or the existing lock has expired.
    /// Re-acquisition by the current owner refreshes the TTL.
    pub fn acquire(&mut self, key: &str, owner: Uuid, ttl: Duration) -> Acquire {
        let now = Utc::now();
        if let Some(existing) = self.locks.get(key) {
            if !existing.is_expired(now) {
                if existing.owner == owner {
                    // Refresh rather than layering a second grant
                    self.locks
                        .insert(key.to_string(), CoordinationLock::new(key.to_string(), owner, ttl));
                    return Acquire::AlreadyOwner;
                }
                return Acquire::HeldByOther {
                    owner: existing.owner,
                };
            }
            tracing::debug!(
                resource = key,
                stale_owner = %existing.owner,
                "reclaiming expired lock"
            );
        }

        self.locks
            .insert(key.to_string(), CoordinationLock::new(key.to_string(), owner, ttl));
        Acquire::Acquired
    }

    /// Release `key` if and only if `owner` is the live holder
    ///
    /// Returns `false` otherwise, so a late-finishing, previously-timed-out
    /// worker cannot release a lock it no longer owns.
    pub fn release(&mut self, key: &str, owner: Uuid) -> bool {
        let now = Utc::now();
        match self.locks.get(key) {
            Some(lock) if lock.owner == owner && !lock.is_expired(now) => {
                self.locks.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Check whether a live lock exists for `key`
    pub fn is_held(&self, key: &str) -> bool {
        self.owner_of(key).is_some()
    }

    /// Live owner of `key`, if any
    pub fn owner_of(&self, key: &str) -> Option<Uuid> {
        let now = Utc::now();
        self.locks
            .get(key)
            .filter(|lock| !lock.is_expired(now))
            .map(|lock| lock.owner)
    }

    /// Release every lock held by `owner`; returns the released keys
    pub fn release_all_for(&mut self, owner: Uuid) -> Vec<String> {
        let keys: Vec<String> = self
            .locks
            .iter()
            .filter(|(_, lock)| lock.owner == owner)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            self.locks.remove(key);
        }
        keys
    }

    /// Release every lock regardless of owner (shutdown / emergency reset)
    pub fn release_everything(&mut self) -> usize {
        let count = self.locks.len();
        self.locks.clear();
        count
    }

    /// Drop expired entries; returns how many were swept
    pub fn sweep(&mut self) -> usize {
        let now = Utc::now();
        let before = self.locks.len();
        self.locks.retain(|_, lock| !lock.is_expired(now));
        before - self.locks.len()
    }

    /// Number of live locks
    pub fn held_count(&self) -> usize {
        let now = Utc::now();
        self.locks.values().filter(|l| !l.is_expired(now)).count()
    }

    /// Iterate live locks (for store mirroring and diagnostics)
    pub fn live_locks(&self) -> impl Iterator<Item = &CoordinationLock> {
        let now = Utc::now();
        self.locks.values().filter(move |l| !l.is_expired(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ttl_ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn test_acquire_and_release() {
        let mut locks = LockManager::new();
        let owner = Uuid::new_v4();

        assert_eq!(locks.acquire("fileA", owner, ttl_ms(30_000)), Acquire::Acquired);
        assert!(locks.is_held("fileA"));
        assert_eq!(locks.owner_of("fileA"), Some(owner));

        assert!(locks.release("fileA", owner));
        assert!(!locks.is_held("fileA"));
    }

    #[test]
    fn test_mutual_exclusion() {
        let mut locks = LockManager::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert_eq!(locks.acquire("fileA", a, ttl_ms(30_000)), Acquire::Acquired);
        assert_eq!(
            locks.acquire("fileA", b, ttl_ms(30_000)),
            Acquire::HeldByOther { owner: a }
        );
        // At most one live owner per key
        assert_eq!(locks.owner_of("fileA"), Some(a));
    }

    #[test]
    fn test_release_by_non_owner_is_noop() {
        let mut locks = LockManager::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        locks.acquire("fileA", a, ttl_ms(30_000));
        assert!(!locks.release("fileA", b));
        assert_eq!(locks.owner_of("fileA"), Some(a));
    }

    #[test]
    fn test_reacquire_refreshes_ttl() {
        let mut locks = LockManager::new();
        let a = Uuid::new_v4();

        assert_eq!(locks.acquire("fileA", a, ttl_ms(30_000)), Acquire::Acquired);
        assert_eq!(locks.acquire("fileA", a, ttl_ms(30_000)), Acquire::AlreadyOwner);
        assert_eq!(locks.held_count(), 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry_allows_reacquisition() {
        let mut locks = LockManager::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        locks.acquire("fileA", a, ttl_ms(20));
        assert!(locks.is_held("fileA"));

        tokio::time::sleep(Duration::from_millis(40)).await;

        // Lazy expiry: the stale lock is free without an explicit release
        assert!(!locks.is_held("fileA"));
        assert_eq!(locks.acquire("fileA", b, ttl_ms(30_000)), Acquire::Acquired);
        assert_eq!(locks.owner_of("fileA"), Some(b));
    }

    #[tokio::test]
    async fn test_stale_owner_cannot_release_after_expiry() {
        let mut locks = LockManager::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        locks.acquire("fileA", a, ttl_ms(20));
        tokio::time::sleep(Duration::from_millis(40)).await;
        locks.acquire("fileA", b, ttl_ms(30_000));

        // The timed-out previous owner must not free b's lock
        assert!(!locks.release("fileA", a));
        assert_eq!(locks.owner_of("fileA"), Some(b));
    }

    #[test]
    fn test_release_all_for_owner() {
        let mut locks = LockManager::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        locks.acquire("x", a, ttl_ms(30_000));
        locks.acquire("y", a, ttl_ms(30_000));
        locks.acquire("z", b, ttl_ms(30_000));

        let mut released = locks.release_all_for(a);
        released.sort();
        assert_eq!(released, vec!["x".to_string(), "y".to_string()]);
        assert!(locks.is_held("z"));
    }

    #[test]
    fn test_release_everything() {
        let mut locks = LockManager::new();
        locks.acquire("x", Uuid::new_v4(), ttl_ms(30_000));
        locks.acquire("y", Uuid::new_v4(), ttl_ms(30_000));

        assert_eq!(locks.release_everything(), 2);
        assert_eq!(locks.held_count(), 0);
    }

    #[tokio::test]
    async fn test_sweep_drops_expired() {
        let mut locks = LockManager::new();
        locks.acquire("x", Uuid::new_v4(), ttl_ms(20));
        locks.acquire("y", Uuid::new_v4(), ttl_ms(30_000));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(locks.sweep(), 1);
        assert!(locks.is_held("y"));
    }
}
