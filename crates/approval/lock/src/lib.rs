//! Distributed lock for the workflow creation path.
//!
//! A named, TTL-bounded mutual-exclusion primitive with Redis
//! `SET key value NX PX ttl` semantics: acquisition is non-blocking and
//! returns a random token on success, release only succeeds when the
//! token still matches (so an expired holder cannot release a lock a
//! later caller re-acquired).
//!
//! The engine holds the lock only around instance creation; approvals on
//! an existing instance are serialized by the store's version check, not
//! by this lock.

#![deny(unsafe_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Named, TTL-bounded mutual exclusion usable from any process instance.
///
/// `acquire` must never block waiting for a holder: a held lock is an
/// immediate `None`, and the caller decides whether to surface that as a
/// conflict.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Try to take the lock. Returns the release token on success, `None`
    /// when the lock is currently held.
    async fn acquire(&self, key: &str, ttl: Duration) -> Option<String>;

    /// Release the lock if `token` still owns it. Returns whether a
    /// release actually happened.
    async fn release(&self, key: &str, token: &str) -> bool;
}

struct Entry {
    token: String,
    expires_at: Instant,
}

/// In-process lock table with the same observable semantics as the
/// shared-store variant. Suitable for tests and single-node deployments.
#[derive(Default)]
pub struct InMemoryLock {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DistributedLock for InMemoryLock {
    async fn acquire(&self, key: &str, ttl: Duration) -> Option<String> {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::error!(key, "lock table poisoned, refusing acquisition");
                return None;
            }
        };

        let now = Instant::now();
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > now {
                tracing::debug!(key, "lock already held");
                return None;
            }
        }

        let token = uuid::Uuid::new_v4().to_string();
        entries.insert(
            key.to_string(),
            Entry {
                token: token.clone(),
                expires_at: now + ttl,
            },
        );
        tracing::debug!(key, "lock acquired");
        Some(token)
    }

    async fn release(&self, key: &str, token: &str) -> bool {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };

        match entries.get(key) {
            Some(entry) if entry.token == token => {
                entries.remove(key);
                tracing::debug!(key, "lock released");
                true
            }
            _ => {
                tracing::debug!(key, "release skipped, token no longer owns the lock");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_while_held() {
        let lock = InMemoryLock::new();
        let token = lock
            .acquire("workflow:start:ORDER:42", Duration::from_secs(10))
            .await
            .unwrap();

        assert!(lock
            .acquire("workflow:start:ORDER:42", Duration::from_secs(10))
            .await
            .is_none());

        assert!(lock.release("workflow:start:ORDER:42", &token).await);
        assert!(lock
            .acquire("workflow:start:ORDER:42", Duration::from_secs(10))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn different_keys_are_independent() {
        let lock = InMemoryLock::new();
        assert!(lock
            .acquire("workflow:start:ORDER:1", Duration::from_secs(10))
            .await
            .is_some());
        assert!(lock
            .acquire("workflow:start:ORDER:2", Duration::from_secs(10))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn expired_lock_can_be_reacquired() {
        let lock = InMemoryLock::new();
        let stale = lock
            .acquire("k", Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        let fresh = lock.acquire("k", Duration::from_secs(10)).await.unwrap();
        assert_ne!(stale, fresh);

        // The stale holder can no longer release the new owner's lock.
        assert!(!lock.release("k", &stale).await);
        assert!(lock.release("k", &fresh).await);
    }

    #[tokio::test]
    async fn release_with_wrong_token_is_refused() {
        let lock = InMemoryLock::new();
        lock.acquire("k", Duration::from_secs(10)).await.unwrap();
        assert!(!lock.release("k", "not-the-token").await);
        // Still held.
        assert!(lock.acquire("k", Duration::from_secs(10)).await.is_none());
    }

    #[tokio::test]
    async fn release_of_unknown_key_is_refused() {
        let lock = InMemoryLock::new();
        assert!(!lock.release("never-acquired", "token").await);
    }
}
