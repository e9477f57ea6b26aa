//! Presence key-value contract
//!
//! Presence is kept in an external store with expiry so entries written by
//! a process that crashed disappear on their own. Every operation here is a
//! single atomic step on the store; callers never read-modify-write.

use dashmap::DashMap;
use std::time::{Duration, Instant};

#[async_trait::async_trait]
pub trait PresenceStore: Send + Sync {
    /// Set `key` to `value`, replacing any previous value, expiring after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> huddle_core::Result<()>;

    async fn get(&self, key: &str) -> huddle_core::Result<Option<String>>;

    /// Remove `key`. Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> huddle_core::Result<bool>;

    /// Remove `key` only while it still holds `expected`.
    async fn delete_if_eq(&self, key: &str, expected: &str) -> huddle_core::Result<bool>;
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process [`PresenceStore`] with lazy expiry.
#[derive(Default)]
pub struct MemoryPresenceStore {
    entries: DashMap<String, Entry>,
}

impl MemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.live(now));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> huddle_core::Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> huddle_core::Result<Option<String>> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(e) if e.live(now) => return Ok(Some(e.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, e| !e.live(now));
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> huddle_core::Result<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .map(|(_, e)| e.live(now))
            .unwrap_or(false))
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> huddle_core::Result<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove_if(key, |_, e| e.value == expected)
            .map(|(_, e)| e.live(now))
            .unwrap_or(false))
    }
}
