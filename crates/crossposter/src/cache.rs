//! Key-value cache behind the relay.
//!
//! Plain namespaced get/set/del with per-entry TTLs. The cache is handed to
//! components that need it rather than reached through any global; the
//! request-handling boundary owns its lifecycle. Everything is best-effort:
//! a cache miss is always safe, so the interface is infallible and
//! implementations swallow (and log) their own transport faults.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Namespace for resolved user profiles.
pub const NS_PROFILE: &str = "profile";

/// Namespace for note-id → tweet-id records.
pub const NS_POSTED_NOTE: &str = "posted-note-id";

/// Namespace for username@host → Misskey user id records.
pub const NS_USER_ID: &str = "user-id";

/// Namespaced string cache with TTLs.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch a live entry. Expired entries behave as absent.
    async fn get(&self, namespace: &str, key: &str) -> Option<String>;

    /// Store an entry. `None` means no expiry.
    async fn set(&self, namespace: &str, key: &str, value: &str, ttl: Option<Duration>);

    /// Drop an entry if present.
    async fn del(&self, namespace: &str, key: &str);
}

/// In-memory [`Cache`] with lazy TTL expiry.
///
/// Suitable for tests and single-process deployments; a networked
/// implementation can replace it without touching any caller.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn full_key(namespace: &str, key: &str) -> String {
        format!("{namespace}:{key}")
    }

    /// Drop expired entries. Called on writes so the map doesn't grow
    /// unbounded between reads.
    fn sweep(&self) {
        let now = Utc::now();
        self.entries.write().retain(|_, e| !e.is_expired(now));
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, namespace: &str, key: &str) -> Option<String> {
        if namespace.is_empty() || key.is_empty() {
            return None;
        }

        let full = Self::full_key(namespace, key);
        let now = Utc::now();

        let entries = self.entries.read();
        entries
            .get(&full)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone())
    }

    async fn set(&self, namespace: &str, key: &str, value: &str, ttl: Option<Duration>) {
        if namespace.is_empty() || key.is_empty() || value.is_empty() {
            return;
        }

        self.sweep();

        let expires_at =
            ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok().map(|d| Utc::now() + d));

        self.entries.write().insert(
            Self::full_key(namespace, key),
            Entry {
                value: value.to_owned(),
                expires_at,
            },
        );
    }

    async fn del(&self, namespace: &str, key: &str) {
        self.entries
            .write()
            .remove(&Self::full_key(namespace, key));
    }
}
