//! Profile object store.
//!
//! Profiles live as JSON documents in an S3-compatible object host and are
//! fetched by key over plain HTTP. The trait keeps the handler decoupled
//! from the storage technology; the in-memory implementation backs tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::instrument;

use crate::error::{ProfileError, ProfileResult};

/// Read access to stored profile documents.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch the document at `key`, or `None` if it does not exist.
    async fn fetch(&self, key: &str) -> ProfileResult<Option<String>>;
}

/// [`ProfileStore`] over an HTTP object host.
#[derive(Debug, Clone)]
pub struct HttpProfileStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProfileStore {
    /// Create a store rooted at `base_url` (no trailing slash required).
    pub fn new(base_url: impl Into<String>) -> ProfileResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }
}

#[async_trait]
impl ProfileStore for HttpProfileStore {
    #[instrument(skip(self))]
    async fn fetch(&self, key: &str) -> ProfileResult<Option<String>> {
        let url = format!("{}/{}", self.base_url, key);
        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            return Err(ProfileError::Store {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(Some(response.text().await?))
    }
}

/// In-memory [`ProfileStore`] for tests and local runs.
///
/// Counts fetches so tests can assert when the store was (not) consulted.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    objects: RwLock<HashMap<String, String>>,
    fetches: AtomicUsize,
}

impl MemoryProfileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, document: impl Into<String>) {
        self.objects.write().insert(key.into(), document.into());
    }

    pub fn remove(&self, key: &str) {
        self.objects.write().remove(key);
    }

    /// Number of `fetch` calls made so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn fetch(&self, key: &str) -> ProfileResult<Option<String>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.objects.read().get(key).cloned())
    }
}
