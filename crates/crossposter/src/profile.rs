//! User profiles.
//!
//! A profile is a named base document with a per-user override merged on
//! top (see [`crate::merge`]). Overrides are stored as JSON objects keyed by
//! a hash of `userId@host`; base documents are plain files in a local
//! directory. Resolution is fronted by a short-lived cache entry so repeated
//! webhook deliveries don't hammer the store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::cache::{Cache, NS_PROFILE};
use crate::error::{ProfileError, ProfileResult};
use crate::merge::merge;
use crate::store::ProfileStore;
use crate::twitter::{ApiVersion, TwitterTokens};
use crate::types::{DriveFile, Visibility};

/// A fully merged user profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// `userId@host` this profile belongs to. Must match the requested key.
    pub misskey_id: String,

    /// Webhook shared secret.
    pub secret: String,

    /// Name of the base document this profile was merged over.
    #[serde(default = "default_base_profile")]
    pub base_profile: String,

    /// Platform credentials, keyed by note visibility.
    #[serde(default)]
    pub twitter_api_confs: Vec<TwitterApiConf>,

    #[serde(default)]
    pub confs: UserConfs,
}

impl UserProfile {
    /// Credential configuration matching a note's visibility.
    #[must_use]
    pub fn api_conf_for(&self, visibility: Visibility) -> Option<&TwitterApiConf> {
        self.twitter_api_confs
            .iter()
            .find(|conf| conf.visibility == visibility)
    }
}

/// One platform credential configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterApiConf {
    pub visibility: Visibility,
    pub version: ApiVersion,
    pub tokens: TwitterTokens,
}

/// Per-user feature flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfs {
    /// Relay renotes at all.
    #[serde(default)]
    pub enable_renote: bool,

    /// Append the tag annotation chunk.
    #[serde(default)]
    pub enable_tags: bool,

    /// Skip posting entirely whenever a link would be required.
    #[serde(default)]
    pub skip_link_required: bool,

    /// Append the link line even when no tag requires it.
    #[serde(default)]
    pub always_include_link: bool,

    /// Hashtag that suppresses posting, matched case-insensitively.
    #[serde(default = "default_skip_hashtag")]
    pub skip_hashtag: String,

    /// Post only the content-warning text, not the gated body.
    #[serde(default)]
    pub cw_title_only: bool,

    /// Drop sensitive attachments instead of uploading them.
    #[serde(default)]
    pub exclude_nsfw: bool,
}

fn default_skip_hashtag() -> String {
    "nocp".into()
}

fn default_base_profile() -> String {
    "default".into()
}

impl Default for UserConfs {
    fn default() -> Self {
        Self {
            enable_renote: false,
            enable_tags: false,
            skip_link_required: false,
            always_include_link: false,
            skip_hashtag: default_skip_hashtag(),
            cw_title_only: false,
            exclude_nsfw: false,
        }
    }
}

impl UserConfs {
    /// Whether an attachment may accompany the tweet at all.
    #[must_use]
    pub fn file_includable(&self, file: &DriveFile) -> bool {
        !(file.is_sensitive && self.exclude_nsfw)
    }

    /// Whether any of the note's hashtags is the configured skip hashtag.
    #[must_use]
    pub fn has_skip_hashtag(&self, hashtags: &[String]) -> bool {
        hashtags
            .iter()
            .any(|tag| tag.eq_ignore_ascii_case(&self.skip_hashtag))
    }
}

/// Resolves profiles: cache, then store, then base-document merge.
pub struct ProfileService {
    store: Arc<dyn ProfileStore>,
    cache: Arc<dyn Cache>,
    base_profile_dir: PathBuf,
    cache_ttl: Duration,
}

impl ProfileService {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        cache: Arc<dyn Cache>,
        base_profile_dir: impl Into<PathBuf>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            base_profile_dir: base_profile_dir.into(),
            cache_ttl,
        }
    }

    /// Content-addressed cache/store key for `userId@host`.
    #[must_use]
    pub fn profile_key(user_key: &str) -> String {
        let digest = Sha256::digest(user_key.as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Resolve the merged profile for `userId@host`, or `None` when no
    /// override document exists.
    pub async fn resolve(&self, user_key: &str) -> ProfileResult<Option<UserProfile>> {
        let key = Self::profile_key(user_key);

        if let Some(cached) = self.cache.get(NS_PROFILE, &key).await {
            match serde_json::from_str(&cached) {
                Ok(profile) => return Ok(Some(profile)),
                // A stale entry from an older document shape; fall through
                // to a fresh fetch.
                Err(err) => warn!(user_key, %err, "discarding unparseable cached profile"),
            }
        }

        let Some(document) = self.store.fetch(&format!("profiles/{key}.json")).await? else {
            debug!(user_key, "no profile document");
            return Ok(None);
        };

        let overlay: serde_json::Value = serde_json::from_str(&document)?;

        let stored_id = overlay
            .get("misskeyId")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if stored_id != user_key {
            return Err(ProfileError::IdentityMismatch {
                expected: user_key.to_owned(),
                actual: stored_id.to_owned(),
            });
        }

        let base_name = overlay
            .get("baseProfile")
            .and_then(|v| v.as_str())
            .unwrap_or("default");
        let base = self.load_base_profile(base_name).await?;

        let merged = merge(base, overlay);
        let profile: UserProfile = serde_json::from_value(merged.clone())?;

        self.cache
            .set(NS_PROFILE, &key, &merged.to_string(), Some(self.cache_ttl))
            .await;

        Ok(Some(profile))
    }

    /// Drop the cached entry for `userId@host` so the next request
    /// re-fetches fresh data. Used when the platform rejects credentials.
    pub async fn evict(&self, user_key: &str) {
        self.cache
            .del(NS_PROFILE, &Self::profile_key(user_key))
            .await;
    }

    async fn load_base_profile(&self, name: &str) -> ProfileResult<serde_json::Value> {
        let path = self.base_profile_dir.join(format!("{name}.json"));
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| ProfileError::BaseProfileNotFound(name.to_owned()))?;

        Ok(serde_json::from_str(&raw)?)
    }
}
