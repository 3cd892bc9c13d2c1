//! Relay configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// The Misskey instance used for error notifications.
    pub misskey: MisskeyConfig,

    /// Twitter endpoint roots.
    #[serde(default)]
    pub twitter: TwitterEndpoints,

    /// Object-store root for profile documents.
    pub profile_store_url: String,

    /// Directory holding base profile documents (`<name>.json`).
    #[serde(default = "default_base_profile_dir")]
    pub base_profile_dir: PathBuf,

    /// Label in front of the "read more" link.
    #[serde(default = "default_read_more_label")]
    pub read_more_label: String,

    /// Width Twitter bills for a wrapped URL. Carried as configuration;
    /// never validated against the platform's actual behavior.
    #[serde(default = "default_short_link_width")]
    pub short_link_width: usize,

    /// TTL for cached merged profiles.
    #[serde(default = "default_profile_ttl", with = "duration_secs")]
    pub profile_ttl: Duration,

    /// TTL for cached username → user-id resolutions.
    #[serde(default = "default_user_id_ttl", with = "duration_secs")]
    pub user_id_ttl: Duration,

    /// Retention window for note-id → tweet-id records. Reply threading
    /// and duplicate suppression degrade gracefully once it lapses.
    #[serde(default = "default_posted_note_ttl", with = "duration_secs")]
    pub posted_note_ttl: Duration,
}

fn default_base_profile_dir() -> PathBuf {
    "./base_profiles".into()
}

fn default_read_more_label() -> String {
    "Read more".into()
}

fn default_short_link_width() -> usize {
    23
}

fn default_profile_ttl() -> Duration {
    Duration::from_secs(60 * 5)
}

fn default_user_id_ttl() -> Duration {
    Duration::from_secs(60 * 60 * 24)
}

fn default_posted_note_ttl() -> Duration {
    Duration::from_secs(60 * 60 * 24)
}

/// The Misskey instance the relay notifies through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MisskeyConfig {
    /// Host of the notifying instance, e.g. `misskey.example`.
    pub instance: String,

    /// Username of the administrator account to copy on error
    /// notifications.
    pub admin: String,

    /// API token used to create notes.
    pub api_token: String,

    /// Base URL override (for testing). Defaults to
    /// `https://{instance}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl MisskeyConfig {
    /// Effective API base URL.
    #[must_use]
    pub fn url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}", self.instance))
    }
}

/// Twitter endpoint roots, overridable for testing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterEndpoints {
    /// Base URL for the REST API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Base URL for media uploads.
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
}

fn default_api_url() -> String {
    "https://api.twitter.com".into()
}

fn default_upload_url() -> String {
    "https://upload.twitter.com".into()
}

impl Default for TwitterEndpoints {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            upload_url: default_upload_url(),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let config: RelayConfig = serde_json::from_str(
            r#"{
                "misskey": {
                    "instance": "misskey.example",
                    "admin": "admin",
                    "api_token": "token"
                },
                "profile_store_url": "https://objects.example/crossposter"
            }"#,
        )
        .unwrap();

        assert_eq!(config.twitter.api_url, "https://api.twitter.com");
        assert_eq!(config.read_more_label, "Read more");
        assert_eq!(config.short_link_width, 23);
        assert_eq!(config.profile_ttl, Duration::from_secs(300));
        assert_eq!(config.misskey.url(), "https://misskey.example");
    }

    #[test]
    fn base_url_override_wins() {
        let misskey = MisskeyConfig {
            instance: "misskey.example".into(),
            admin: "admin".into(),
            api_token: "token".into(),
            base_url: Some("http://127.0.0.1:9999".into()),
        };

        assert_eq!(misskey.url(), "http://127.0.0.1:9999");
    }
}
