//! Misskey client for error notifications.
//!
//! When something goes wrong on a user's behalf (bad webhook secret,
//! rejected credentials, platform failure) the relay tells them about it
//! in-band: a restricted-visibility note addressed to the affected user
//! and the administrator.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{instrument, warn};

use crate::cache::{Cache, NS_USER_ID};
use crate::config::MisskeyConfig;
use crate::error::{MisskeyError, MisskeyResult};

/// Client for the notifying Misskey instance.
pub struct MisskeyClient {
    client: reqwest::Client,
    config: MisskeyConfig,
    cache: Arc<dyn Cache>,
    user_id_ttl: Duration,
}

impl MisskeyClient {
    pub fn new(
        config: MisskeyConfig,
        cache: Arc<dyn Cache>,
        user_id_ttl: Duration,
    ) -> MisskeyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            config,
            cache,
            user_id_ttl,
        })
    }

    /// Resolve `username@host` to the instance-native user id.
    ///
    /// Resolutions are stable, so they are cached for a long while.
    #[instrument(skip(self))]
    pub async fn resolve_user_id(&self, username: &str, host: &str) -> MisskeyResult<String> {
        let cache_key = format!("{username}@{host}");

        if let Some(id) = self.cache.get(NS_USER_ID, &cache_key).await {
            return Ok(id);
        }

        #[derive(Deserialize)]
        struct ShownUser {
            id: String,
        }

        let user: ShownUser = self
            .call(
                "api/users/show",
                json!({
                    "username": username,
                    "host": host,
                    "i": self.config.api_token,
                }),
            )
            .await?;

        self.cache
            .set(NS_USER_ID, &cache_key, &user.id, Some(self.user_id_ttl))
            .await;

        Ok(user.id)
    }

    /// Create a `specified`-visibility note visible to `visible_user_ids`.
    #[instrument(skip(self, text))]
    pub async fn create_direct_note(
        &self,
        text: &str,
        visible_user_ids: &[String],
    ) -> MisskeyResult<()> {
        #[derive(Deserialize)]
        struct CreatedNote {
            #[serde(default)]
            #[allow(dead_code)]
            id: Option<String>,
        }

        let _: CreatedNote = self
            .call(
                "api/notes/create",
                json!({
                    "text": text,
                    "visibility": "specified",
                    "visibleUserIds": visible_user_ids,
                    "i": self.config.api_token,
                }),
            )
            .await?;

        Ok(())
    }

    /// Notify the affected user and the administrator about an error.
    ///
    /// Best-effort: a failed notification is logged and swallowed so it
    /// never changes the webhook outcome.
    pub async fn notify_error(&self, username: &str, host: &str, message: &str) {
        if let Err(err) = self.try_notify_error(username, host, message).await {
            warn!(username, host, %err, "failed to send error notification");
        }
    }

    async fn try_notify_error(
        &self,
        username: &str,
        host: &str,
        message: &str,
    ) -> MisskeyResult<()> {
        let target = self.resolve_user_id(username, host).await?;
        let admin = self
            .resolve_user_id(&self.config.admin, &self.config.instance)
            .await?;

        let mut recipients = vec![target];
        if !recipients.contains(&admin) {
            recipients.push(admin);
        }

        self.create_direct_note(message, &recipients).await
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> MisskeyResult<T> {
        let url = format!("{}/{}", self.config.url().trim_end_matches('/'), endpoint);
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(MisskeyError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json().await?)
    }
}
