//! The webhook handler.
//!
//! Orchestrates one delivery end to end: policy gates, classification,
//! media selection and upload, composition, the post attempt, and the
//! posted-note record. Every path ends in an outcome code; the response is
//! always 200 and failures never escape as errors.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::join_all;
use tracing::{error, info, instrument, warn};

use crate::cache::{Cache, NS_POSTED_NOTE};
use crate::compose::{Composer, LinkTarget};
use crate::config::RelayConfig;
use crate::error::{PostFailure, RelayResult, TwitterError, TwitterResult};
use crate::media::select_media;
use crate::misskey::MisskeyClient;
use crate::policy::{Approval, PolicyEvaluator, Rejection};
use crate::profile::ProfileService;
use crate::store::ProfileStore;
use crate::tags::{classify, Tag, TagSet};
use crate::twitter::{TweetOptions, TwitterClient};
use crate::types::{DriveFile, Note, OutcomeCode, WebhookRequest, WebhookResponse};

const SECRET_MESSAGE: &str = "Your webhook secret is misconfigured; please review your \
    crossposter settings. If this used to work, someone may be probing your webhook, \
    so reply here to alert the administrator. (Do not edit the recipients!)";

const AUTH_HINT: &str = "Please check that all four API keys are configured correctly.\n\n\
    If this used to work and then broke, reply here, disable the webhook, and wait for \
    the administrator. (Do not edit the recipients!)";

const TRANSIENT_HINT: &str =
    "The Twitter API is temporarily unstable. Please try again in a while.";

/// Handles inbound webhook deliveries.
pub struct RelayHandler {
    config: RelayConfig,
    cache: Arc<dyn Cache>,
    profiles: ProfileService,
    misskey: MisskeyClient,
    /// Client for fetching attachment bytes from the origin instance.
    files: reqwest::Client,
}

impl RelayHandler {
    /// Wire up a handler from its collaborators. The cache is shared with
    /// the profile service and the Misskey client; its lifecycle belongs to
    /// the caller.
    pub fn new(
        config: RelayConfig,
        cache: Arc<dyn Cache>,
        store: Arc<dyn ProfileStore>,
    ) -> RelayResult<Self> {
        let profiles = ProfileService::new(
            store,
            Arc::clone(&cache),
            config.base_profile_dir.clone(),
            config.profile_ttl,
        );
        let misskey = MisskeyClient::new(
            config.misskey.clone(),
            Arc::clone(&cache),
            config.user_id_ttl,
        )?;
        let files = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            config,
            cache,
            profiles,
            misskey,
            files,
        })
    }

    /// Handle one delivery. Always yields a response; the outcome travels
    /// in the status field.
    pub async fn handle(&self, request: WebhookRequest) -> WebhookResponse {
        let status = self.process(&request).await;
        info!(%status, "webhook handled");
        WebhookResponse::new(status)
    }

    #[instrument(skip_all, fields(host = request.host.as_deref().unwrap_or("-")))]
    async fn process(&self, request: &WebhookRequest) -> OutcomeCode {
        let evaluator = PolicyEvaluator::new(self.cache.as_ref(), &self.profiles);

        let approval = match evaluator.evaluate(request).await {
            Ok(approval) => approval,
            Err(rejection) => {
                // Secret mismatch indicates misconfiguration or tampering;
                // tell the author out of band.
                if let (Rejection::InvalidSecret { username }, Some(host)) =
                    (&rejection, &request.host)
                {
                    self.misskey.notify_error(username, host, SECRET_MESSAGE).await;
                }
                return rejection.outcome();
            }
        };
        let Approval {
            host,
            note,
            profile,
            conf,
        } = approval;

        info!(note_id = %note.id, author = %format!("{}@{}", note.user_id, host), "relaying note");

        let classification = classify(&note, &profile.confs, &host);
        let body = classification.body.trim().to_owned();
        let mut tags = classification.tags;

        let selection = select_media(&note.files, &profile.confs);
        selection.record_tags(&mut tags);

        // The skip gate fires as soon as any tag is known, before any
        // upload is spent on a tweet that will never be sent.
        if !tags.is_empty() && profile.confs.skip_link_required {
            return OutcomeCode::SkipLinkRequired;
        }

        let twitter = match TwitterClient::new(conf.version, conf.tokens, &self.config.twitter) {
            Ok(twitter) => twitter,
            Err(err) => {
                error!(%err, "could not build Twitter client");
                return OutcomeCode::TwitterApiError;
            }
        };

        let media_ids = self
            .upload_selection(&twitter, &selection.files, &mut tags)
            .await;

        // An upload failure adds a tag, which can newly require the link.
        if !tags.is_empty() && profile.confs.skip_link_required {
            return OutcomeCode::SkipLinkRequired;
        }

        let include_link = !tags.is_empty() || profile.confs.always_include_link;
        let link = include_link.then_some(LinkTarget {
            host: &host,
            note_id: &note.id,
        });

        let composer = Composer::new(
            self.config.read_more_label.clone(),
            self.config.short_link_width,
        );
        let text = composer.compose(&body, &mut tags, profile.confs.enable_tags, link);

        let reply_to = match &note.reply {
            Some(reply) => {
                self.cache
                    .get(NS_POSTED_NOTE, &format!("{}@{}", reply.id, host))
                    .await
            }
            None => None,
        };

        let options = TweetOptions {
            reply_to,
            media_ids,
        };

        match twitter.post_tweet(&text, &options).await {
            Ok(tweet_id) => {
                self.cache
                    .set(
                        NS_POSTED_NOTE,
                        &format!("{}@{}", note.id, host),
                        &tweet_id,
                        Some(self.config.posted_note_ttl),
                    )
                    .await;

                info!(note_id = %note.id, %tweet_id, "posted");
                OutcomeCode::Ok
            }
            Err(err) => self.handle_post_failure(err, &note, &host).await,
        }
    }

    /// Fetch and upload the selected files concurrently. Media ids come
    /// back in selection order; failures degrade the tweet instead of
    /// failing the request.
    async fn upload_selection(
        &self,
        twitter: &TwitterClient,
        files: &[DriveFile],
        tags: &mut TagSet,
    ) -> Vec<String> {
        if files.is_empty() {
            return Vec::new();
        }

        let uploads = files.iter().map(|file| async move {
            let bytes = self.fetch_file(&file.url).await?;
            twitter.upload_media(bytes, &file.mime_type).await
        });

        let mut media_ids = Vec::new();
        let mut any_failed = false;

        for (file, result) in files.iter().zip(join_all(uploads).await) {
            match result {
                Ok(media_id) => media_ids.push(media_id),
                Err(err) => {
                    warn!(url = %file.url, %err, "media upload failed, posting without it");
                    any_failed = true;
                }
            }
        }

        if any_failed {
            tags.insert(Tag::UploadFailed);
        }

        media_ids
    }

    async fn fetch_file(&self, url: &str) -> TwitterResult<Bytes> {
        let response = self.files.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?)
    }

    async fn handle_post_failure(
        &self,
        err: TwitterError,
        note: &Note,
        host: &str,
    ) -> OutcomeCode {
        match err.classify() {
            // The platform already has this content; nothing to repair.
            PostFailure::Duplicate => {
                info!(note_id = %note.id, "duplicate content, not retried");
                OutcomeCode::DuplicateTweet
            }
            PostFailure::Auth => {
                error!(note_id = %note.id, %err, "credentials rejected");
                self.profiles
                    .evict(&format!("{}@{}", note.user_id, host))
                    .await;
                self.notify_post_failure(note, host, AUTH_HINT, &err).await;
                OutcomeCode::TwitterApiError
            }
            PostFailure::Transient => {
                error!(note_id = %note.id, %err, "still unavailable after retry");
                self.notify_post_failure(note, host, TRANSIENT_HINT, &err).await;
                OutcomeCode::TwitterApiError
            }
            PostFailure::Other => {
                error!(note_id = %note.id, %err, "post attempt failed");
                self.notify_post_failure(note, host, "", &err).await;
                OutcomeCode::TwitterApiError
            }
        }
    }

    async fn notify_post_failure(&self, note: &Note, host: &str, hint: &str, err: &TwitterError) {
        let detail = err.upstream_detail();
        let message = if hint.is_empty() {
            format!("Twitter API error.\n\n(error message: {detail})")
        } else {
            format!("Twitter API error. {hint}\n\n(error message: {detail})")
        };

        self.misskey
            .notify_error(&note.user.username, host, &message)
            .await;
    }
}
