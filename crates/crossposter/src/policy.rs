//! Request policy evaluation.
//!
//! A linear gate chain: each rule either rejects with a named outcome or
//! falls through to the next, and later rules may assume everything before
//! them passed. There is no backtracking; the first failing rule wins.
//! Rejections are outcomes, not errors, and cause no side effects here;
//! the handler owns side effects (like the invalid-secret notification).

use tracing::{debug, warn};

use crate::cache::{Cache, NS_POSTED_NOTE};
use crate::profile::{ProfileService, TwitterApiConf, UserProfile};
use crate::types::{Note, OutcomeCode, Visibility, WebhookPayload, WebhookRequest};

/// A request that passed every gate.
#[derive(Debug)]
pub struct Approval {
    pub host: String,
    pub note: Note,
    pub profile: UserProfile,
    pub conf: TwitterApiConf,
}

/// Why a request was turned away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No originating-host header.
    HostMissing,
    /// Body is not parseable as a webhook payload, or carries no note.
    MalformedBody,
    /// Payload is not a note-creation event.
    NotNote,
    /// Mentions imply a targeted conversation, not a broadcast.
    MentionsPresent,
    /// Replies to someone else's note stay in the thread.
    ReplyToOtherUser,
    /// Direct messages are never relayed.
    DirectMessage,
    /// The note was already posted; resubmission is suppressed.
    AlreadyPosted,
    /// No profile document for this author.
    UserNotFound,
    /// Shared secret mismatch; the handler notifies the author.
    InvalidSecret { username: String },
    /// The note is a renote and the user has not enabled renote relay.
    RenoteNotEnabled,
    /// The note carries the user's configured skip hashtag.
    SkipHashtag,
    /// No credential configuration matches the note's visibility.
    ApiConfNotFound,
}

impl Rejection {
    /// The outcome code reported for this rejection.
    #[must_use]
    pub const fn outcome(&self) -> OutcomeCode {
        match self {
            Self::HostMissing => OutcomeCode::HostNotFound,
            Self::MalformedBody
            | Self::MentionsPresent
            | Self::ReplyToOtherUser
            | Self::DirectMessage
            | Self::AlreadyPosted => OutcomeCode::InvalidRequest,
            Self::NotNote => OutcomeCode::NotNote,
            Self::UserNotFound => OutcomeCode::UserNotFound,
            Self::InvalidSecret { .. } => OutcomeCode::InvalidSecret,
            Self::RenoteNotEnabled => OutcomeCode::RenoteNotEnabled,
            Self::SkipHashtag => OutcomeCode::Nocp,
            Self::ApiConfNotFound => OutcomeCode::TwitterApiConfNotFound,
        }
    }
}

/// Evaluates the gate chain for one request.
pub struct PolicyEvaluator<'a> {
    cache: &'a dyn Cache,
    profiles: &'a ProfileService,
}

impl<'a> PolicyEvaluator<'a> {
    #[must_use]
    pub fn new(cache: &'a dyn Cache, profiles: &'a ProfileService) -> Self {
        Self { cache, profiles }
    }

    /// Run the chain. The already-posted check runs before any profile
    /// lookup, so replayed deliveries never touch the store.
    pub async fn evaluate(&self, request: &WebhookRequest) -> Result<Approval, Rejection> {
        let host = request.host.clone().ok_or(Rejection::HostMissing)?;

        let payload: WebhookPayload =
            serde_json::from_str(&request.body).map_err(|_| Rejection::MalformedBody)?;

        if payload.event_type != "note" {
            return Err(Rejection::NotNote);
        }

        let note = payload.body.note.ok_or(Rejection::MalformedBody)?;

        if !note.mentions.is_empty() {
            debug!(note_id = %note.id, "mentions present, skipping");
            return Err(Rejection::MentionsPresent);
        }

        if let Some(reply) = &note.reply {
            if reply.user_id != note.user_id {
                debug!(note_id = %note.id, "reply to another user, skipping");
                return Err(Rejection::ReplyToOtherUser);
            }
        }

        if note.visibility == Visibility::Specified {
            debug!(note_id = %note.id, "specified visibility, skipping");
            return Err(Rejection::DirectMessage);
        }

        let posted_key = format!("{}@{}", note.id, host);
        if self.cache.get(NS_POSTED_NOTE, &posted_key).await.is_some() {
            debug!(note_id = %note.id, "already posted, skipping");
            return Err(Rejection::AlreadyPosted);
        }

        let user_key = format!("{}@{}", note.user_id, host);
        let profile = match self.profiles.resolve(&user_key).await {
            Ok(Some(profile)) => profile,
            Ok(None) => return Err(Rejection::UserNotFound),
            Err(err) => {
                warn!(user_key, %err, "profile resolution failed");
                return Err(Rejection::UserNotFound);
            }
        };

        if request.secret.as_deref() != Some(profile.secret.as_str()) {
            warn!(user_key, "webhook secret mismatch");
            return Err(Rejection::InvalidSecret {
                username: note.user.username.clone(),
            });
        }

        if note.renote.is_some() && !profile.confs.enable_renote {
            return Err(Rejection::RenoteNotEnabled);
        }

        if profile.confs.has_skip_hashtag(&note.tags) {
            return Err(Rejection::SkipHashtag);
        }

        let conf = profile
            .api_conf_for(note.visibility)
            .cloned()
            .ok_or(Rejection::ApiConfNotFound)?;

        Ok(Approval {
            host,
            note,
            profile,
            conf,
        })
    }
}
