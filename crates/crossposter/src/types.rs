//! Webhook payload and note types.
//!
//! These mirror the subset of Misskey's note shape the relay actually reads.
//! Unknown fields are tolerated so instance upgrades don't break parsing.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Inbound webhook
// ─────────────────────────────────────────────────────────────────────────────

/// An inbound webhook delivery, already lifted out of the transport.
///
/// The HTTP layer (whatever it is) hands the relay the two headers it cares
/// about plus the raw JSON body. The response is always 200; outcomes travel
/// in [`WebhookResponse::status`].
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    /// Value of the `x-misskey-host` header, if present.
    pub host: Option<String>,

    /// Value of the `x-misskey-hook-secret` header, if present.
    pub secret: Option<String>,

    /// Raw JSON body.
    pub body: String,
}

/// The always-200 response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookResponse {
    /// Outcome of the relay attempt.
    pub status: OutcomeCode,
}

impl WebhookResponse {
    #[must_use]
    pub const fn new(status: OutcomeCode) -> Self {
        Self { status }
    }
}

/// Terminal outcome of one webhook delivery.
///
/// Exhaustive and case-sensitive; these strings are the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeCode {
    HostNotFound,
    InvalidRequest,
    NotNote,
    UserNotFound,
    InvalidSecret,
    RenoteNotEnabled,
    Nocp,
    TwitterApiConfNotFound,
    SkipLinkRequired,
    DuplicateTweet,
    TwitterApiError,
    Ok,
}

impl OutcomeCode {
    /// The wire form of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HostNotFound => "HOST_NOT_FOUND",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::NotNote => "NOT_NOTE",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::InvalidSecret => "INVALID_SECRET",
            Self::RenoteNotEnabled => "RENOTE_NOT_ENABLED",
            Self::Nocp => "NOCP",
            Self::TwitterApiConfNotFound => "TWITTER_API_CONF_NOT_FOUND",
            Self::SkipLinkRequired => "SKIP_LINK_REQUIRED",
            Self::DuplicateTweet => "DUPLICATE_TWEET",
            Self::TwitterApiError => "TWITTER_API_ERROR",
            Self::Ok => "OK",
        }
    }
}

impl std::fmt::Display for OutcomeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Webhook payload: `{ "type": "note", "body": { "note": ... } }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Event type; anything other than `"note"` is rejected.
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub body: WebhookBody,
}

/// Body of a webhook payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub note: Option<Note>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Notes
// ─────────────────────────────────────────────────────────────────────────────

/// Note visibility levels, in Misskey's wire spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Home,
    Followers,
    /// Direct message; never relayed.
    Specified,
}

/// A Misskey note as delivered by the outgoing webhook. Immutable once
/// received.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,

    /// Author's user id.
    pub user_id: String,

    /// Author stub.
    pub user: NoteUser,

    pub visibility: Visibility,

    #[serde(default)]
    pub text: Option<String>,

    /// Content warning text shown behind a click-to-reveal gate.
    #[serde(default)]
    pub cw: Option<String>,

    #[serde(default)]
    pub poll: Option<Poll>,

    #[serde(default)]
    pub files: Vec<DriveFile>,

    /// The shared note, when this note is a renote.
    #[serde(default)]
    pub renote: Option<Box<Note>>,

    /// The note this one replies to.
    #[serde(default)]
    pub reply: Option<Box<Note>>,

    /// Hashtags on the note (no leading `#`).
    #[serde(default)]
    pub tags: Vec<String>,

    /// Mentioned user ids. A mention implies a targeted conversation, not a
    /// broadcast, so any mention rejects the request.
    #[serde(default)]
    pub mentions: Vec<String>,
}

/// The slice of the author object the relay reads.
#[derive(Debug, Clone, Deserialize)]
pub struct NoteUser {
    #[serde(default)]
    pub id: Option<String>,

    pub username: String,

    /// `None` for users local to the originating instance.
    #[serde(default)]
    pub host: Option<String>,
}

/// Poll attached to a note. Only its presence matters to the relay.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    #[serde(default)]
    pub choices: Vec<PollChoice>,

    #[serde(default)]
    pub multiple: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollChoice {
    pub text: String,

    #[serde(default)]
    pub votes: u64,
}

/// An attachment on a note. Used only for classification and upload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub url: String,

    /// MIME type.
    #[serde(rename = "type")]
    pub mime_type: String,

    #[serde(default)]
    pub is_sensitive: bool,
}

impl DriveFile {
    /// Whether Twitter can embed this file at all.
    #[must_use]
    pub fn is_embeddable(&self) -> bool {
        self.is_image() || self.is_video()
    }

    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    #[must_use]
    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_codes_serialize_to_wire_form() {
        for (code, wire) in [
            (OutcomeCode::HostNotFound, "\"HOST_NOT_FOUND\""),
            (OutcomeCode::Nocp, "\"NOCP\""),
            (OutcomeCode::TwitterApiConfNotFound, "\"TWITTER_API_CONF_NOT_FOUND\""),
            (OutcomeCode::Ok, "\"OK\""),
        ] {
            assert_eq!(serde_json::to_string(&code).unwrap(), wire);
            assert_eq!(format!("\"{code}\""), wire);
        }
    }

    #[test]
    fn note_parses_with_unknown_fields() {
        let note: Note = serde_json::from_str(
            r#"{
                "id": "9abc",
                "userId": "u1",
                "user": { "id": "u1", "username": "alice", "host": null },
                "visibility": "public",
                "text": "hello",
                "localOnly": false,
                "reactionAcceptance": null,
                "files": [
                    { "url": "https://files.example/a.png", "type": "image/png", "isSensitive": false, "size": 123 }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(note.id, "9abc");
        assert_eq!(note.user.username, "alice");
        assert!(note.files[0].is_image());
        assert!(note.renote.is_none());
        assert!(note.mentions.is_empty());
    }

    #[test]
    fn mime_predicates() {
        let video = DriveFile {
            url: "https://files.example/v.mp4".into(),
            mime_type: "video/mp4".into(),
            is_sensitive: false,
        };
        let doc = DriveFile {
            url: "https://files.example/d.pdf".into(),
            mime_type: "application/pdf".into(),
            is_sensitive: false,
        };

        assert!(video.is_video() && video.is_embeddable());
        assert!(!doc.is_embeddable());
    }
}
