//! Note classification.
//!
//! Inspects a note (and its renote target) and derives the set of tags that
//! describe how the tweet will differ from the original. Tags are internal
//! labels, not hashtags; they render as a parenthesized, comma-joined,
//! lexicographically sorted annotation. The set is derived fresh for every
//! request and never persisted.

use std::collections::BTreeSet;

use crate::length::{tweet_length, TWEET_LIMIT};
use crate::profile::UserConfs;
use crate::types::Note;

/// Why a relayed tweet differs from its source note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tag {
    /// Content warning on the note.
    Cw,
    /// Body exceeds the tweet budget.
    TooLong,
    /// Poll attached; polls don't cross over.
    Poll,
    /// The note is a renote of another note.
    Renote,
    /// Some attachment was excluded as sensitive.
    SensitiveMedia,
    /// More than one video; Twitter allows one per tweet.
    MultiVideo,
    /// Some attachment is neither image nor video.
    UnsupportedAttachment,
    /// More files than Twitter embeds, so some were dropped.
    TooManyImages,
    /// Some media upload failed; posted without it.
    UploadFailed,
}

impl Tag {
    /// Human-readable label used in the tweet annotation.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Cw => "CW",
            Self::TooManyImages => "dropped images",
            Self::UnsupportedAttachment => "non-embeddable attachment",
            Self::MultiVideo => "multiple videos",
            Self::TooLong => "long post",
            Self::Poll => "poll",
            Self::Renote => "renote",
            Self::SensitiveMedia => "sensitive media",
            Self::UploadFailed => "upload failed",
        }
    }
}

/// A deduplicated tag set with deterministic render order.
pub type TagSet = BTreeSet<Tag>;

/// Result of classifying a note: the effective tweet body plus the tags the
/// note earned on the way.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Effective body after CW and renote rewriting. Not yet trimmed; the
    /// composer owns whitespace.
    pub body: String,

    pub tags: TagSet,
}

/// Derive the effective body and tag set for a note.
///
/// Every trigger adds its tag independently; conditions are not mutually
/// exclusive. `request_host` fills in the author host for renotes of local
/// users.
#[must_use]
pub fn classify(note: &Note, confs: &UserConfs, request_host: &str) -> Classification {
    let target = note.renote.as_deref().unwrap_or(note);
    let mut body = target.text.clone().unwrap_or_default();
    let mut tags = TagSet::new();

    if let Some(cw) = &target.cw {
        tags.insert(Tag::Cw);

        if confs.cw_title_only {
            body = cw.clone();
        } else {
            body = format!("{cw}\n\n{body}");
        }
    }

    if note.renote.is_some() {
        let author_host = target.user.host.as_deref().unwrap_or(request_host);
        body = format!("RENOTE @{}@{}: {}", target.user.username, author_host, body);

        tags.insert(Tag::Renote);
    }

    if tweet_length(&body) > TWEET_LIMIT {
        tags.insert(Tag::TooLong);
    }

    if note.poll.is_some() {
        tags.insert(Tag::Poll);
    }

    if note.files.iter().any(|f| !confs.file_includable(f)) {
        tags.insert(Tag::SensitiveMedia);
    }

    if note.files.iter().filter(|f| f.is_video()).count() > 1 {
        tags.insert(Tag::MultiVideo);
    }

    if note.files.iter().any(|f| !f.is_embeddable()) {
        tags.insert(Tag::UnsupportedAttachment);
    }

    Classification { body, tags }
}

/// Render a tag set as the tweet annotation chunk, e.g. `(poll, renote)`.
/// Labels are sorted lexicographically so the render is deterministic.
#[must_use]
pub fn render_tags(tags: &TagSet) -> String {
    let mut labels: Vec<&str> = tags.iter().map(|t| t.label()).collect();
    labels.sort_unstable();
    format!("({})", labels.join(", "))
}
