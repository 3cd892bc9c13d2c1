//! Error types.
//!
//! Policy rejections are not errors; they are named outcomes and live in
//! [`crate::policy`]. The types here cover faults in the collaborators: the
//! profile store, the posting platform, and the notification instance. The
//! handler maps every one of them to an outcome code; nothing here escapes
//! as a panic or a non-200 response.

use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Profile resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Errors while resolving a user profile.
#[derive(Error, Debug)]
pub enum ProfileError {
    /// HTTP request to the object store failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Profile document failed to parse
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base profile file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Object store returned a non-success status
    #[error("object store error {status}: {message}")]
    Store { status: u16, message: String },

    /// Stored profile names a different user than the one requested
    #[error("profile identity mismatch: expected {expected}, got {actual}")]
    IdentityMismatch { expected: String, actual: String },

    /// The base profile named by the override does not exist
    #[error("base profile not found: {0}")]
    BaseProfileNotFound(String),
}

/// Result type for profile operations.
pub type ProfileResult<T> = Result<T, ProfileError>;

// ─────────────────────────────────────────────────────────────────────────────
// Posting platform
// ─────────────────────────────────────────────────────────────────────────────

/// How a failed post attempt should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostFailure {
    /// Platform refused a duplicate; benign, never retried.
    Duplicate,
    /// Credentials rejected; the cached profile must be evicted.
    Auth,
    /// Platform momentarily unavailable; retried once.
    Transient,
    /// Everything else; surfaced with the upstream detail.
    Other,
}

/// The v2 API's detail string for duplicate content. Matching it is a
/// fragile contract with the upstream API; if the wording changes,
/// duplicates start surfacing as plain API errors.
pub const DUPLICATE_CONTENT_DETAIL: &str =
    "You are not allowed to create a Tweet with duplicate content.";

/// v1.1 error code for a duplicate status.
pub const DUPLICATE_STATUS_CODE: i32 = 187;

/// Twitter-specific errors.
#[derive(Error, Debug)]
pub enum TwitterError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response failed to parse
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// OAuth signature generation failed
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// Media could not be prepared for upload
    #[error("media error: {0}")]
    Media(String),

    /// Twitter API returned an error
    #[error("Twitter API error {status}: {message}")]
    Api {
        status: u16,
        message: String,
        /// v1.1 error code, e.g. 187 for a duplicate status.
        error_code: Option<i32>,
        /// v2 problem detail.
        detail: Option<String>,
    },
}

impl TwitterError {
    /// Classify a post failure for the handler's recovery paths.
    #[must_use]
    pub fn classify(&self) -> PostFailure {
        match self {
            Self::Api {
                error_code, detail, ..
            } if *error_code == Some(DUPLICATE_STATUS_CODE)
                || detail.as_deref() == Some(DUPLICATE_CONTENT_DETAIL) =>
            {
                PostFailure::Duplicate
            }
            Self::Api { status: 401, .. } | Self::Api { status: 403, .. } => PostFailure::Auth,
            Self::Api { status: 503, .. } => PostFailure::Transient,
            _ => PostFailure::Other,
        }
    }

    /// Whether a single immediate retry is worthwhile.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.classify() == PostFailure::Transient
    }

    /// The most specific upstream message available, for notifications.
    #[must_use]
    pub fn upstream_detail(&self) -> String {
        match self {
            Self::Api {
                detail: Some(detail),
                ..
            } => detail.clone(),
            Self::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type for Twitter operations.
pub type TwitterResult<T> = Result<T, TwitterError>;

// ─────────────────────────────────────────────────────────────────────────────
// Misskey notifications
// ─────────────────────────────────────────────────────────────────────────────

/// Errors talking to the Misskey instance.
#[derive(Error, Debug)]
pub enum MisskeyError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response failed to parse
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Misskey API returned an error
    #[error("Misskey API error {status}: {message}")]
    Api { status: u16, message: String },
}

/// Result type for Misskey operations.
pub type MisskeyResult<T> = Result<T, MisskeyError>;

// ─────────────────────────────────────────────────────────────────────────────
// Handler setup
// ─────────────────────────────────────────────────────────────────────────────

/// Errors wiring up the relay itself.
#[derive(Error, Debug)]
pub enum RelayError {
    /// An HTTP client failed to build
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Misskey(#[from] MisskeyError),
}

/// Result type for relay setup.
pub type RelayResult<T> = Result<T, RelayError>;
