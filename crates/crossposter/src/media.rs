//! Attachment selection.
//!
//! Picks which of a note's files ride along on the tweet: at most four,
//! at most one video, sensitive files excluded when the user says so.
//! Original file order is preserved.

use crate::profile::UserConfs;
use crate::tags::{Tag, TagSet};
use crate::types::DriveFile;

/// Twitter's per-tweet media cap.
pub const MEDIA_LIMIT: usize = 4;

/// Outcome of selecting attachments for one note.
#[derive(Debug, Clone)]
pub struct MediaSelection {
    /// Files to upload, in original note order.
    pub files: Vec<DriveFile>,

    /// Whether eligible files were left behind once the cap was hit.
    pub overflow: bool,
}

impl MediaSelection {
    /// Fold the selection's findings into the request's tag set.
    pub fn record_tags(&self, tags: &mut TagSet) {
        if self.overflow {
            tags.insert(Tag::TooManyImages);
        }
    }
}

/// Choose up to [`MEDIA_LIMIT`] embeddable attachments.
///
/// Excluded (sensitive, when configured) and non-embeddable files are
/// filtered out first. A second video is skipped rather than selected, and
/// skipping does not count against the cap.
#[must_use]
pub fn select_media(files: &[DriveFile], confs: &UserConfs) -> MediaSelection {
    let mut selected: Vec<DriveFile> = Vec::new();
    let mut overflow = false;
    let mut has_video = false;

    for file in files
        .iter()
        .filter(|f| confs.file_includable(f) && f.is_embeddable())
    {
        if selected.len() >= MEDIA_LIMIT {
            overflow = true;
            break;
        }

        if file.is_video() {
            if has_video {
                continue;
            }
            has_video = true;
        }

        selected.push(file.clone());
    }

    MediaSelection {
        files: selected,
        overflow,
    }
}
