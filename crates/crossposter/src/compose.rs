//! Tweet composition and truncation.
//!
//! A tweet is assembled from up to three chunks: the body, an optional tag
//! annotation, and an optional "read more" link back to the note. Chunks are
//! joined with a blank line. When the composed text blows the 280-unit
//! budget, the body (and only the body) is truncated deterministically: the
//! fixed costs of the other chunks are deducted up front and the body is
//! walked one character at a time until the remaining budget runs out.

use crate::length::{char_weight, tweet_length, TWEET_LIMIT};
use crate::tags::{render_tags, Tag, TagSet};

/// Separator between chunks.
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Appended to a truncated body.
const ELLIPSIS: char = '…';

/// Weight of the two separators flanking the annotation and link chunks.
const SEPARATOR_COST: usize = 4;

/// Where the "read more" link points.
#[derive(Debug, Clone, Copy)]
pub struct LinkTarget<'a> {
    pub host: &'a str,
    pub note_id: &'a str,
}

/// The ordered chunk sequence of a tweet.
#[derive(Debug, Clone)]
struct Chunks {
    body: String,
    annotation: Option<String>,
    link: Option<String>,
}

impl Chunks {
    fn join(&self) -> String {
        let mut parts = vec![self.body.as_str()];
        if let Some(annotation) = &self.annotation {
            parts.push(annotation);
        }
        if let Some(link) = &self.link {
            parts.push(link);
        }
        parts.join(CHUNK_SEPARATOR)
    }
}

/// Assembles tweet text within the platform budget.
///
/// `short_link_width` is the width Twitter bills for any URL after t.co
/// wrapping. It is carried as configuration; nothing here validates it
/// against the platform's current behavior.
#[derive(Debug, Clone)]
pub struct Composer {
    read_more_label: String,
    short_link_width: usize,
}

impl Composer {
    #[must_use]
    pub fn new(read_more_label: impl Into<String>, short_link_width: usize) -> Self {
        Self {
            read_more_label: read_more_label.into(),
            short_link_width,
        }
    }

    /// Compose the final tweet text.
    ///
    /// `body` must already be trimmed of leading and trailing whitespace.
    /// The annotation chunk is present iff `tags` is non-empty and the user
    /// enabled annotations; the link chunk is present iff `link` is given.
    ///
    /// On overflow the [`Tag::TooLong`] tag is added to `tags` (visible to
    /// the caller), the annotation is recomputed, and the body is truncated.
    /// The recomputation happens at most once: truncation is trusted to fit
    /// given the deducted fixed costs.
    pub fn compose(
        &self,
        body: &str,
        tags: &mut TagSet,
        annotations_enabled: bool,
        link: Option<LinkTarget<'_>>,
    ) -> String {
        let mut chunks = Chunks {
            body: body.to_owned(),
            annotation: (annotations_enabled && !tags.is_empty()).then(|| render_tags(tags)),
            link: link.map(|target| self.link_chunk(target)),
        };

        let text = chunks.join();
        if tweet_length(&text) <= TWEET_LIMIT {
            return text;
        }

        tags.insert(Tag::TooLong);

        if annotations_enabled {
            chunks.annotation = Some(render_tags(tags));
        }

        let deduction = char_weight(ELLIPSIS)
            + chunks.annotation.as_deref().map_or(0, tweet_length)
            + tweet_length(&self.link_prefix())
            + self.short_link_width
            + SEPARATOR_COST;
        let budget = TWEET_LIMIT.saturating_sub(deduction);

        chunks.body = truncate_to_weight(&chunks.body, budget);
        chunks.join()
    }

    /// The link chunk: `"{label}: https://{host}/notes/{id}"`.
    #[must_use]
    pub fn link_chunk(&self, target: LinkTarget<'_>) -> String {
        format!(
            "{}https://{}/notes/{}",
            self.link_prefix(),
            target.host,
            target.note_id
        )
    }

    fn link_prefix(&self) -> String {
        format!("{}: ", self.read_more_label)
    }
}

/// Accumulate characters while the running weight stays within `budget`,
/// then append the ellipsis. Multi-unit characters are atomic: the walk
/// stops at the first character that would overshoot.
fn truncate_to_weight(body: &str, budget: usize) -> String {
    let mut out = String::new();
    let mut weight = 0;

    for c in body.chars() {
        let w = char_weight(c);
        if weight + w > budget {
            break;
        }
        weight += w;
        out.push(c);
    }

    out.push(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::length::tweet_length;

    fn composer() -> Composer {
        Composer::new("Read more", 23)
    }

    fn link() -> LinkTarget<'static> {
        LinkTarget {
            host: "misskey.test",
            note_id: "9abcdef",
        }
    }

    /// Weight of the composed text as Twitter bills it: the raw URL swapped
    /// for the fixed short-link width.
    fn billed_weight(text: &str, target: LinkTarget<'_>) -> usize {
        let url = format!("https://{}/notes/{}", target.host, target.note_id);
        tweet_length(text) - tweet_length(&url) + 23
    }

    #[test]
    fn under_budget_passes_through_untouched() {
        let mut tags = TagSet::new();
        let text = composer().compose("hello world", &mut tags, true, None);

        assert_eq!(text, "hello world");
        assert!(tags.is_empty());
    }

    #[test]
    fn chunks_join_in_order_with_blank_lines() {
        let mut tags = TagSet::new();
        tags.insert(Tag::Poll);

        let text = composer().compose("hello", &mut tags, true, Some(link()));
        assert_eq!(
            text,
            "hello\n\n(poll)\n\nRead more: https://misskey.test/notes/9abcdef"
        );
    }

    #[test]
    fn annotation_omitted_when_disabled() {
        let mut tags = TagSet::new();
        tags.insert(Tag::Poll);

        let text = composer().compose("hello", &mut tags, false, Some(link()));
        assert_eq!(text, "hello\n\nRead more: https://misskey.test/notes/9abcdef");
    }

    #[test]
    fn truncates_ascii_body_deterministically() {
        let body = "a".repeat(300);
        let mut tags = TagSet::new();
        tags.insert(Tag::TooLong);

        let text = composer().compose(&body, &mut tags, true, Some(link()));
        let chunks: Vec<&str> = text.split(CHUNK_SEPARATOR).collect();

        // deduction: "…" 2 + "(long post)" 11 + "Read more: " 11 + 23 + 4
        let expected_body = format!("{}…", "a".repeat(229));
        assert_eq!(chunks[0], expected_body);
        assert_eq!(chunks[1], "(long post)");
        assert_eq!(
            chunks[2],
            "Read more: https://misskey.test/notes/9abcdef"
        );

        // With the URL billed at the short-link width the result lands
        // exactly on the budget.
        assert_eq!(billed_weight(&text, link()), 280);
    }

    #[test]
    fn overflow_adds_too_long_and_recomputes_annotation() {
        let body = "a".repeat(300);
        let mut tags = TagSet::new();
        tags.insert(Tag::Poll);

        let text = composer().compose(&body, &mut tags, true, Some(link()));

        assert!(tags.contains(&Tag::TooLong));
        let chunks: Vec<&str> = text.split(CHUNK_SEPARATOR).collect();
        assert_eq!(chunks[1], "(long post, poll)");

        // deduction: 2 + 17 + 11 + 23 + 4 = 57, budget 223
        assert_eq!(chunks[0], format!("{}…", "a".repeat(223)));
        assert!(billed_weight(&text, link()) <= 280);
    }

    #[test]
    fn truncation_without_annotations_spends_their_budget_on_body() {
        let body = "a".repeat(300);
        let mut tags = TagSet::new();

        let text = composer().compose(&body, &mut tags, false, Some(link()));
        let chunks: Vec<&str> = text.split(CHUNK_SEPARATOR).collect();

        assert!(tags.contains(&Tag::TooLong));
        // deduction: 2 + 0 + 11 + 23 + 4 = 40, budget 240
        assert_eq!(chunks[0], format!("{}…", "a".repeat(240)));
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn truncation_keeps_wide_characters_atomic() {
        let body = "😀".repeat(100);
        let mut tags = TagSet::new();
        tags.insert(Tag::TooLong);

        let text = composer().compose(&body, &mut tags, true, Some(link()));
        let body_chunk = text.split(CHUNK_SEPARATOR).next().unwrap();

        // budget 229 (see ascii test); 57 emoji weigh 228, a 58th would
        // overshoot, so the walk stops there.
        assert_eq!(body_chunk.chars().count(), 57 + 1);
        assert!(body_chunk.ends_with('…'));
        assert_eq!(tweet_length(body_chunk), 228 + 2);
    }

    #[test]
    fn truncated_tweet_never_exceeds_budget() {
        for repeat in [71, 72, 100, 200] {
            let body = "테스트 ".repeat(repeat);
            let mut tags = TagSet::new();

            let text = composer().compose(body.trim(), &mut tags, true, Some(link()));
            assert!(
                billed_weight(&text, link()) <= 280,
                "overflow at repeat={repeat}"
            );
        }
    }
}
