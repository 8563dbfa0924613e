//! # Scoring
//!
//! Translates a message's features into pressure. Every coefficient comes
//! from `CommunityConfig`, so communities tune the model without code changes.

use crate::models::{CommunityConfig, MessageEvent};

/// Markdown markers that never count as message content for repeat detection.
const FORMATTING_MARKERS: &[char] = &['*', '_', '~', '|', '`'];

/// Per-feature pressure for one message, excluding the repeat bonus.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PressureBreakdown {
    pub base: f64,
    pub attachments: f64,
    pub embeds: f64,
    pub chars: f64,
    pub lines: f64,
    pub user_mentions: f64,
    pub role_mentions: f64,
}

impl PressureBreakdown {
    pub fn total(&self) -> f64 {
        self.base
            + self.attachments
            + self.embeds
            + self.chars
            + self.lines
            + self.user_mentions
            + self.role_mentions
    }

    /// Labelled components, in the order they are applied.
    pub fn components(&self) -> [(&'static str, f64); 7] {
        [
            ("base", self.base),
            ("attachments", self.attachments),
            ("embeds", self.embeds),
            ("chars", self.chars),
            ("lines", self.lines),
            ("user_mentions", self.user_mentions),
            ("role_mentions", self.role_mentions),
        ]
    }
}

/// Linear per-feature cost of a message. Pure and O(content length).
pub fn score(config: &CommunityConfig, event: &MessageEvent) -> PressureBreakdown {
    let newlines = event.raw_content.chars().filter(|&c| c == '\n').count();

    PressureBreakdown {
        base: config.base_pressure,
        attachments: config.media_pressure * f64::from(event.attachment_count),
        embeds: config.media_pressure * f64::from(event.embed_count),
        chars: config.char_pressure * event.displayed_content.chars().count() as f64,
        lines: config.line_pressure * newlines as f64,
        user_mentions: config.mention_pressure * f64::from(event.mentioned_user_count),
        role_mentions: config.mention_pressure * f64::from(event.mentioned_role_count),
    }
}

/// Displayed content as a reader would see it: surrounding whitespace and
/// formatting markers removed.
pub fn strip_formatting(displayed: &str) -> &str {
    displayed.trim_matches(|c: char| c.is_whitespace() || FORMATTING_MARKERS.contains(&c))
}

/// Applies repeat detection against `last_non_empty` and returns the bonus.
///
/// Only consecutive repeats pay: any non-empty message becomes the new
/// baseline. Empty content leaves the baseline untouched.
pub fn repeat_bonus(
    config: &CommunityConfig,
    last_non_empty: &mut Option<String>,
    displayed: &str,
) -> f64 {
    let stripped = strip_formatting(displayed);
    if stripped.is_empty() {
        return 0.0;
    }

    let bonus = if last_non_empty.as_deref() == Some(stripped) {
        config.repeat_pressure
    } else {
        0.0
    };
    *last_non_empty = Some(stripped.to_string());
    bonus
}
