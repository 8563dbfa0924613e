//! # Domain Models
//!
//! These structs represent the core entities of pressure-bot.
//! Identifiers are the platform's 64-bit snowflakes, wrapped so a channel
//! can never be passed where a user is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AppError, Result};

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

snowflake!(
    /// An isolated chat space with its own configuration (a "guild")
    CommunityId
);
snowflake!(UserId);
snowflake!(ChannelId);
snowflake!(RoleId);

/// Per-community moderation settings, supplied by a `ConfigStore`.
///
/// Treated as an immutable snapshot for the duration of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunityConfig {
    pub moderation_channel: Option<ChannelId>,
    pub raid_containment_channel: Option<ChannelId>,
    pub silence_containment_channel: Option<ChannelId>,
    /// Moderation actions are mirrored here when set
    pub log_channel: Option<ChannelId>,

    pub member_role: Option<RoleId>,
    pub silence_role: Option<RoleId>,
    pub new_role: Option<RoleId>,
    pub role_setup_complete: bool,

    /// Ceiling; crossing it triggers a moderation action
    pub max_pressure: f64,
    /// Flat cost per message
    pub base_pressure: f64,
    /// Cost per attachment or embed
    pub media_pressure: f64,
    /// Cost per displayed character
    pub char_pressure: f64,
    /// Cost per newline in the raw content
    pub line_pressure: f64,
    /// Cost per mentioned user or role
    pub mention_pressure: f64,
    /// Extra cost when content repeats the previous non-empty message
    pub repeat_pressure: f64,
    /// Pressure removed per elapsed second
    pub pressure_dropoff: f64,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            moderation_channel: None,
            raid_containment_channel: None,
            silence_containment_channel: None,
            log_channel: None,
            member_role: None,
            silence_role: None,
            new_role: None,
            role_setup_complete: false,
            max_pressure: 60.0,
            base_pressure: 10.0,
            media_pressure: 8.3,
            char_pressure: 0.00625,
            line_pressure: 0.714,
            mention_pressure: 2.5,
            repeat_pressure: 10.0,
            pressure_dropoff: 2.0,
        }
    }
}

impl CommunityConfig {
    /// Rejects records that would make the pressure model meaningless:
    /// negative or non-finite coefficients, or a ceiling that every
    /// message would breach.
    pub fn validate(&self) -> Result<()> {
        let coefficients = [
            ("max_pressure", self.max_pressure),
            ("base_pressure", self.base_pressure),
            ("media_pressure", self.media_pressure),
            ("char_pressure", self.char_pressure),
            ("line_pressure", self.line_pressure),
            ("mention_pressure", self.mention_pressure),
            ("repeat_pressure", self.repeat_pressure),
            ("pressure_dropoff", self.pressure_dropoff),
        ];

        for (name, value) in coefficients {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::InvalidConfiguration(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        if self.max_pressure <= 0.0 {
            return Err(AppError::InvalidConfiguration(
                "max_pressure must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// A message delivered by the event source, read-only to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub community_id: CommunityId,
    pub author_id: UserId,
    pub channel_id: ChannelId,
    pub is_from_bot: bool,
    /// Webhook and platform-generated messages
    pub is_system_generated: bool,
    pub attachment_count: u32,
    pub embed_count: u32,
    pub mentioned_user_count: u32,
    pub mentioned_role_count: u32,
    /// Rendering used for length and repeat comparisons
    pub displayed_content: String,
    /// Used to count newlines
    pub raw_content: String,
}

impl MessageEvent {
    /// Bot-authored and system-generated messages are never scored.
    pub fn is_eligible(&self) -> bool {
        !self.is_from_bot && !self.is_system_generated
    }
}

/// Wire shape of a message as produced by an event source.
///
/// Identifiers are optional here so a structurally broken record can be
/// rejected as `MalformedEvent` instead of failing deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IncomingMessage {
    pub community_id: Option<u64>,
    pub author_id: Option<u64>,
    pub channel_id: Option<u64>,
    pub is_from_bot: bool,
    pub is_system_generated: bool,
    pub attachment_count: u32,
    pub embed_count: u32,
    pub mentioned_user_count: u32,
    pub mentioned_role_count: u32,
    pub displayed_content: String,
    pub raw_content: Option<String>,
}

impl TryFrom<IncomingMessage> for MessageEvent {
    type Error = AppError;

    fn try_from(msg: IncomingMessage) -> Result<Self> {
        fn required(field: &str, id: Option<u64>) -> Result<u64> {
            match id {
                Some(0) | None => Err(AppError::MalformedEvent(format!("missing {field}"))),
                Some(id) => Ok(id),
            }
        }

        let community_id = required("community_id", msg.community_id)?;
        let author_id = required("author_id", msg.author_id)?;
        let channel_id = required("channel_id", msg.channel_id)?;

        // Without a separate raw rendering the displayed text is the best we have.
        let raw_content = msg
            .raw_content
            .unwrap_or_else(|| msg.displayed_content.clone());

        Ok(MessageEvent {
            community_id: community_id.into(),
            author_id: author_id.into(),
            channel_id: channel_id.into(),
            is_from_bot: msg.is_from_bot,
            is_system_generated: msg.is_system_generated,
            attachment_count: msg.attachment_count,
            embed_count: msg.embed_count,
            mentioned_user_count: msg.mentioned_user_count,
            mentioned_role_count: msg.mentioned_role_count,
            displayed_content: msg.displayed_content,
            raw_content,
        })
    }
}

/// Ledger key: pressure is tracked per user, per community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PressureKey {
    pub community: CommunityId,
    pub user: UserId,
}

impl PressureKey {
    pub fn new(community: CommunityId, user: UserId) -> Self {
        Self { community, user }
    }
}

impl fmt::Display for PressureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.community, self.user)
    }
}

/// Accumulated score for one `PressureKey`. Owned by the ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPressureState {
    /// Always >= 0
    pub pressure: f64,
    /// 0 before the first processed message
    pub last_message_timestamp_millis: i64,
    pub last_non_empty_content: Option<String>,
    /// Dropoff rate in force at the last update, used to judge idle states
    pub pressure_dropoff: f64,
}

impl UserPressureState {
    /// Pressure this state would hold at `now` if no message arrived first.
    pub fn decayed_pressure(&self, now: i64) -> f64 {
        let elapsed_millis = now.saturating_sub(self.last_message_timestamp_millis).max(0);
        (self.pressure - self.pressure_dropoff * elapsed_millis as f64 / 1000.0).max(0.0)
    }
}

/// Result of one ledger update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureOutcome {
    /// Pressure after scoring; on breach this is the value before the reset
    pub pressure: f64,
    pub breached: bool,
}

/// What an `ActionDispatcher` receives when a user breaches the ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreachNotice {
    pub community_id: CommunityId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    /// Final pressure before the reset
    pub pressure: f64,
    pub log_channel: Option<ChannelId>,
}
