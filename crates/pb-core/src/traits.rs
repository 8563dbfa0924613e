//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use async_trait::async_trait;

use crate::models::{BreachNotice, CommunityConfig, CommunityId};

/// Read access to per-community configuration.
///
/// Implementations are expected to cache; intake calls this once per
/// eligible message.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Returns `Ok(None)` when the community has no configuration record.
    async fn get_config(&self, community: CommunityId) -> anyhow::Result<Option<CommunityConfig>>;
}

/// Receives breach notices from the core.
///
/// Fire-and-forget: implementations must not block the caller, and nothing
/// they do can undo the pressure reset that preceded the call.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait ActionDispatcher: Send + Sync {
    fn notify_breach(&self, notice: BreachNotice);
}

/// Final delivery of a moderation action (posting a warning, muting, ...).
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ModerationSink: Send + Sync {
    async fn deliver(&self, notice: &BreachNotice) -> anyhow::Result<()>;
}
