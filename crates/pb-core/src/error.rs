//! # AppError
//!
//! Centralized error handling for the pressure-bot ecosystem.
//! Every per-event failure maps to one of these variants; none of them is
//! fatal to the process.

use thiserror::Error;

use crate::models::CommunityId;

/// The primary error type for all pb-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration lookup failed or the community has no record
    #[error("configuration unavailable for community {0}: {1}")]
    ConfigurationUnavailable(CommunityId, String),

    /// A configuration record that breaks the pressure model invariants
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Structurally invalid event (e.g., missing community or author)
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// The moderation action could not be handed to its delivery channel
    #[error("dispatch failure: {0}")]
    DispatchFailure(String),

    /// Infrastructure failure (e.g., DB down, queue closed)
    #[error("internal service error: {0}")]
    Internal(String),
}

/// A specialized Result type for pressure-bot logic.
pub type Result<T> = std::result::Result<T, AppError>;
