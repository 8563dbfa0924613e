//! # Event Intake
//!
//! Filters ineligible messages, resolves community configuration and routes
//! the rest through the ledger. Stateless apart from the shared handles, so
//! one `Intake` can serve any number of concurrent event streams.

use std::sync::Arc;
use tracing::{error, trace, warn};

use crate::error::{AppError, Result};
use crate::ledger::PressureLedger;
use crate::models::{
    BreachNotice, CommunityConfig, CommunityId, IncomingMessage, MessageEvent, PressureKey,
    PressureOutcome,
};
use crate::traits::{ActionDispatcher, ConfigStore};

/// What happened to one delivered message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Disposition {
    /// Bot or system message; nothing was touched
    Ignored,
    Scored(PressureOutcome),
}

pub struct Intake {
    ledger: Arc<PressureLedger>,
    store: Arc<dyn ConfigStore>,
    dispatcher: Arc<dyn ActionDispatcher>,
}

impl Intake {
    pub fn new(
        ledger: Arc<PressureLedger>,
        store: Arc<dyn ConfigStore>,
        dispatcher: Arc<dyn ActionDispatcher>,
    ) -> Self {
        Self { ledger, store, dispatcher }
    }

    pub fn ledger(&self) -> &Arc<PressureLedger> {
        &self.ledger
    }

    /// Validates a wire record, then handles it at the current time.
    pub async fn handle_incoming(&self, msg: IncomingMessage) -> Result<Disposition> {
        let event = MessageEvent::try_from(msg).inspect_err(|err| {
            warn!(error = %err, "Dropping malformed event");
        })?;
        self.handle(event).await
    }

    pub async fn handle(&self, event: MessageEvent) -> Result<Disposition> {
        self.handle_at(event, chrono::Utc::now().timestamp_millis()).await
    }

    /// Handles `event` as if it arrived at `now` (milliseconds).
    pub async fn handle_at(&self, event: MessageEvent, now: i64) -> Result<Disposition> {
        if !event.is_eligible() {
            trace!(
                community = %event.community_id,
                user = %event.author_id,
                "Ignoring bot or system message"
            );
            return Ok(Disposition::Ignored);
        }

        let config = self.load_config(event.community_id).await?;

        let key = PressureKey::new(event.community_id, event.author_id);
        let outcome = self.ledger.apply_and_check(key, &config, &event, now);

        if outcome.breached {
            warn!(
                community = %event.community_id,
                user = %event.author_id,
                channel = %event.channel_id,
                pressure = outcome.pressure,
                max_pressure = config.max_pressure,
                "User surpassed max pressure"
            );
            self.dispatcher.notify_breach(BreachNotice {
                community_id: event.community_id,
                channel_id: event.channel_id,
                user_id: event.author_id,
                pressure: outcome.pressure,
                log_channel: config.log_channel,
            });
        }

        Ok(Disposition::Scored(outcome))
    }

    async fn load_config(&self, community: CommunityId) -> Result<CommunityConfig> {
        let config = match self.store.get_config(community).await {
            Ok(Some(config)) => config,
            Ok(None) => {
                error!(%community, "No configuration for community");
                return Err(AppError::ConfigurationUnavailable(
                    community,
                    "no configuration record".to_string(),
                ));
            }
            Err(err) => {
                error!(%community, error = %err, "Failed to load community configuration");
                return Err(AppError::ConfigurationUnavailable(community, err.to_string()));
            }
        };

        config.validate().inspect_err(|err| {
            error!(%community, error = %err, "Rejecting community configuration");
        })?;
        Ok(config)
    }
}
