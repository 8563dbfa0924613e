//! # pressure-bot Binary
//!
//! The entry point that assembles the application based on compile-time features.
//!
//! Message events arrive as JSON lines on stdin and are routed to one of
//! `intake.shards` workers by community. Breaches are handed to the dispatch
//! queue.

use pb_config::{LedgerSettings, LogFormat, LogSettings, Settings};
use pb_core::{AppError, CommunityId, IncomingMessage, Intake, PressureLedger};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

// Feature-gated imports: This is the "Compiled-to-Order" magic
#[cfg(feature = "db-sqlite")]
use pb_db_sqlite::SqliteConfigStore;

#[cfg(feature = "dispatch-queue")]
use pb_dispatch_queue::{LogSink, QueuedDispatcher};

#[cfg(not(feature = "db-sqlite"))]
compile_error!("a configuration store plugin is required; enable the `db-sqlite` feature");

#[cfg(not(feature = "dispatch-queue"))]
compile_error!("an action dispatcher plugin is required; enable the `dispatch-queue` feature");

/// Events buffered per shard before the reader waits.
const SHARD_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_tracing(&settings.log);

    // 1. Initialize Configuration Store
    info!(url = %settings.database.url, "Connecting to the database...");
    let store = Arc::new(
        SqliteConfigStore::new(&settings.database.url, settings.database.max_connections).await?,
    );
    for &community in &settings.database.seed_communities {
        store.ensure_community(CommunityId(community)).await?;
        info!(%community, "Registered community");
    }

    // 2. Initialize Action Dispatcher
    let dispatcher = Arc::new(QueuedDispatcher::spawn(
        Arc::new(LogSink),
        settings.dispatch.queue_capacity,
    ));

    // 3. Wire the engine
    let ledger = Arc::new(PressureLedger::new());
    let intake = Arc::new(Intake::new(ledger.clone(), store, dispatcher.clone()));
    let sweeper = spawn_sweeper(ledger, &settings.ledger);

    // 4. Spawn shards
    let shard_count = settings.intake.shards;
    info!(shards = shard_count, "Spawning shards...");
    let mut senders = Vec::with_capacity(shard_count);
    let mut shards = Vec::with_capacity(shard_count);
    for shard in 0..shard_count {
        let (tx, rx) = mpsc::channel(SHARD_BUFFER);
        senders.push(tx);
        shards.push(tokio::spawn(run_shard(shard, intake.clone(), rx)));
    }

    // 5. Feed events until stdin closes
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let msg = match serde_json::from_str::<IncomingMessage>(&line) {
            Ok(msg) => msg,
            Err(err) => {
                let err = AppError::MalformedEvent(err.to_string());
                warn!(error = %err, "Skipping unreadable event");
                continue;
            }
        };
        let shard = shard_for(msg.community_id, shard_count);
        if senders[shard].send(msg).await.is_err() {
            warn!(shard, "Shard stopped, event dropped");
        }
    }

    info!("Event stream closed, shutting down");
    drop(senders);
    for shard in shards {
        if let Err(err) = shard.await {
            warn!(error = %err, "Shard terminated abnormally");
        }
    }
    sweeper.abort();
    let delivered = dispatcher.shutdown().await;
    info!(delivered, "Moderation actions delivered");

    Ok(())
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match log.format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}

/// Each community belongs to exactly one shard, so a user's messages are
/// scored in the order they were read. Events without a community go to
/// shard 0, where the intake rejects them.
fn shard_for(community: Option<u64>, shard_count: usize) -> usize {
    let community = community.unwrap_or(0);
    (community % shard_count as u64) as usize
}

/// One shard processes its events in order; different shards run in parallel.
async fn run_shard(shard: usize, intake: Arc<Intake>, mut events: mpsc::Receiver<IncomingMessage>) {
    info!(shard, "Shard loaded");
    while let Some(msg) = events.recv().await {
        // Failures are logged by the intake; the shard keeps going.
        if let Err(err) = intake.handle_incoming(msg).await {
            debug!(shard, error = %err, "Event dropped");
        }
    }
    info!(shard, "Shard finished");
}

fn spawn_sweeper(ledger: Arc<PressureLedger>, settings: &LedgerSettings) -> JoinHandle<()> {
    let ttl_millis = i64::try_from(settings.idle_ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
    let mut interval = tokio::time::interval(Duration::from_secs(settings.sweep_interval_secs));

    tokio::spawn(async move {
        loop {
            interval.tick().await;
            let evicted = ledger.sweep_idle(chrono::Utc::now().timestamp_millis(), ttl_millis);
            debug!(evicted, tracked = ledger.len(), "Ledger sweep");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_community_always_lands_on_the_same_shard() {
        assert_eq!(shard_for(Some(7), 4), 3);
        assert_eq!(shard_for(Some(7), 4), shard_for(Some(11), 4));
        assert_eq!(shard_for(Some(u64::MAX), 1), 0);
        assert_eq!(shard_for(None, 3), 0);
    }
}
