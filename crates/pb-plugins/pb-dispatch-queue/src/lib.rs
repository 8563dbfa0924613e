//! # pb-dispatch-queue
//!
//! `ActionDispatcher` that never blocks the ledger: breach notices go into a
//! bounded queue and a background worker hands them to a `ModerationSink`.
//! Delivery failures are logged and dropped; the core never hears about them.

use async_trait::async_trait;
use parking_lot::Mutex;
use pb_core::error::AppError;
use pb_core::models::BreachNotice;
use pb_core::traits::{ActionDispatcher, ModerationSink};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct QueuedDispatcher {
    sender: mpsc::Sender<BreachNotice>,
    shutdown: Arc<Notify>,
    worker: Mutex<Option<JoinHandle<usize>>>,
}

impl QueuedDispatcher {
    /// Starts the delivery worker on the current tokio runtime.
    pub fn spawn(sink: Arc<dyn ModerationSink>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        let shutdown = Arc::new(Notify::new());
        let worker = tokio::spawn(run_worker(sink, receiver, Arc::clone(&shutdown)));

        Self {
            sender,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Stops accepting notices, delivers what is already queued and returns
    /// the number of successful deliveries over the dispatcher's lifetime.
    pub async fn shutdown(&self) -> usize {
        self.shutdown.notify_one();

        let worker = self.worker.lock().take();
        match worker {
            Some(handle) => handle.await.unwrap_or_else(|err| {
                warn!(error = %err, "Dispatch worker terminated abnormally");
                0
            }),
            None => 0,
        }
    }
}

impl ActionDispatcher for QueuedDispatcher {
    fn notify_breach(&self, notice: BreachNotice) {
        let (notice, reason) = match self.sender.try_send(notice) {
            Ok(()) => return,
            Err(TrySendError::Full(notice)) => (notice, "queue full"),
            Err(TrySendError::Closed(notice)) => (notice, "dispatcher shut down"),
        };
        let err = AppError::DispatchFailure(reason.to_string());
        warn!(
            community = %notice.community_id,
            user = %notice.user_id,
            error = %err,
            "Dropping moderation action"
        );
    }
}

async fn run_worker(
    sink: Arc<dyn ModerationSink>,
    mut receiver: mpsc::Receiver<BreachNotice>,
    shutdown: Arc<Notify>,
) -> usize {
    let mut delivered = 0;
    loop {
        tokio::select! {
            next = receiver.recv() => {
                let Some(notice) = next else { break };
                match sink.deliver(&notice).await {
                    Ok(()) => delivered += 1,
                    Err(err) => {
                        let err = AppError::DispatchFailure(err.to_string());
                        warn!(
                            community = %notice.community_id,
                            user = %notice.user_id,
                            error = %err,
                            "Failed to deliver moderation action"
                        );
                    }
                }
            }
            _ = shutdown.notified() => {
                debug!("Dispatch queue closing, draining remaining notices");
                receiver.close();
            }
        }
    }
    delivered
}

/// Sink that reports moderation actions through the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl LogSink {
    pub fn render(notice: &BreachNotice) -> String {
        format!("Silence <@{}> (pressure {:.2})", notice.user_id, notice.pressure)
    }
}

#[async_trait]
impl ModerationSink for LogSink {
    async fn deliver(&self, notice: &BreachNotice) -> anyhow::Result<()> {
        let message = Self::render(notice);
        info!(
            community = %notice.community_id,
            channel = %notice.channel_id,
            user = %notice.user_id,
            %message,
            "Moderation action"
        );
        if let Some(log_channel) = notice.log_channel {
            info!(
                community = %notice.community_id,
                channel = %log_channel,
                user = %notice.user_id,
                %message,
                "Moderation action mirrored to log channel"
            );
        }
        Ok(())
    }
}
