//! Restarts the relay consumer after fatal errors.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::relay::consumer::{RelayConsumer, ReplyCommand};

/// Exponential restart delay.
///
/// A run that lasted longer than `max` counts as healthy and resets the delay,
/// so rare failures far apart always restart quickly.
#[derive(Debug, Clone)]
pub struct RestartBackoff {
    start: Duration,
    max: Duration,
    current: Duration,
}

impl RestartBackoff {
    pub fn new(start: Duration, max: Duration) -> Self {
        let max = max.max(start);
        Self {
            start,
            max,
            current: start,
        }
    }

    /// Delay before the next restart, given how long the last run lasted.
    pub fn next_delay(&mut self, ran_for: Duration) -> Duration {
        if ran_for > self.max {
            self.current = self.start;
        }
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }
}

/// Run the consumer forever on a background task, restarting it after errors.
pub fn spawn_consumer_supervisor(
    consumer: Arc<RelayConsumer>,
    tx: UnboundedSender<ReplyCommand>,
    mut backoff: RestartBackoff,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let started = Instant::now();
            match consumer.run(tx.clone()).await {
                Ok(()) => tracing::warn!("Relay consumer exited unexpectedly"),
                Err(e) => tracing::error!(error = %e, "Relay consumer stopped"),
            }

            let delay = backoff.next_delay(started.elapsed());
            tracing::info!(retry_in_ms = delay.as_millis() as u64, "Restarting relay consumer");
            tokio::time::sleep(delay).await;
        }
    })
}
