//! Background task feeding the bounds table from the config subject.
//!
//! The consumer is placed with "last message only" delivery, so on start the
//! most recent config message is replayed once and later ones arrive live.
//! Each message is an object mapping sensor names to `{min, max}`; valid
//! entries are upserted together, invalid ones are logged and skipped. Every
//! message is acknowledged whatever its content, so a bad config can never
//! cause a redelivery storm.

use std::{sync::Arc, time::Duration};

use climatecore_stream::{Backoff, InboundMessage, StreamError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    bounds::BoundsTable,
    error::EngineError,
    retry::StreamErrorHandler,
    schema::{parse_config_message, Bounds},
    source::MessageSource,
};
use crate::config::engine::EngineConfig;

/// Config messages fetched per poll.
const CONFIG_BATCH: usize = 1;

/// Totals for one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerReport {
    pub messages: usize,
    pub applied: usize,
    pub rejected: usize,
}

pub struct ConfigListener {
    source: Arc<dyn MessageSource>,
    table: BoundsTable,
    fetch_timeout: Duration,
    errors: StreamErrorHandler,
}

impl ConfigListener {
    pub fn new(
        source: Arc<dyn MessageSource>,
        table: BoundsTable,
        config: &EngineConfig,
        backoff: Backoff,
    ) -> Self {
        Self {
            source,
            table,
            fetch_timeout: config.config_fetch_timeout(),
            errors: StreamErrorHandler::new("Config listener", config.on_stream_error, backoff),
        }
    }

    /// Fetches and applies at most one batch.
    ///
    /// # Errors
    ///
    /// Only a failed fetch. Bad payloads and failed acks are logged.
    pub async fn poll_once(&self) -> Result<ListenerReport, StreamError> {
        let messages = self
            .source
            .fetch_batch(CONFIG_BATCH, self.fetch_timeout)
            .await?;

        let mut report = ListenerReport {
            messages: messages.len(),
            ..Default::default()
        };

        for message in &messages {
            let (applied, rejected) = self.apply_message(message);
            report.applied += applied;
            report.rejected += rejected;

            if let Err(e) = self.source.ack(message).await {
                warn!("Failed to acknowledge config message: {}", e);
            }
        }

        Ok(report)
    }

    fn apply_message(&self, message: &InboundMessage) -> (usize, usize) {
        let payload = String::from_utf8_lossy(message.payload());
        debug!("Received config message: {}", payload);

        let entries = match parse_config_message(message.payload()) {
            Ok(entries) => entries,
            Err(e) => {
                error!("Invalid config message: {}: {}", payload, e);
                return (0, 0);
            }
        };

        let mut valid: Vec<Bounds> = Vec::with_capacity(entries.len());
        let mut rejected = 0;
        for (sensor, result) in entries {
            match result {
                Ok(bounds) => {
                    info!(
                        "Updated sensor bounds: {} [{}, {}]",
                        bounds.sensor, bounds.min, bounds.max
                    );
                    valid.push(bounds);
                }
                Err(e) => {
                    error!("Invalid sensor bounds for '{}': {}", sensor, e);
                    rejected += 1;
                }
            }
        }

        (self.table.apply(valid), rejected)
    }

    /// Polls until `cancel` fires. A poll in progress is finished first, so an
    /// applied config message is always acknowledged.
    ///
    /// # Errors
    ///
    /// A fetch error under the fail-fast policy, or once retries run out.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), EngineError> {
        info!("Config listener started");

        while !cancel.is_cancelled() {
            match self.poll_once().await {
                Ok(_) => self.errors.succeeded(),
                Err(e) => self.errors.handle(e, &cancel).await?,
            }
        }

        info!("Config listener stopped");
        Ok(())
    }
}
