//! Message source seam between the loops and the broker.

use std::time::Duration;

use climatecore_stream::{InboundMessage, PullConsumer, StreamError};

/// Batch fetch with bounded wait plus per-message acknowledgement.
#[async_trait::async_trait]
pub trait MessageSource: Send + Sync {
    /// Up to `max` messages; empty when nothing arrived within `wait`.
    async fn fetch_batch(
        &self,
        max: usize,
        wait: Duration,
    ) -> Result<Vec<InboundMessage>, StreamError>;

    async fn ack(&self, message: &InboundMessage) -> Result<(), StreamError>;
}

#[async_trait::async_trait]
impl MessageSource for PullConsumer {
    async fn fetch_batch(
        &self,
        max: usize,
        wait: Duration,
    ) -> Result<Vec<InboundMessage>, StreamError> {
        PullConsumer::fetch_batch(self, max, wait).await
    }

    async fn ack(&self, message: &InboundMessage) -> Result<(), StreamError> {
        PullConsumer::ack(self, message).await
    }
}
