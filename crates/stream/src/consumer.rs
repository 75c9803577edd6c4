//! Pull consumption with batch fetch and per-message acknowledgement.
//!
//! A [`PullConsumer`] wraps a JetStream pull consumer and exposes two calls:
//!
//! - `fetch_batch(max, wait)`: request up to `max` messages and wait at most
//!   `wait` for them. Whatever arrived by the deadline is returned; an empty
//!   batch means "no work this cycle" and is not an error.
//! - `ack(&message)`: acknowledge one message.
//!
//! Messages are handed out as [`InboundMessage`], which keeps the payload,
//! the originating subject and the broker's publish timestamp, plus the
//! handle needed to acknowledge it later.

use std::{fmt, time::Duration};

use async_nats::jetstream::{
    self,
    consumer::{pull, Consumer, DeliverPolicy},
};
use bytes::Bytes;
use futures_util::StreamExt;
use time::OffsetDateTime;
use tracing::{debug, trace};

use super::{
    config::{ConsumerSpec, DeliveryPolicy, StreamTarget},
    error::StreamError,
};

/// One message delivered by a pull consumer.
pub struct InboundMessage {
    subject: String,
    payload: Bytes,
    published: OffsetDateTime,
    handle: Option<jetstream::Message>,
}

impl InboundMessage {
    fn from_jetstream(message: jetstream::Message) -> Self {
        let published = match message.info() {
            Ok(info) => info.published,
            Err(e) => {
                debug!("Message without JetStream metadata ({}), using local time", e);
                OffsetDateTime::now_utc()
            }
        };
        Self {
            subject: message.subject.to_string(),
            payload: message.payload.clone(),
            published,
            handle: Some(message),
        }
    }

    /// Builds a message that is not bound to the broker.
    ///
    /// Acknowledging it is a no-op. Used for replays and tests.
    pub fn detached(
        subject: impl Into<String>,
        payload: impl Into<Bytes>,
        published: OffsetDateTime,
    ) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
            published,
            handle: None,
        }
    }

    /// Subject the message was published on.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Broker ingestion time.
    pub fn published(&self) -> OffsetDateTime {
        self.published
    }

    /// Whether the message still carries a broker handle to acknowledge.
    pub fn is_detached(&self) -> bool {
        self.handle.is_none()
    }
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("subject", &self.subject)
            .field("payload", &String::from_utf8_lossy(&self.payload))
            .field("published", &self.published)
            .field("detached", &self.is_detached())
            .finish()
    }
}

/// Translates the placement policy into the JetStream deliver policy.
pub(crate) fn deliver_policy(policy: DeliveryPolicy) -> DeliverPolicy {
    match policy {
        DeliveryPolicy::New => DeliverPolicy::New,
        DeliveryPolicy::LastPerSubject => DeliverPolicy::LastPerSubject,
        DeliveryPolicy::Last => DeliverPolicy::Last,
    }
}

/// A bound JetStream pull consumer.
pub struct PullConsumer {
    stream: String,
    consumer: Consumer<pull::Config>,
}

impl PullConsumer {
    /// Resolves the target stream and creates the consumer on it.
    ///
    /// # Errors
    ///
    /// `StreamLookup` if the stream (or the stream holding the subject) does
    /// not exist; `ConsumerSetup` if the broker rejects the consumer.
    pub(crate) async fn create(
        context: &jetstream::Context,
        spec: &ConsumerSpec,
    ) -> Result<Self, StreamError> {
        let (stream_name, filter_subject) = match &spec.target {
            StreamTarget::Named(name) => (name.clone(), String::new()),
            StreamTarget::Subject(subject) => {
                let name = context.stream_by_subject(subject.as_str()).await.map_err(|e| {
                    StreamError::StreamLookup {
                        target: subject.clone(),
                        reason: e.to_string(),
                    }
                })?;
                (name, subject.clone())
            }
        };

        let stream = context
            .get_stream(stream_name.as_str())
            .await
            .map_err(|e| StreamError::StreamLookup {
                target: stream_name.clone(),
                reason: e.to_string(),
            })?;

        let config = pull::Config {
            durable_name: spec.durable_name.clone(),
            deliver_policy: deliver_policy(spec.delivery),
            filter_subject,
            ..Default::default()
        };

        let consumer = stream
            .create_consumer(config)
            .await
            .map_err(|e| StreamError::ConsumerSetup {
                stream: stream_name.clone(),
                reason: e.to_string(),
            })?;

        debug!(
            "Pull consumer ready on stream '{}' ({:?}, durable: {:?})",
            stream_name, spec.delivery, spec.durable_name
        );

        Ok(Self {
            stream: stream_name,
            consumer,
        })
    }

    /// Name of the stream this consumer reads from.
    pub fn stream_name(&self) -> &str {
        &self.stream
    }

    /// Fetches up to `max` messages, waiting at most `wait`.
    ///
    /// Returns an empty vector if nothing arrived before the deadline.
    ///
    /// # Errors
    ///
    /// `StreamError::Fetch` when the pull request itself fails.
    pub async fn fetch_batch(
        &self,
        max: usize,
        wait: Duration,
    ) -> Result<Vec<InboundMessage>, StreamError> {
        let mut batch = self
            .consumer
            .batch()
            .max_messages(max)
            .expires(wait)
            .messages()
            .await
            .map_err(|e| StreamError::Fetch(e.to_string()))?;

        let mut messages = Vec::with_capacity(max);
        while let Some(item) = batch.next().await {
            let message = item.map_err(|e| StreamError::Fetch(e.to_string()))?;
            messages.push(InboundMessage::from_jetstream(message));
        }

        trace!(
            "Fetched {} message(s) from stream '{}'",
            messages.len(),
            self.stream
        );
        Ok(messages)
    }

    /// Acknowledges one message. Detached messages are accepted silently.
    ///
    /// # Errors
    ///
    /// `StreamError::Ack` if the broker did not take the acknowledgement.
    pub async fn ack(&self, message: &InboundMessage) -> Result<(), StreamError> {
        let Some(handle) = &message.handle else {
            return Ok(());
        };
        handle.ack().await.map_err(|e| StreamError::Ack {
            subject: message.subject.clone(),
            reason: e.to_string(),
        })
    }
}
