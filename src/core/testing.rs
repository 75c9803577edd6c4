//! Hand-written doubles for the source and publisher seams.

use std::{
    collections::VecDeque,
    sync::Mutex,
    time::Duration,
};

use climatecore_stream::{InboundMessage, StreamError};
use time::{macros::datetime, OffsetDateTime};

use super::{publisher::AlertPublisher, schema::AlertEvent, source::MessageSource};

pub const PUBLISHED: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);

pub fn reading_message(subject: &str, name: &str, value: f64) -> InboundMessage {
    let payload = format!(
        r#"{{"name":"{}","device_id":"dev-1","location":"bedroom","value":{}}}"#,
        name, value
    );
    InboundMessage::detached(subject, payload.into_bytes(), PUBLISHED)
}

pub fn raw_message(subject: &str, payload: &str) -> InboundMessage {
    InboundMessage::detached(subject, payload.as_bytes().to_vec(), PUBLISHED)
}

/// Serves queued batches in order, then empty batches.
#[derive(Default)]
pub struct MockSource {
    batches: Mutex<VecDeque<Result<Vec<InboundMessage>, StreamError>>>,
    fetch_count: Mutex<usize>,
    ack_count: Mutex<usize>,
    acked_subjects: Mutex<Vec<String>>,
    fail_acks: bool,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_acks() -> Self {
        Self {
            fail_acks: true,
            ..Default::default()
        }
    }

    pub fn push(&self, batch: Vec<InboundMessage>) {
        self.batches.lock().unwrap().push_back(Ok(batch));
    }

    pub fn push_error(&self, err: StreamError) {
        self.batches.lock().unwrap().push_back(Err(err));
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetch_count.lock().unwrap()
    }

    pub fn ack_count(&self) -> usize {
        *self.ack_count.lock().unwrap()
    }

    pub fn acked_subjects(&self) -> Vec<String> {
        self.acked_subjects.lock().unwrap().clone()
    }

    pub fn pending(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl MessageSource for MockSource {
    async fn fetch_batch(
        &self,
        max: usize,
        wait: Duration,
    ) -> Result<Vec<InboundMessage>, StreamError> {
        *self.fetch_count.lock().unwrap() += 1;
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(Ok(mut batch)) => {
                batch.truncate(max);
                Ok(batch)
            }
            Some(Err(e)) => Err(e),
            None => {
                tokio::time::sleep(wait.min(Duration::from_millis(5))).await;
                Ok(Vec::new())
            }
        }
    }

    async fn ack(&self, message: &InboundMessage) -> Result<(), StreamError> {
        *self.ack_count.lock().unwrap() += 1;
        self.acked_subjects
            .lock()
            .unwrap()
            .push(message.subject().to_string());
        if self.fail_acks {
            return Err(StreamError::Ack {
                subject: message.subject().to_string(),
                reason: "broker unavailable".into(),
            });
        }
        Ok(())
    }
}

/// Records every publish; optionally fails them all.
#[derive(Default)]
pub struct MockPublisher {
    published: Mutex<Vec<(String, AlertEvent)>>,
    publish_count: Mutex<usize>,
    fail: bool,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn publish_count(&self) -> usize {
        *self.publish_count.lock().unwrap()
    }

    pub fn published(&self) -> Vec<(String, AlertEvent)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AlertPublisher for MockPublisher {
    async fn publish(&self, subject: &str, event: &AlertEvent) -> Result<(), StreamError> {
        *self.publish_count.lock().unwrap() += 1;
        if self.fail {
            return Err(StreamError::Publish {
                subject: subject.to_string(),
                reason: "no route".into(),
            });
        }
        self.published
            .lock()
            .unwrap()
            .push((subject.to_string(), event.clone()));
        Ok(())
    }
}
