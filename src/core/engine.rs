//! The alerting engine: pull, evaluate, acknowledge, publish.
//!
//! One cycle:
//!
//! 1. fetch up to `batch_size` readings, waiting at most `fetch_timeout`
//! 2. take one bounds snapshot for the whole batch
//! 3. for every message: validate, look up bounds, feed the hysteresis
//!    tracker, queue an event on a transition, acknowledge
//! 4. publish every queued event concurrently and wait for all of them
//! 5. let the tracker persist its state
//!
//! Acknowledgement happens right after evaluation and does not depend on
//! publishing. An empty fetch is an idle cycle, not an error.

use std::sync::Arc;

use climatecore_stream::{Backoff, InboundMessage, StreamError};
use futures_util::future::join_all;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{
    bounds::{BoundsSnapshot, BoundsTable},
    error::EngineError,
    hysteresis::{HysteresisTracker, SubjectHysteresis, Transition},
    publisher::{alert_subject, AlertPublisher},
    retry::StreamErrorHandler,
    schema::{AlertEvent, SensorReading},
    source::MessageSource,
};
use crate::config::engine::EngineConfig;

/// Counters for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub acked: usize,
    /// Payloads that failed validation.
    pub invalid: usize,
    /// Readings for sensors without bounds.
    pub ignored: usize,
    pub alerts: usize,
    pub recoveries: usize,
    pub publish_failures: usize,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        self.fetched == 0
    }
}

enum Evaluation {
    Invalid,
    Ignored,
    Unchanged,
    Event(AlertEvent),
}

pub struct AlertingEngine {
    source: Arc<dyn MessageSource>,
    publisher: Arc<dyn AlertPublisher>,
    bounds: BoundsTable,
    tracker: Box<dyn HysteresisTracker>,
    alerts_prefix: String,
    batch_size: usize,
    fetch_timeout: Duration,
    bounds_poll_interval: Duration,
    errors: StreamErrorHandler,
}

impl AlertingEngine {
    /// Creates an engine with per-subject hysteresis.
    pub fn new(
        source: Arc<dyn MessageSource>,
        publisher: Arc<dyn AlertPublisher>,
        bounds: BoundsTable,
        config: &EngineConfig,
        backoff: Backoff,
    ) -> Self {
        Self {
            source,
            publisher,
            bounds,
            tracker: Box::new(SubjectHysteresis::new()),
            alerts_prefix: config.alerts_subject_prefix.clone(),
            batch_size: config.batch_size,
            fetch_timeout: config.fetch_timeout(),
            bounds_poll_interval: config.bounds_poll_interval(),
            errors: StreamErrorHandler::new("Alerting engine", config.on_stream_error, backoff),
        }
    }

    /// Replaces the hysteresis tracker.
    pub fn with_tracker(mut self, tracker: Box<dyn HysteresisTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn alerting_count(&self) -> usize {
        self.tracker.alerting_count()
    }

    /// Blocks until the bounds table holds at least one sensor.
    pub async fn wait_for_bounds(&self) {
        self.bounds
            .wait_until_populated(self.bounds_poll_interval)
            .await;
        debug!("Configuration received: {:?}", self.bounds.snapshot());
    }

    /// Runs one fetch/evaluate/ack/publish cycle.
    ///
    /// # Errors
    ///
    /// Only a failed fetch. Everything after that is handled per message.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, StreamError> {
        let messages = self
            .source
            .fetch_batch(self.batch_size, self.fetch_timeout)
            .await?;

        let mut report = CycleReport {
            fetched: messages.len(),
            ..Default::default()
        };
        if messages.is_empty() {
            trace!("Idle cycle");
            return Ok(report);
        }

        let snapshot = self.bounds.snapshot();
        let mut pending: Vec<(String, AlertEvent)> = Vec::new();

        for message in &messages {
            match self.evaluate(message, &snapshot) {
                Evaluation::Invalid => report.invalid += 1,
                Evaluation::Ignored => report.ignored += 1,
                Evaluation::Unchanged => {}
                Evaluation::Event(event) => {
                    if event.is_recovery() {
                        report.recoveries += 1;
                    } else {
                        report.alerts += 1;
                    }
                    let subject = alert_subject(&self.alerts_prefix, &event.reading.name);
                    debug!("Queued alert for {}: {:?}", subject, event);
                    pending.push((subject, event));
                }
            }

            match self.source.ack(message).await {
                Ok(()) => report.acked += 1,
                Err(e) => warn!("Failed to acknowledge '{}': {}", message.subject(), e),
            }
        }

        let publisher = &self.publisher;
        let results = join_all(
            pending
                .iter()
                .map(|(subject, event)| publisher.publish(subject, event)),
        )
        .await;

        for ((subject, _), result) in pending.iter().zip(results) {
            if let Err(e) = result {
                error!("Failed to publish alert to '{}': {}", subject, e);
                report.publish_failures += 1;
            }
        }

        if let Err(e) = self.tracker.persist() {
            error!("Failed to persist hysteresis state: {}", e);
        }

        debug!(
            "Cycle: fetched={} acked={} invalid={} ignored={} alerts={} recoveries={} publish_failures={}",
            report.fetched,
            report.acked,
            report.invalid,
            report.ignored,
            report.alerts,
            report.recoveries,
            report.publish_failures
        );
        Ok(report)
    }

    fn evaluate(&mut self, message: &InboundMessage, snapshot: &BoundsSnapshot) -> Evaluation {
        let reading = match SensorReading::from_payload(message.payload(), message.published()) {
            Ok(reading) => reading,
            Err(e) => {
                error!(
                    "Invalid sensor data: {}: {}",
                    String::from_utf8_lossy(message.payload()),
                    e
                );
                return Evaluation::Invalid;
            }
        };

        let Some(bounds) = snapshot.get(&reading.name) else {
            debug!("Ignoring sensor data without bounds: {:?}", reading);
            return Evaluation::Ignored;
        };

        match self.tracker.observe(message.subject(), &reading, bounds) {
            Transition::Unchanged => Evaluation::Unchanged,
            Transition::Alert => {
                warn!(
                    "Sensor data out of bounds on '{}': {} = {} (bounds [{}, {}])",
                    message.subject(),
                    reading.name,
                    reading.value,
                    bounds.min,
                    bounds.max
                );
                Evaluation::Event(AlertEvent::violation(reading, bounds.clone()))
            }
            Transition::Recover => {
                info!(
                    "Sensor back to normal on '{}': {} = {}",
                    message.subject(),
                    reading.name,
                    reading.value
                );
                Evaluation::Event(AlertEvent::recovery(reading, bounds.clone()))
            }
        }
    }

    /// Waits for bounds, then runs cycles until `cancel` fires.
    ///
    /// The token is checked between cycles only; a started cycle always
    /// finishes its acknowledgements and publishes.
    ///
    /// # Errors
    ///
    /// A fetch error under the fail-fast policy, or once retries run out.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), EngineError> {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Alerting engine cancelled before bounds arrived");
                return Ok(());
            }
            _ = self.wait_for_bounds() => {}
        }

        info!(
            "Alerting engine started (batch: {}, fetch timeout: {:?}, alerts: {}.*)",
            self.batch_size, self.fetch_timeout, self.alerts_prefix
        );

        while !cancel.is_cancelled() {
            match self.run_cycle().await {
                Ok(_) => self.errors.succeeded(),
                Err(e) => self.errors.handle(e, &cancel).await?,
            }
        }

        info!(
            "Alerting engine stopped ({} subject(s) still alerting)",
            self.alerting_count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::{sleep, timeout};
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        config::engine::StreamErrorPolicy,
        core::{
            hysteresis::GlobalHysteresis,
            schema::Bounds,
            testing::{raw_message, reading_message, MockPublisher, MockSource, PUBLISHED},
        },
    };

    struct Harness {
        source: Arc<MockSource>,
        publisher: Arc<MockPublisher>,
        table: BoundsTable,
        engine: AlertingEngine,
    }

    fn harness_with(source: MockSource, publisher: MockPublisher) -> Harness {
        let source = Arc::new(source);
        let publisher = Arc::new(publisher);
        let table = BoundsTable::new();
        table.upsert(Bounds::new("temperature", 10.0, 20.0).unwrap());
        let engine = AlertingEngine::new(
            source.clone(),
            publisher.clone(),
            table.clone(),
            &EngineConfig::default(),
            Backoff::default(),
        );
        Harness {
            source,
            publisher,
            table,
            engine,
        }
    }

    fn harness() -> Harness {
        harness_with(MockSource::new(), MockPublisher::new())
    }

    const SUBJECT: &str = "sensors.temperature.bedroom";

    #[tokio::test]
    async fn test_violation_suppression_and_recovery() {
        let mut h = harness();

        h.source.push(vec![reading_message(SUBJECT, "temperature", 25.0)]);
        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.alerts, 1);

        let published = h.publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "alerts.climatecore.temperature");
        assert_eq!(published[0].1.message, "out of bounds");
        assert_eq!(published[0].1.reading.value, 25.0);
        assert_eq!(published[0].1.reading.timestamp, PUBLISHED);
        assert_eq!(published[0].1.bounds.max, 20.0);

        h.source.push(vec![reading_message(SUBJECT, "temperature", 30.0)]);
        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.alerts, 0);
        assert_eq!(h.publisher.publish_count(), 1);

        h.source.push(vec![reading_message(SUBJECT, "temperature", 15.0)]);
        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.recoveries, 1);

        let published = h.publisher.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].1.message, "back to normal");
        assert_eq!(published[1].1.reading.value, 15.0);
        assert_eq!(h.engine.alerting_count(), 0);
    }

    #[tokio::test]
    async fn test_transitions_within_one_batch() {
        let mut h = harness();
        h.source.push(vec![
            reading_message(SUBJECT, "temperature", 25.0),
            reading_message(SUBJECT, "temperature", 30.0),
            reading_message(SUBJECT, "temperature", 15.0),
            reading_message(SUBJECT, "temperature", 5.0),
        ]);

        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.fetched, 4);
        assert_eq!(report.acked, 4);
        assert_eq!(report.alerts, 2);
        assert_eq!(report.recoveries, 1);
        assert_eq!(h.publisher.publish_count(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_idempotent() {
        let mut h = harness();
        for _ in 0..3 {
            h.source.push(vec![
                reading_message(SUBJECT, "temperature", 25.0),
                reading_message(SUBJECT, "temperature", 25.0),
            ]);
            h.engine.run_cycle().await.unwrap();
        }
        assert_eq!(h.publisher.publish_count(), 1);
        assert_eq!(h.source.ack_count(), 6);
    }

    #[tokio::test]
    async fn test_boundary_values_are_in_bounds() {
        let mut h = harness();
        h.source.push(vec![
            reading_message(SUBJECT, "temperature", 10.0),
            reading_message(SUBJECT, "temperature", 20.0),
        ]);
        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.alerts, 0);
        assert_eq!(h.publisher.publish_count(), 0);
    }

    #[tokio::test]
    async fn test_subjects_tracked_separately() {
        let mut h = harness();
        h.source.push(vec![
            reading_message("sensors.temperature.bedroom", "temperature", 25.0),
            reading_message("sensors.temperature.kitchen", "temperature", 26.0),
        ]);
        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.alerts, 2);
        assert_eq!(h.engine.alerting_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_sensor_is_acked_without_event() {
        let mut h = harness();
        h.source.push(vec![reading_message("sensors.co2.bedroom", "co2", 5000.0)]);

        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.ignored, 1);
        assert_eq!(h.source.ack_count(), 1);
        assert_eq!(h.publisher.publish_count(), 0);
        assert_eq!(h.engine.alerting_count(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_malformed_payload_is_acked_and_logged() {
        let mut h = harness();
        h.source.push(vec![reading_message(SUBJECT, "temperature", 25.0)]);
        h.engine.run_cycle().await.unwrap();

        h.source.push(vec![
            raw_message(SUBJECT, "{broken"),
            raw_message(SUBJECT, r#"{"name":"temperature","value":15}"#),
        ]);
        let report = h.engine.run_cycle().await.unwrap();

        assert_eq!(report.invalid, 2);
        assert_eq!(report.acked, 2);
        assert_eq!(h.engine.alerting_count(), 1);
        assert_eq!(h.publisher.publish_count(), 1);
        assert!(logs_contain("Invalid sensor data"));
    }

    #[tokio::test]
    async fn test_idle_cycle_touches_nothing() {
        let mut h = harness();
        h.source.push(vec![reading_message(SUBJECT, "temperature", 25.0)]);
        h.engine.run_cycle().await.unwrap();
        assert_eq!(h.engine.alerting_count(), 1);
        assert_eq!(h.source.acked_subjects(), vec![SUBJECT.to_string()]);

        let before = h.table.snapshot();
        let report = h.engine.run_cycle().await.unwrap();

        assert!(report.is_idle());
        assert_eq!(report, CycleReport::default());
        assert_eq!(h.publisher.publish_count(), 1);
        assert_eq!(h.source.ack_count(), 1);
        assert_eq!(h.engine.alerting_count(), 1);
        assert!(Arc::ptr_eq(&before, &h.table.snapshot()));

        // still alerting: a further violation stays silent
        h.source.push(vec![reading_message(SUBJECT, "temperature", 26.0)]);
        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.alerts, 0);
        assert_eq!(h.publisher.publish_count(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_publish_failure_does_not_block_acks() {
        let mut h = harness_with(MockSource::new(), MockPublisher::failing());
        h.source.push(vec![reading_message(SUBJECT, "temperature", 25.0)]);

        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.alerts, 1);
        assert_eq!(report.publish_failures, 1);
        assert_eq!(report.acked, 1);
        assert_eq!(h.engine.alerting_count(), 1);
        assert!(logs_contain("Failed to publish alert"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_ack_failure_is_logged() {
        let mut h = harness_with(MockSource::failing_acks(), MockPublisher::new());
        h.source.push(vec![reading_message(SUBJECT, "temperature", 25.0)]);

        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.acked, 0);
        assert_eq!(report.alerts, 1);
        assert_eq!(h.publisher.publish_count(), 1);
        assert!(logs_contain("Failed to acknowledge"));
    }

    #[tokio::test]
    async fn test_bounds_update_applies_next_cycle() {
        let mut h = harness();
        h.source.push(vec![reading_message(SUBJECT, "temperature", 25.0)]);
        h.engine.run_cycle().await.unwrap();

        h.table.upsert(Bounds::new("temperature", 10.0, 30.0).unwrap());
        h.source.push(vec![reading_message(SUBJECT, "temperature", 25.0)]);
        let report = h.engine.run_cycle().await.unwrap();

        assert_eq!(report.recoveries, 1);
        assert_eq!(h.publisher.published()[1].1.bounds.max, 30.0);
    }

    #[tokio::test]
    async fn test_global_tracker_persists_after_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let h = harness();
        let mut engine = h
            .engine
            .with_tracker(Box::new(GlobalHysteresis::load(&path).unwrap()));

        h.source.push(vec![
            reading_message("sensors.temperature.a", "temperature", 25.0),
            reading_message("sensors.temperature.b", "temperature", 26.0),
        ]);
        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.alerts, 1);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            r#"{"alerting":true}"#
        );
    }

    #[tokio::test]
    async fn test_run_waits_for_bounds() {
        let source = Arc::new(MockSource::new());
        let publisher = Arc::new(MockPublisher::new());
        let table = BoundsTable::new();
        let engine = AlertingEngine::new(
            source.clone(),
            publisher.clone(),
            table.clone(),
            &EngineConfig::default(),
            Backoff::default(),
        );

        source.push(vec![reading_message(SUBJECT, "temperature", 25.0)]);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(engine.run(cancel.clone()));

        sleep(Duration::from_millis(100)).await;
        assert_eq!(source.fetch_count(), 0);

        table.upsert(Bounds::new("temperature", 10.0, 20.0).unwrap());
        sleep(Duration::from_millis(200)).await;
        assert!(source.fetch_count() > 0);
        assert_eq!(publisher.publish_count(), 1);

        cancel.cancel();
        let result = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_cancelled_while_waiting() {
        let engine = AlertingEngine::new(
            Arc::new(MockSource::new()),
            Arc::new(MockPublisher::new()),
            BoundsTable::new(),
            &EngineConfig::default(),
            Backoff::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = timeout(Duration::from_secs(1), engine.run(cancel))
            .await
            .expect("cancelled engine should return");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_fails_fast() {
        let h = harness();
        h.source.push_error(StreamError::Fetch("stream deleted".into()));

        let result = timeout(Duration::from_secs(1), h.engine.run(CancellationToken::new()))
            .await
            .expect("fail-fast engine should return");
        assert!(matches!(
            result,
            Err(EngineError::Stream {
                component: "Alerting engine",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_run_retry_mode_survives_fetch_error() {
        let source = Arc::new(MockSource::new());
        let publisher = Arc::new(MockPublisher::new());
        let table = BoundsTable::new();
        table.upsert(Bounds::new("temperature", 10.0, 20.0).unwrap());

        let config = EngineConfig {
            on_stream_error: StreamErrorPolicy::Retry,
            ..Default::default()
        };
        let backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(5), 2.0);
        let engine = AlertingEngine::new(
            source.clone(),
            publisher.clone(),
            table,
            &config,
            backoff,
        );

        source.push_error(StreamError::Fetch("timeout talking to server".into()));
        source.push(vec![reading_message(SUBJECT, "temperature", 25.0)]);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(engine.run(cancel.clone()));
        sleep(Duration::from_millis(200)).await;

        assert_eq!(source.pending(), 0);
        assert_eq!(publisher.publish_count(), 1);

        cancel.cancel();
        let result = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
