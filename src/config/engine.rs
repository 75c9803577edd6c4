//! Alerting engine section of the configuration file.
//!
//! ```toml
//! [engine]
//! sensor_stream = "sensors_environmental"
//! alerts_subject_prefix = "alerts.climatecore"
//! config_subject = "config.climatecore"
//! batch_size = 10
//! fetch_timeout_ms = 2000
//! sensor_delivery = "new"
//! hysteresis = "subject"
//! on_stream_error = "fail_fast"
//! ```

use std::{path::PathBuf, time::Duration};

use climatecore_stream::DeliveryPolicy;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Where the sensor consumer starts reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorDelivery {
    /// Only readings published after startup.
    #[default]
    New,
    /// Replay the latest reading of every sensor subject once, then go live.
    LastPerSubject,
}

impl From<SensorDelivery> for DeliveryPolicy {
    fn from(delivery: SensorDelivery) -> Self {
        match delivery {
            SensorDelivery::New => DeliveryPolicy::New,
            SensorDelivery::LastPerSubject => DeliveryPolicy::LastPerSubject,
        }
    }
}

/// Granularity of alert suppression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HysteresisMode {
    /// One state per originating subject, kept in memory.
    #[default]
    Subject,
    /// A single flag across all sensors, optionally persisted to `state_file`.
    Global,
}

/// What the listener and engine do on connection-level stream errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamErrorPolicy {
    /// Return the error and let the process exit.
    #[default]
    FailFast,
    /// Back off and poll again until the retry budget runs out.
    Retry,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_state_file"))]
pub struct EngineConfig {
    /// Stream carrying sensor readings.
    #[validate(length(min = 1, message = "Sensor stream name must not be empty"))]
    pub sensor_stream: String,

    /// Alerts go to `<prefix>.<sensor name>`.
    #[validate(length(min = 1, message = "Alerts subject prefix must not be empty"))]
    pub alerts_subject_prefix: String,

    /// Subject carrying bounds configuration messages.
    #[validate(length(min = 1, message = "Config subject must not be empty"))]
    pub config_subject: String,

    /// Readings fetched per cycle.
    #[validate(range(min = 1, max = 1000, message = "Batch size must be 1-1000"))]
    pub batch_size: usize,

    #[validate(range(min = 10, max = 60000, message = "Fetch timeout must be 10-60000 ms"))]
    pub fetch_timeout_ms: u64,

    #[validate(range(
        min = 10,
        max = 60000,
        message = "Config fetch timeout must be 10-60000 ms"
    ))]
    pub config_fetch_timeout_ms: u64,

    /// Poll cadence while waiting for the first bounds.
    #[validate(range(min = 1, max = 10000, message = "Bounds poll interval must be 1-10000 ms"))]
    pub bounds_poll_interval_ms: u64,

    pub sensor_delivery: SensorDelivery,

    /// Durable consumer name for the sensor stream; ephemeral when unset.
    #[validate(length(min = 1, max = 255))]
    pub durable_name: Option<String>,

    pub hysteresis: HysteresisMode,

    /// Persisted flag for the global hysteresis variant.
    pub state_file: Option<PathBuf>,

    pub on_stream_error: StreamErrorPolicy,
}

fn validate_state_file(config: &EngineConfig) -> Result<(), ValidationError> {
    if config.state_file.is_some() && config.hysteresis != HysteresisMode::Global {
        let mut err = ValidationError::new("state_file_without_global");
        err.message = Some("state_file is only used with hysteresis = \"global\"".into());
        return Err(err);
    }
    Ok(())
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sensor_stream: "sensors_environmental".into(),
            alerts_subject_prefix: "alerts.climatecore".into(),
            config_subject: "config.climatecore".into(),
            batch_size: 10,
            fetch_timeout_ms: 2000,
            config_fetch_timeout_ms: 2000,
            bounds_poll_interval_ms: 100,
            sensor_delivery: SensorDelivery::default(),
            durable_name: None,
            hysteresis: HysteresisMode::default(),
            state_file: None,
            on_stream_error: StreamErrorPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn config_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.config_fetch_timeout_ms)
    }

    pub fn bounds_poll_interval(&self) -> Duration {
        Duration::from_millis(self.bounds_poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sensor_stream, "sensors_environmental");
        assert_eq!(config.alerts_subject_prefix, "alerts.climatecore");
        assert_eq!(config.config_subject, "config.climatecore");
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(2));
        assert_eq!(config.config_fetch_timeout(), Duration::from_secs(2));
        assert_eq!(config.bounds_poll_interval(), Duration::from_millis(100));
        assert_eq!(config.hysteresis, HysteresisMode::Subject);
        assert_eq!(config.on_stream_error, StreamErrorPolicy::FailFast);
    }

    #[test]
    fn test_rejects_zero_batch() {
        let config = EngineConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_prefix() {
        let config = EngineConfig {
            alerts_subject_prefix: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_state_file_requires_global_mode() {
        let mut config = EngineConfig {
            state_file: Some("/tmp/climatecore.state".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.hysteresis = HysteresisMode::Global;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_enums_from_toml() {
        let config: EngineConfig = toml::from_str(
            r#"
            sensor_delivery = "last_per_subject"
            hysteresis = "global"
            on_stream_error = "retry"
            "#,
        )
        .unwrap();
        assert_eq!(config.sensor_delivery, SensorDelivery::LastPerSubject);
        assert_eq!(config.hysteresis, HysteresisMode::Global);
        assert_eq!(config.on_stream_error, StreamErrorPolicy::Retry);
        assert_eq!(config.batch_size, 10);
    }

    #[test]
    fn test_sensor_delivery_maps_to_policy() {
        assert_eq!(DeliveryPolicy::from(SensorDelivery::New), DeliveryPolicy::New);
        assert_eq!(
            DeliveryPolicy::from(SensorDelivery::LastPerSubject),
            DeliveryPolicy::LastPerSubject
        );
    }
}
