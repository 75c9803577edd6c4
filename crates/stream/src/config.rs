//! Configuration for the broker connection and for consumer placement.
//!
//! `Config` is deserialized from the `[transport]` table of the application's
//! TOML file and validated with the `validator` crate before any connection
//! is attempted, so a typo fails at load time rather than at connect time.
//!
//! ```toml
//! [transport]
//! server = "nats://localhost:4222"
//! connection_name = "climatecore"
//! connection_timeout = 10
//! max_reconnects = 0          # unlimited
//! retry_initial_ms = 500
//! retry_max_ms = 30000
//! retry_multiplier = 2.0
//! retry_max_attempts = 0      # unlimited
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::backoff::Backoff;

/// Broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_credentials"))]
pub struct Config {
    /// Server URL, e.g. `nats://localhost:4222`.
    #[validate(length(min = 1, max = 2048, message = "Server URL must not be empty"))]
    pub server: String,

    /// Connection name reported to the server (shows up in monitoring).
    #[validate(length(max = 255, message = "Connection name must not exceed 255 characters"))]
    pub connection_name: String,

    /// Seconds to wait for the initial connection.
    #[validate(range(
        min = 1,
        max = 300,
        message = "Connection timeout must be between 1 and 300 seconds"
    ))]
    pub connection_timeout: u64,

    /// Seconds between client pings.
    #[validate(range(
        min = 1,
        max = 3600,
        message = "Ping interval must be between 1 and 3600 seconds"
    ))]
    pub ping_interval: u64,

    /// Seconds to wait for request replies (JetStream API calls, acks).
    #[validate(range(
        min = 1,
        max = 300,
        message = "Request timeout must be between 1 and 300 seconds"
    ))]
    pub request_timeout: u64,

    /// Reconnect attempts made by the client after a lost connection.
    /// `0` keeps reconnecting forever.
    pub max_reconnects: usize,

    /// Optional username; requires `password`.
    pub user: Option<String>,

    /// Optional password; requires `user`.
    pub password: Option<String>,

    /// Optional token authentication. Mutually exclusive with user/password.
    pub token: Option<String>,

    /// First delay (ms) when an application loop retries a failed poll.
    #[validate(range(min = 10, max = 60000, message = "Retry initial delay must be 10-60000 ms"))]
    pub retry_initial_ms: u64,

    /// Delay cap (ms) for application loop retries.
    #[validate(range(min = 10, max = 600000, message = "Retry max delay must be 10-600000 ms"))]
    pub retry_max_ms: u64,

    /// Growth factor applied to the retry delay after each failure.
    #[validate(range(min = 1.0, max = 30.0, message = "Retry multiplier must be between 1 and 30"))]
    pub retry_multiplier: f64,

    /// Consecutive failed polls tolerated before giving up. `0` is unlimited.
    pub retry_max_attempts: u32,
}

/// User/password must come in pairs and cannot be combined with a token.
fn validate_credentials(config: &Config) -> Result<(), ValidationError> {
    if config.user.is_some() != config.password.is_some() {
        let mut err = ValidationError::new("incomplete_credentials");
        err.message = Some("user and password must be configured together".into());
        return Err(err);
    }
    if config.token.is_some() && config.user.is_some() {
        let mut err = ValidationError::new("conflicting_credentials");
        err.message = Some("token and user/password authentication are exclusive".into());
        return Err(err);
    }
    Ok(())
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: "nats://localhost:4222".to_string(),
            connection_name: "climatecore".to_string(),
            connection_timeout: 10,
            ping_interval: 60,
            request_timeout: 10,
            max_reconnects: 0,
            user: None,
            password: None,
            token: None,
            retry_initial_ms: 500,
            retry_max_ms: 30_000,
            retry_multiplier: 2.0,
            retry_max_attempts: 0,
        }
    }
}

impl Config {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Backoff used by application loops in retry mode.
    pub fn retry_backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.retry_initial_ms),
            Duration::from_millis(self.retry_max_ms),
            self.retry_multiplier,
        )
        .with_max_attempts(self.retry_max_attempts)
    }
}

/// Where a new consumer starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Only messages published after the consumer is created.
    #[default]
    New,
    /// The most recent message of every distinct subject, then live.
    LastPerSubject,
    /// The single most recent message in the stream, then live.
    Last,
}

/// Which stream a consumer binds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTarget {
    /// A stream referenced by name; consumes every subject in it.
    Named(String),
    /// The stream that captures this subject; consumes only that subject.
    Subject(String),
}

/// Everything needed to create one pull consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSpec {
    pub target: StreamTarget,
    pub delivery: DeliveryPolicy,
    /// Durable consumer name. `None` creates an ephemeral consumer.
    pub durable_name: Option<String>,
}

impl ConsumerSpec {
    /// Ephemeral consumer over every subject of a named stream.
    pub fn stream(name: impl Into<String>, delivery: DeliveryPolicy) -> Self {
        Self {
            target: StreamTarget::Named(name.into()),
            delivery,
            durable_name: None,
        }
    }

    /// Ephemeral consumer over one subject, wherever it is stored.
    pub fn subject(subject: impl Into<String>, delivery: DeliveryPolicy) -> Self {
        Self {
            target: StreamTarget::Subject(subject.into()),
            delivery,
            durable_name: None,
        }
    }

    pub fn durable(mut self, name: impl Into<String>) -> Self {
        self.durable_name = Some(name.into());
        self
    }
}
