//! Error type shared by every stream operation.
//!
//! `StreamError` groups failures by how the caller should react:
//!
//! **Setup errors** (fix configuration and restart):
//! - `ConfigError`: transport settings failed validation
//! - `Connect`: the broker could not be reached at startup
//! - `StreamLookup` / `ConsumerSetup`: the stream or consumer could not be bound
//!
//! **Runtime errors** (connection-level, fatal unless retrying):
//! - `Fetch`: a pull request failed for a reason other than its deadline
//! - `RetriesExhausted`: the retry budget ran out
//!
//! **Per-message errors** (log and move on):
//! - `Ack`: the broker did not accept an acknowledgement
//! - `Publish` / `Serialization`: an outbound message was not sent
//!
//! Broker errors are carried as strings. `async-nats` exposes a distinct error
//! kind per operation and none of them is matched on by callers.

use thiserror::Error;

use super::backoff::BackoffError;

#[derive(Debug, Error)]
pub enum StreamError {
    /// Transport configuration failed `validator` checks.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] validator::ValidationErrors),

    /// Initial connection to the broker failed.
    #[error("Connection error: {0}")]
    Connect(String),

    /// The stream could not be resolved by name or by subject.
    #[error("Stream lookup failed for '{target}': {reason}")]
    StreamLookup { target: String, reason: String },

    /// Creating the pull consumer on a resolved stream failed.
    #[error("Consumer setup failed on stream '{stream}': {reason}")]
    ConsumerSetup { stream: String, reason: String },

    /// A batch pull failed. Timeouts never surface here.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Acknowledging a single message failed.
    #[error("Acknowledgement error on '{subject}': {reason}")]
    Ack { subject: String, reason: String },

    /// Encoding an outbound payload failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broker client refused or dropped a publish.
    #[error("Publish error on '{subject}': {reason}")]
    Publish { subject: String, reason: String },

    /// Flushing pending client writes during shutdown failed.
    #[error("Flush error: {0}")]
    Flush(String),

    /// Backoff gave up after the configured number of attempts.
    #[error("Retry policy error: {0}")]
    RetriesExhausted(#[from] BackoffError),
}

impl StreamError {
    /// Whether the error describes a lost or unusable broker connection
    /// rather than a problem with one message.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            StreamError::Connect(_)
                | StreamError::StreamLookup { .. }
                | StreamError::ConsumerSetup { .. }
                | StreamError::Fetch(_)
                | StreamError::RetriesExhausted(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_error_display() {
        let err = StreamError::Fetch("no responders".into());
        assert_eq!(err.to_string(), "Fetch error: no responders");
    }

    #[test]
    fn test_ack_error_names_subject() {
        let err = StreamError::Ack {
            subject: "sensors.co2.bedroom".into(),
            reason: "timed out".into(),
        };
        assert!(err.to_string().contains("sensors.co2.bedroom"));
        assert!(!err.is_connection_level());
    }

    #[test]
    fn test_connection_level_classification() {
        assert!(StreamError::Connect("refused".into()).is_connection_level());
        assert!(StreamError::Fetch("closed".into()).is_connection_level());
        assert!(!StreamError::Flush("closed".into()).is_connection_level());
        assert!(!StreamError::Publish {
            subject: "alerts.co2".into(),
            reason: "closed".into()
        }
        .is_connection_level());
    }

    #[test]
    fn test_from_backoff_error() {
        let err: StreamError = BackoffError::MaxAttemptLimitError(3).into();
        assert!(err.is_connection_level());
        assert!(err.to_string().contains('3'));
    }
}
