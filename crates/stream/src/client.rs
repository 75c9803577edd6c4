//! Broker client construction.
//!
//! `ClientBuilder` turns a validated [`Config`] into `async_nats::ConnectOptions`
//! and wires the client's event callback into a `watch` channel of
//! [`ConnectionState`]. Every broker event is also logged, so a disconnect or
//! server error is visible even when nothing is watching the channel.
//!
//! ```ignore
//! let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
//! let client = ClientBuilder::from_config(&config)
//!     .with_state_sender(Arc::new(state_tx))
//!     .connect()
//!     .await?;
//! ```

use std::sync::Arc;

use async_nats::{Client, ConnectOptions, Event};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{config::Config, error::StreamError, state::ConnectionState};

/// Builder for a connected `async_nats::Client`.
pub struct ClientBuilder {
    server: String,
    options: ConnectOptions,
    state_tx: Option<Arc<watch::Sender<ConnectionState>>>,
}

impl ClientBuilder {
    /// Creates a builder from transport configuration.
    ///
    /// Credentials are applied when present; `max_reconnects = 0` leaves the
    /// client reconnecting forever.
    pub fn from_config(config: &Config) -> Self {
        let mut options = ConnectOptions::new()
            .connection_timeout(config.connection_timeout())
            .ping_interval(config.ping_interval())
            .request_timeout(Some(config.request_timeout()))
            .max_reconnects(Self::reconnect_limit(config.max_reconnects));

        if !config.connection_name.is_empty() {
            options = options.name(&config.connection_name);
        }

        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            options = options.user_and_password(user.clone(), password.clone());
        } else if let Some(token) = &config.token {
            options = options.token(token.clone());
        }

        Self {
            server: config.server.clone(),
            options,
            state_tx: None,
        }
    }

    fn reconnect_limit(max_reconnects: usize) -> Option<usize> {
        (max_reconnects > 0).then_some(max_reconnects)
    }

    /// Publishes connection state transitions on the given channel.
    pub fn with_state_sender(mut self, state_tx: Arc<watch::Sender<ConnectionState>>) -> Self {
        self.state_tx = Some(state_tx);
        self
    }

    /// Connects to the broker.
    ///
    /// # Errors
    ///
    /// `StreamError::Connect` when the server cannot be reached within the
    /// connection timeout.
    pub async fn connect(self) -> Result<Client, StreamError> {
        let state_tx = self.state_tx;
        let options = self.options.event_callback(move |event| {
            let state_tx = state_tx.clone();
            async move {
                let next = Self::state_for_event(&event);
                if let (Some(tx), Some(state)) = (state_tx, next) {
                    tx.send_replace(state);
                }
            }
        });

        info!("Connecting to NATS server at {}", self.server);
        let client = options
            .connect(self.server.as_str())
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        info!("Connected to NATS server at {}", self.server);
        Ok(client)
    }

    /// Logs a broker event and maps it to a connection state, if it implies one.
    fn state_for_event(event: &Event) -> Option<ConnectionState> {
        match event {
            Event::Connected => {
                info!("NATS connection established");
                Some(ConnectionState::Connected)
            }
            Event::Disconnected => {
                warn!("NATS connection lost, reconnecting");
                Some(ConnectionState::Disconnected("connection lost".into()))
            }
            Event::Closed => {
                error!("NATS connection closed");
                Some(ConnectionState::Closed)
            }
            Event::ServerError(e) => {
                warn!("NATS server error: {}", e);
                None
            }
            Event::ClientError(e) => {
                warn!("NATS client error: {}", e);
                None
            }
            other => {
                debug!("NATS event: {}", other);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_limit_zero_is_unlimited() {
        assert_eq!(ClientBuilder::reconnect_limit(0), None);
        assert_eq!(ClientBuilder::reconnect_limit(5), Some(5));
    }

    #[test]
    fn test_event_state_mapping() {
        assert_eq!(
            ClientBuilder::state_for_event(&Event::Connected),
            Some(ConnectionState::Connected)
        );
        assert!(matches!(
            ClientBuilder::state_for_event(&Event::Disconnected),
            Some(ConnectionState::Disconnected(_))
        ));
        assert_eq!(
            ClientBuilder::state_for_event(&Event::Closed),
            Some(ConnectionState::Closed)
        );
        assert_eq!(ClientBuilder::state_for_event(&Event::SlowConsumer(1)), None);
    }

    #[test]
    fn test_builder_keeps_server() {
        let config = Config {
            server: "nats://broker.local:4222".into(),
            ..Default::default()
        };
        let builder = ClientBuilder::from_config(&config);
        assert_eq!(builder.server, "nats://broker.local:4222");
        assert!(builder.state_tx.is_none());
    }
}
