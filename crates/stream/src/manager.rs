//! High-level entry point that coordinates all stream components.
//!
//! The `StreamManager` validates the transport configuration, connects the
//! client, opens the JetStream context and hands back a [`StreamInstance`].
//! The instance is what the application works with:
//!
//! 1. `pull_consumer(&spec)` binds a pull consumer to a stream or subject
//! 2. `publisher()` gives a cloneable JSON publisher
//! 3. `supervisor()` watches the connection for the lifetime of the process
//! 4. `shutdown()` drains publishes and flushes the client
//!
//! # Typical Usage
//!
//! ```ignore
//! let instance = StreamManager::from_config(config)?.connect().await?;
//! let _monitor = instance.supervisor().monitor();
//!
//! let publisher = instance.publisher();
//! publisher.publish("alerts.climatecore.co2", &event).await?;
//!
//! instance.shutdown().await?;
//! ```

use std::sync::Arc;

use async_nats::{jetstream, Client};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use validator::Validate;

use super::{
    client::ClientBuilder,
    config::{Config, ConsumerSpec},
    consumer::PullConsumer,
    error::StreamError,
    publisher::{PublishDrain, Publisher},
    state::ConnectionState,
    supervisor::Supervisor,
};

/// Builds a connected [`StreamInstance`] from configuration.
pub struct StreamManager {
    config: Config,
    cancel_token: CancellationToken,
}

impl StreamManager {
    /// Creates a manager from a configuration struct.
    ///
    /// # Errors
    ///
    /// `StreamError::ConfigError` if the configuration fails validation.
    pub fn from_config(config: Config) -> Result<Self, StreamError> {
        config.validate()?;
        Ok(Self {
            config,
            cancel_token: CancellationToken::new(),
        })
    }

    /// Creates a manager for `server` with every other setting at its default.
    pub fn new(server: impl Into<String>) -> Result<Self, StreamError> {
        Self::from_config(Config {
            server: server.into(),
            ..Default::default()
        })
    }

    /// Connects to the broker and opens the JetStream context.
    ///
    /// # Errors
    ///
    /// `StreamError::Connect` if the server cannot be reached.
    pub async fn connect(self) -> Result<StreamInstance, StreamError> {
        info!(
            "Building stream infrastructure for '{}' ({})",
            self.config.server, self.config.connection_name
        );

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let state_tx = Arc::new(state_tx);

        let client = ClientBuilder::from_config(&self.config)
            .with_state_sender(state_tx)
            .connect()
            .await?;

        let jetstream = jetstream::new(client.clone());
        info!("Stream infrastructure built successfully");

        Ok(StreamInstance {
            client,
            jetstream,
            state_rx,
            cancel_token: self.cancel_token,
            publish_drain: Arc::new(PublishDrain::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Token that stops every task derived from the instance.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

/// A connected broker session.
pub struct StreamInstance {
    client: Client,
    jetstream: jetstream::Context,
    state_rx: watch::Receiver<ConnectionState>,
    cancel_token: CancellationToken,
    publish_drain: Arc<PublishDrain>,
}

impl StreamInstance {
    /// Creates a pull consumer as described by `spec`.
    ///
    /// # Errors
    ///
    /// `StreamLookup` or `ConsumerSetup`; see [`PullConsumer`].
    pub async fn pull_consumer(&self, spec: &ConsumerSpec) -> Result<PullConsumer, StreamError> {
        PullConsumer::create(&self.jetstream, spec).await
    }

    /// Returns a publisher sharing this instance's drain barrier.
    pub fn publisher(&self) -> Publisher {
        Publisher::new(self.client.clone(), self.publish_drain.clone())
    }

    pub fn supervisor(&self) -> Supervisor {
        Supervisor::new(self.state_rx.clone(), self.cancel_token.clone())
    }

    pub fn current_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Stops background tasks, waits for in-flight publishes and flushes.
    ///
    /// # Errors
    ///
    /// `StreamError::Flush` if buffered messages could not be written out.
    pub async fn shutdown(self) -> Result<(), StreamError> {
        info!("Shutting down stream instance");
        self.cancel_token.cancel();

        debug!(
            "Waiting for {} in-flight publish(es)",
            self.publish_drain.inflight()
        );
        self.publish_drain.wait_idle().await;

        self.client
            .flush()
            .await
            .map_err(|e| StreamError::Flush(e.to_string()))?;

        info!("Stream instance shut down");
        Ok(())
    }
}
