//! # climatecore-stream: JetStream pull consumption and publishing
//!
//! A thin, opinionated adapter over `async-nats` that gives the alerting
//! engine exactly the stream semantics it needs and nothing more:
//!
//! - **Batch fetch with bounded wait**: `PullConsumer::fetch_batch` returns up
//!   to `max` messages, or an empty batch once the wait elapses
//! - **Individual acknowledgement** of each delivered message
//! - **Consumer placement policies**: fresh-start (`New`), latest message per
//!   subject (`LastPerSubject`) and latest message overall (`Last`)
//! - **Connection state monitoring** through a `watch` channel
//! - **Drained shutdown**: in-flight publishes finish before the client flushes
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │     Application Layer                │
//! │ (alerting engine, config listener)   │
//! └────────────┬─────────────────────────┘
//!              │
//! ┌────────────▼─────────────────────────┐
//! │     High-Level API                   │
//! │ StreamManager, PullConsumer,         │
//! │ Publisher, Supervisor                │
//! └────────────┬─────────────────────────┘
//!              │
//! ┌────────────▼─────────────────────────┐
//! │     async-nats                       │
//! │ Client, jetstream::Context, Consumer │
//! └──────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use climatecore_stream::{ConsumerSpec, DeliveryPolicy, StreamManager};
//!
//! let instance = StreamManager::from_config(config)?.connect().await?;
//! let consumer = instance
//!     .pull_consumer(&ConsumerSpec::stream("sensors_environmental", DeliveryPolicy::New))
//!     .await?;
//!
//! for message in consumer.fetch_batch(10, Duration::from_secs(2)).await? {
//!     // evaluate...
//!     consumer.ack(&message).await?;
//! }
//! ```
//!
//! # Error Handling
//!
//! Every fallible operation returns [`Result<T>`], an alias over
//! [`StreamError`]. A fetch that yields nothing before its deadline is *not*
//! an error; it is an empty batch.

pub mod backoff;
pub mod client;
pub mod config;
pub mod consumer;
pub mod error;
pub mod manager;
pub mod publisher;
pub mod state;
pub mod subject;
pub mod supervisor;

pub use backoff::Backoff;
pub use config::{Config, ConsumerSpec, DeliveryPolicy, StreamTarget};
pub use consumer::{InboundMessage, PullConsumer};
pub use error::StreamError;
pub use manager::{StreamInstance, StreamManager};
pub use publisher::Publisher;
pub use state::ConnectionState;
pub use supervisor::Supervisor;

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;
