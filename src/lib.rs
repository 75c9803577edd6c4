//! climatecore: stateful bounds alerting over a JetStream sensor stream
//!
//! Sensor readings arrive as JSON messages on a durable stream. Each reading
//! is checked against per-sensor `[min, max]` bounds that can be changed at
//! runtime through a config subject. When a sensor leaves its bounds an
//! "out of bounds" event is published on `<alerts prefix>.<sensor>`; when it
//! comes back, a "back to normal" event follows. Nothing is published in
//! between, however many readings arrive.
//!
//! ## Modules
//!
//! * `config`: TOML configuration with environment overrides, validated with
//!   the `validator` crate.
//!
//! * `core`: the alerting engine, config listener, bounds table, hysteresis
//!   trackers and the schema they share.
//!
//! * `logger`: `tracing` subscriber setup with console (compact, pretty,
//!   JSON) and systemd journald outputs.
//!
//! The broker side lives in the `climatecore-stream` crate.

pub mod config;
pub mod core;
pub mod logger;
