//! Bounds alerting core.
//!
//! - [`schema`]: validated reading, bounds and alert records
//! - [`bounds`]: the shared bounds table
//! - [`listener`]: config listener task writing the table
//! - [`hysteresis`]: per-subject and global alert suppression
//! - [`engine`]: the fetch/evaluate/ack/publish loop
//! - [`source`] and [`publisher`]: seams to the broker

pub mod bounds;
pub mod engine;
pub mod error;
pub mod hysteresis;
pub mod listener;
pub mod publisher;
pub mod retry;
pub mod schema;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;
