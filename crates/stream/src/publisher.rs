//! JSON publishing with a shutdown drain barrier.
//!
//! Every publish registers itself with a shared [`PublishDrain`] for its whole
//! duration. Shutdown waits for the drain to reach zero before flushing the
//! client, so a message the application already handed over is never cut off
//! half way.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_nats::Client;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::debug;

use super::error::StreamError;

/// Counts publishes that are still in flight.
#[derive(Debug, Default)]
pub struct PublishDrain {
    inflight: AtomicUsize,
    notify: Notify,
}

impl PublishDrain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks one publish as started; it ends when the guard drops.
    pub fn enter(self: &Arc<Self>) -> PublishGuard {
        self.inflight.fetch_add(1, Ordering::AcqRel);
        PublishGuard {
            drain: Arc::clone(self),
        }
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    /// Resolves once no publish is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.notify.notified();
            if self.inflight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// RAII token for one in-flight publish.
pub struct PublishGuard {
    drain: Arc<PublishDrain>,
}

impl Drop for PublishGuard {
    fn drop(&mut self) {
        if self.drain.inflight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drain.notify.notify_waiters();
        }
    }
}

/// Serializes values as JSON and publishes them on core NATS subjects.
///
/// Cheap to clone; clones share the client and the drain.
#[derive(Clone)]
pub struct Publisher {
    client: Client,
    drain: Arc<PublishDrain>,
}

impl Publisher {
    pub(crate) fn new(client: Client, drain: Arc<PublishDrain>) -> Self {
        Self { client, drain }
    }

    /// Publishes `data` as JSON on `subject`.
    ///
    /// Delivery is fire-and-forget from the broker's point of view: success
    /// means the client accepted the message for sending.
    ///
    /// # Errors
    ///
    /// `Serialization` if `data` cannot be encoded, `Publish` if the client
    /// rejects the message.
    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        subject: &str,
        data: &T,
    ) -> Result<(), StreamError> {
        let _guard = self.drain.enter();
        let payload = serde_json::to_vec(data)?;

        debug!("Publishing {} bytes to '{}'", payload.len(), subject);

        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| StreamError::Publish {
                subject: subject.to_string(),
                reason: e.to_string(),
            })
    }
}
