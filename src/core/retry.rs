//! Reaction to stream errors inside the long-running loops.

use climatecore_stream::{Backoff, StreamError};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use super::error::EngineError;
use crate::config::engine::StreamErrorPolicy;

/// Applies the configured [`StreamErrorPolicy`] for one loop.
#[derive(Debug)]
pub struct StreamErrorHandler {
    component: &'static str,
    policy: StreamErrorPolicy,
    backoff: Backoff,
}

impl StreamErrorHandler {
    pub fn new(component: &'static str, policy: StreamErrorPolicy, backoff: Backoff) -> Self {
        Self {
            component,
            policy,
            backoff,
        }
    }

    /// Resets the backoff after a successful poll.
    pub fn succeeded(&mut self) {
        self.backoff.reset();
    }

    /// Returns `Ok` when the loop should poll again.
    ///
    /// Errors about a single message are logged and never count against the
    /// policy. For connection-level ones, retry mode sleeps first, waking
    /// early if `cancel` fires.
    pub async fn handle(
        &mut self,
        err: StreamError,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        if !err.is_connection_level() {
            warn!("{} skipped a message: {}", self.component, err);
            return Ok(());
        }

        if self.policy == StreamErrorPolicy::FailFast {
            error!("{} failed: {}", self.component, err);
            return Err(EngineError::stream(self.component, err));
        }

        let delay = match self.backoff.next_sleep() {
            Ok(delay) => delay,
            Err(exhausted) => {
                error!("{} giving up after {}: {}", self.component, exhausted, err);
                return Err(EngineError::stream(self.component, exhausted.into()));
            }
        };

        warn!(
            "{} stream error (attempt {}), retrying in {:?}: {}",
            self.component,
            self.backoff.attempt(),
            delay,
            err
        );
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = sleep(delay) => {}
        }
        Ok(())
    }
}
