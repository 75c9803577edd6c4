//! Errors surfaced by the config listener and the alerting engine.

use climatecore_stream::StreamError;
use thiserror::Error;

use super::hysteresis::HysteresisError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{component} stopped on stream error: {source}")]
    Stream {
        component: &'static str,
        #[source]
        source: StreamError,
    },

    #[error("hysteresis state error: {0}")]
    Hysteresis(#[from] HysteresisError),

    #[error("{0} task terminated unexpectedly")]
    TaskAborted(&'static str),
}

impl EngineError {
    pub fn stream(component: &'static str, source: StreamError) -> Self {
        Self::Stream { component, source }
    }
}
