//! Typed failure conditions of the engine.
//!
//! Store functions return `anyhow::Result` and carry these values inside the
//! `anyhow::Error`, so callers that care about a specific condition can test for
//! it with [`ConductorError::matches`] or `downcast_ref`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConductorError {
    /// The sampler got no candidate with a positive weight.
    #[error("no viable candidate to choose from")]
    EmptyDomain,

    /// A weight handed to the sampler was negative or not a number.
    #[error("invalid sampling weight {0}")]
    InvalidWeight(f64),

    /// A chain or configuration value that cannot be used.
    #[error("misconfiguration: {0}")]
    Misconfiguration(String),

    /// Feedback was requested before any transition was recorded.
    #[error("no pending transition to apply feedback to")]
    NoPendingTransition,

    /// A transition handle that does not exist in the history log.
    #[error("unknown transition handle {0}")]
    UnknownTransition(i64),

    /// A track id that does not exist in the catalog.
    #[error("track {0} does not exist")]
    TrackNotFound(i64),
}

impl ConductorError {
    /// True if `err` wraps this exact condition.
    #[must_use]
    pub fn matches(&self, err: &anyhow::Error) -> bool {
        err.downcast_ref::<ConductorError>() == Some(self)
    }
}
