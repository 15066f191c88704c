//! Error taxonomy shared by the resilience primitives
//!
//! Mirrors the BLOCKED / RATE_LIMITED / TRANSIENT / FATAL split the LLM
//! Gateway interface exposes: callers classify a failure once, and the
//! circuit breaker and retry policy both key off the same classification.

use thiserror::Error;

/// An error crossing a resilience boundary (circuit breaker, rate limiter).
#[derive(Debug, Error, Clone)]
pub enum ResilienceError {
    /// Worth retrying: network blips, upstream 5xx, rate limits.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Not worth retrying on the same input: validation failure, content
    /// policy refusal on a prompt that will refuse again.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// The circuit is open; the call was not attempted.
    #[error("circuit open, next probe pending")]
    CircuitOpen,

    /// The rate limiter rejected the call without waiting (try_execute only).
    #[error("rate limit exceeded")]
    RateLimitExceeded,
}

impl ResilienceError {
    /// Whether the retry policy should re-attempt after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, ResilienceError::Transient(_))
    }

    /// Whether this error is known to be non-retryable.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ResilienceError::Permanent(_))
    }

    /// Whether a circuit breaker observing this error should count it as
    /// a failure towards its trip threshold. Circuit-open rejections are
    /// not themselves failures (the breaker already tripped).
    pub fn should_trip_breaker(&self) -> bool {
        !matches!(self, ResilienceError::CircuitOpen)
    }
}
