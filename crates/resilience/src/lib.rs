//! ContentForge Resilience: Pure-logic fault tolerance primitives
//!
//! # Overview
//!
//! This crate provides building blocks for creating resilient systems that can handle
//! transient failures in external services. It includes:
//!
//! - **Circuit Breaker**: Prevents cascading failures by failing fast when a service is unhealthy
//! - **Rate Limiter**: Token-based rate limiting to prevent overwhelming external services
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Storage systems (databases, file systems)
//! - Network protocols or transports
//! - Application-specific concerns
//!
//! It provides generic, composable fault-tolerance patterns that can be used across any layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Your Application                │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Circuit Breaker                   │  ← Fail-fast protection
//! │  (Tracks failures, opens on threshold)  │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Rate Limiter                      │  ← Prevent overload
//! │  (Token bucket, enforces quotas)        │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//!         External Service
//!        (LLM gateway, image provider)
//! ```
//!
//! # Usage Example
//!
//! ## Basic Circuit Breaker
//!
//! ```no_run
//! use contentforge_resilience::{CircuitBreaker, CircuitBreakerConfig, ResilienceError};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), ResilienceError> {
//! let config = CircuitBreakerConfig {
//!     failure_threshold: 5,
//!     success_threshold: 2,
//!     cooldown: Duration::from_secs(60),
//!     ..Default::default()
//! };
//!
//! let breaker = CircuitBreaker::new(config);
//!
//! // Execute operation with retry and circuit breaker protection
//! let result = breaker.execute(|| async {
//!     // Your potentially failing operation
//!     Ok::<_, ResilienceError>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Rate Limiter
//!
//! ```no_run
//! use contentforge_resilience::{RateLimiter, ResilienceError};
//!
//! # async fn example() -> Result<(), ResilienceError> {
//! let limiter = RateLimiter::per_second(5);
//!
//! let result = limiter.execute(|| async {
//!     Ok::<_, ResilienceError>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod error;
pub mod rate_limiter;

// Re-export main types for convenience
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::ResilienceError;
pub use rate_limiter::RateLimiter;

#[cfg(feature = "governor-impl")]
pub use rate_limiter::governor_impl::GovernorRateLimiter;

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use contentforge_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
    pub use super::error::ResilienceError;
    pub use super::rate_limiter::RateLimiter;
}
