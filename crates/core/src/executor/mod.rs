//! Compute Executor: The "Air Gap" Pattern
//!
//! This module provides the boundary between the Async Orchestration Layer
//! and the Blocking Compute Layer. It prevents CPU-intensive tasks from
//! starving the Tokio runtime.
//!
//! # The Problem
//!
//! CPU-bound operations (the JSON extractor's aggressive regex fallback,
//! word counting over large bodies) block the async reactor when called
//! directly from tokio::spawn. This causes:
//! - Stalled progress-reporting heartbeats
//! - Delayed LLM gateway timeouts
//! - Head-of-line blocking for other jobs sharing the worker
//!
//! # The Solution
//!
//! Use `tokio::task::spawn_blocking` to run compute tasks on a dedicated thread pool
//! that is separate from the async reactor threads.
//!
//! # Example
//!
//! ```no_run
//! use contentforge_core::executor::offload_compute;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // This would normally block the reactor
//!     let result = offload_compute(move || {
//!         // Expensive BLAKE3 hashing, delta generation, etc.
//!         expensive_cpu_task()
//!     }).await?;
//!
//!     Ok(())
//! }
//!
//! fn expensive_cpu_task() -> anyhow::Result<u64> {
//!     // Heavy CPU work here
//!     Ok(42)
//! }
//! ```

use anyhow::Result;
use tokio::task;

/// Offloads a heavy CPU task to a thread where blocking is acceptable.
///
/// This prevents starving the async reactor by running the task on
/// Tokio's blocking thread pool instead of the async worker threads.
///
/// # Parameters
///
/// - `task`: A closure that performs CPU-intensive work and returns a Result<T>
///
/// # Returns
///
/// The result of the task, or an error if the task panicked or failed
///
/// # Example
///
/// ```ignore
/// use contentforge_core::executor::offload_compute;
///
/// let hash = offload_compute(move || {
///     // This expensive hashing operation runs on a blocking thread
///     let mut hasher = blake3::Hasher::new();
///     hasher.update(&vec![0u8; 1_000_000]);
///     Ok(hasher.finalize().to_hex().to_string())
/// }).await?;
/// ```
pub async fn offload_compute<F, T>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(task)
        .await
        .map_err(|join_err| anyhow::anyhow!("Compute task panicked: {}", join_err))?
}

/// Offloads multiple independent compute tasks in parallel using Rayon.
///
/// This is useful for operations like parallel signature generation where
/// multiple blocks can be hashed independently.
///
/// # Parameters
///
/// - `items`: A vector of items to process
/// - `task`: A closure that processes each item
///
/// # Returns
///
/// A vector of results in the same order as the input items
///
/// # Example
///
/// ```ignore
/// use contentforge_core::executor::offload_parallel_compute;
///
/// let data_blocks = vec![vec![0u8; 1024]; 100];
/// let hashes = offload_parallel_compute(data_blocks, |block| {
///     let mut hasher = blake3::Hasher::new();
///     hasher.update(&block);
///     Ok(hasher.finalize().to_hex().to_string())
/// }).await?;
/// ```
pub async fn offload_parallel_compute<F, T, I>(items: Vec<I>, task: F) -> Result<Vec<T>>
where
    F: Fn(I) -> Result<T> + Send + Sync + 'static,
    T: Send + 'static,
    I: Send + 'static,
{
    task::spawn_blocking(move || {
        use rayon::prelude::*;
        items.into_par_iter().map(task).collect::<Result<Vec<T>>>()
    })
    .await
    .map_err(|join_err| anyhow::anyhow!("Parallel compute task panicked: {}", join_err))?
}
