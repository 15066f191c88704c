//! Progress Reporter: asynchronous write-behind for job progress
//!
//! # The Disk Guardian Pattern
//!
//! Phase B can have up to C content generations in flight at once, each one
//! wanting to bump `progress`/`total_content_generated` the moment it lands.
//! Writing straight to the store from every completion would serialize Phase
//! B's fan-out behind SQLite lock contention. Instead, completions send a
//! fire-and-forget message into a channel; a single background task owns the
//! accumulator and performs the actual writes.
//!
//! ## Architecture
//!
//! ```text
//! item 1 done ──┐
//!               ├──► update_tx ──► ProgressReporter ──► per-job accumulator ──► DB
//! item 2 done ──┤     (fire-and-forget)                ▲
//! item 3 done ──┘                                      │
//!                                             Disk Guardian task
//!                                       (flushes on every update, debounced)
//! ```
//!
//! Unlike a high-throughput transfer job, a content pipeline job has at most
//! a few dozen completions total, so the guardian here flushes on (almost)
//! every update with a short debounce interval rather than waiting for a
//! large batch threshold.
//!
//! # Example
//!
//! ```no_run
//! use contentforge_core::{open, manager::ProgressReporter};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = open("jobs.db").await?;
//!     let (reporter, guardian_handle) = ProgressReporter::spawn(store);
//!
//!     reporter.report_content_completed("job-1", 4).await;
//!
//!     reporter.shutdown().await;
//!     guardian_handle.await??;
//!     Ok(())
//! }
//! ```

use crate::JobStore;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Configuration for the ProgressReporter's Disk Guardian task.
#[derive(Debug, Clone)]
pub struct ProgressReporterConfig {
    /// How long the guardian waits between flush attempts when the channel
    /// is otherwise quiet.
    pub flush_interval: Duration,
    /// Channel capacity for pending progress updates.
    pub channel_capacity: usize,
}

impl Default for ProgressReporterConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(200),
            channel_capacity: 4_096,
        }
    }
}

/// One completion event: a scenario finished (successfully or not) out of
/// `total` planned items for `job_id`.
#[derive(Debug, Clone)]
struct ProgressUpdate {
    job_id: String,
    total: u32,
}

/// Fire-and-forget handle Phase B workers hold to report completions.
/// Cheap to clone; every clone shares the same channel and background task.
#[derive(Clone)]
pub struct ProgressReporter {
    update_tx: mpsc::Sender<ProgressUpdate>,
    shutdown_tx: Arc<RwLock<Option<oneshot::Sender<()>>>>,
}

impl ProgressReporter {
    /// Spawn the reporter and its Disk Guardian task with default
    /// configuration.
    pub fn spawn(store: Arc<dyn JobStore>) -> (Self, JoinHandle<Result<()>>) {
        Self::spawn_with_config(store, ProgressReporterConfig::default())
    }

    /// Spawn with custom flush cadence.
    pub fn spawn_with_config(
        store: Arc<dyn JobStore>,
        config: ProgressReporterConfig,
    ) -> (Self, JoinHandle<Result<()>>) {
        let (update_tx, update_rx) = mpsc::channel(config.channel_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let guardian_handle =
            tokio::spawn(async move { run_persistence_loop(store, update_rx, shutdown_rx, config).await });

        let reporter = Self {
            update_tx,
            shutdown_tx: Arc::new(RwLock::new(Some(shutdown_tx))),
        };

        (reporter, guardian_handle)
    }

    /// Record that one more item out of `total` planned work items
    /// completed for `job_id`. Never blocks the caller on a store write; if
    /// the guardian has stopped, the update is silently dropped (there is
    /// nothing a Phase B worker can usefully do about it).
    pub async fn report_content_completed(&self, job_id: &str, total: u32) {
        let update = ProgressUpdate {
            job_id: job_id.to_string(),
            total,
        };
        if self.update_tx.send(update).await.is_err() {
            warn!(job_id, "progress reporter has stopped, dropping update");
        }
    }

    /// Signal the guardian to flush everything pending and stop. Callers
    /// should await the returned JoinHandle from `spawn` to know the flush
    /// actually landed.
    pub async fn shutdown(&self) {
        let mut shutdown = self.shutdown_tx.write().await;
        if let Some(tx) = shutdown.take() {
            let _ = tx.send(());
            info!("progress reporter shutdown signal sent");
        }
    }
}

/// `25 + floor(70 * completed / total)`, clamped below the 100 reserved for
/// job termination.
fn compute_progress(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 25;
    }
    let scaled = 25 + (70 * completed as u64) / total as u64;
    scaled.min(95) as u8
}

#[derive(Default)]
struct JobAccumulator {
    completed: u32,
    total: u32,
}

/// The Disk Guardian: owns the per-job completion counters and performs the
/// actual `update_progress` writes.
async fn run_persistence_loop(
    store: Arc<dyn JobStore>,
    mut update_rx: mpsc::Receiver<ProgressUpdate>,
    mut shutdown_rx: oneshot::Receiver<()>,
    config: ProgressReporterConfig,
) -> Result<()> {
    let mut accumulators: HashMap<String, JobAccumulator> = HashMap::new();
    let mut dirty: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut flush_timer = tokio::time::interval(config.flush_interval);
    flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!("progress reporter guardian started");

    loop {
        tokio::select! {
            Some(update) = update_rx.recv() => {
                let entry = accumulators.entry(update.job_id.clone()).or_default();
                entry.completed += 1;
                entry.total = update.total;
                dirty.insert(update.job_id);

                if dirty.len() >= 1 {
                    flush_dirty(&store, &accumulators, &mut dirty).await;
                }
            }

            _ = flush_timer.tick() => {
                if !dirty.is_empty() {
                    flush_dirty(&store, &accumulators, &mut dirty).await;
                }
            }

            _ = &mut shutdown_rx => {
                info!(pending = dirty.len(), "progress reporter guardian shutdown signal received");

                while let Ok(update) = update_rx.try_recv() {
                    let entry = accumulators.entry(update.job_id.clone()).or_default();
                    entry.completed += 1;
                    entry.total = update.total;
                    dirty.insert(update.job_id);
                }

                if !dirty.is_empty() {
                    flush_dirty(&store, &accumulators, &mut dirty).await;
                }

                info!("progress reporter guardian stopped gracefully");
                break;
            }
        }
    }

    Ok(())
}

async fn flush_dirty(
    store: &Arc<dyn JobStore>,
    accumulators: &HashMap<String, JobAccumulator>,
    dirty: &mut std::collections::HashSet<String>,
) {
    for job_id in dirty.drain() {
        let Some(acc) = accumulators.get(&job_id) else { continue };
        let progress = compute_progress(acc.completed, acc.total);
        debug!(job_id, progress, completed = acc.completed, total = acc.total, "flushing progress");
        if let Err(e) = store.update_progress(&job_id, progress, acc.completed).await {
            error!(job_id, error = %e, "failed to flush progress update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Job, JobStatus, Scenario};
    use std::sync::Mutex as StdMutex;

    struct MockStore {
        progress: StdMutex<HashMap<String, (u8, u32)>>,
    }

    impl MockStore {
        fn new() -> Self {
            Self {
                progress: StdMutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl JobStore for MockStore {
        async fn create(&self, _job: &Job) -> anyhow::Result<()> {
            Ok(())
        }

        async fn get(&self, _job_id: &str) -> anyhow::Result<Option<Job>> {
            Ok(None)
        }

        async fn update_progress(
            &self,
            job_id: &str,
            progress: u8,
            total_content_generated: u32,
        ) -> anyhow::Result<()> {
            self.progress
                .lock()
                .unwrap()
                .insert(job_id.to_string(), (progress, total_content_generated));
            Ok(())
        }

        async fn mark_researching(&self, _job_id: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn update_scenarios(&self, _job_id: &str, _scenarios: &[Scenario]) -> anyhow::Result<()> {
            Ok(())
        }

        async fn mark_research_complete(&self, _job_id: &str, _scenario_count: usize) -> anyhow::Result<()> {
            Ok(())
        }

        async fn mark_generating(&self, _job_id: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn mark_complete(
            &self,
            _job_id: &str,
            _status: JobStatus,
            _failed_content_count: u32,
            _credits_refunded: u32,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn mark_failed(&self, _job_id: &str, _error_message: String) -> anyhow::Result<()> {
            Ok(())
        }

        async fn delete_job(&self, _job_id: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn is_cancelled(&self, _job_id: &str) -> anyhow::Result<bool> {
            Ok(false)
        }

        async fn request_cancel(&self, _job_id: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_compute_progress_formula() {
        assert_eq!(compute_progress(0, 4), 25);
        assert_eq!(compute_progress(2, 4), 25 + 35);
        assert_eq!(compute_progress(4, 4), 95);
        assert_eq!(compute_progress(0, 0), 25);
    }

    #[tokio::test]
    async fn test_reporter_flushes_completions() {
        let store = Arc::new(MockStore::new());
        let (reporter, handle) = ProgressReporter::spawn_with_config(
            store.clone(),
            ProgressReporterConfig {
                flush_interval: Duration::from_millis(20),
                channel_capacity: 64,
            },
        );

        reporter.report_content_completed("job-1", 4).await;
        reporter.report_content_completed("job-1", 4).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        reporter.shutdown().await;
        handle.await.unwrap().unwrap();

        let progress = store.progress.lock().unwrap().get("job-1").cloned().unwrap();
        assert_eq!(progress, (25 + 35, 2));
    }

    #[tokio::test]
    async fn test_reporter_tracks_multiple_jobs_independently() {
        let store = Arc::new(MockStore::new());
        let (reporter, handle) = ProgressReporter::spawn(store.clone());

        reporter.report_content_completed("job-a", 2).await;
        reporter.report_content_completed("job-b", 10).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        reporter.shutdown().await;
        handle.await.unwrap().unwrap();

        let progress = store.progress.lock().unwrap();
        assert_eq!(progress.get("job-a"), Some(&(95u8, 1u32)));
        assert_eq!(progress.get("job-b"), Some(&(32u8, 1u32)));
    }
}
