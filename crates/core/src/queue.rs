//! Job Queue: FIFO admission queue and stall detection
//!
//! Workers pull job ids off a single FIFO channel; `admitted` keeps a given
//! job id from being queued twice while it's enqueued or running. The
//! system-wide call rate into the LLM gateway is capped separately, by the
//! shared [`contentforge_resilience::RateLimiter`] the scheduler hands to
//! Phase A and Phase B — this queue only governs which job ids are in
//! flight, not how fast their gateway calls run. A heartbeat monitor runs
//! alongside each job: if a job makes no progress within its heartbeat
//! window for too many windows in a row, it is abandoned rather than left
//! to run forever against a stuck upstream.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

/// A single-consumer-friendly FIFO of job ids. Multiple producers may
/// enqueue; typically a single worker loop dequeues.
///
/// `enqueue` rejects a `job_id` that is already admitted (enqueued or
/// currently running) rather than silently queueing a second task for it,
/// so only one pipeline ever runs for a given job. A job id is released
/// back for re-admission once the worker reports it `complete`.
pub struct JobQueue {
    sender: mpsc::Sender<String>,
    receiver: Mutex<mpsc::Receiver<String>>,
    admitted: Mutex<HashSet<String>>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
            admitted: Mutex::new(HashSet::new()),
        }
    }

    /// Admit a job id onto the end of the queue. Rejects the call if
    /// `job_id` is already admitted and not yet completed.
    pub async fn enqueue(&self, job_id: impl Into<String>) -> anyhow::Result<()> {
        let job_id = job_id.into();
        {
            let mut admitted = self.admitted.lock().await;
            if !admitted.insert(job_id.clone()) {
                anyhow::bail!("job {job_id} is already enqueued or running");
            }
        }
        self.sender.send(job_id).await.map_err(|_| {
            anyhow::anyhow!("job queue receiver has been dropped")
        })
    }

    /// Pull the next job id, waiting if the queue is empty. Returns `None`
    /// once every sender has been dropped and the queue is drained.
    pub async fn dequeue(&self) -> Option<String> {
        self.receiver.lock().await.recv().await
    }

    /// Release `job_id` so it may be re-admitted. Called by the worker loop
    /// once a job reaches a terminal state.
    pub async fn complete(&self, job_id: &str) {
        self.admitted.lock().await.remove(job_id);
    }
}

/// Tracks heartbeats for a single in-flight job. A "stall" is a heartbeat
/// check that finds no progress since the last beat within `window`.
/// Abandon the job once `stall_count` reaches `max_stalls`.
pub struct HeartbeatMonitor {
    last_beat: Mutex<Instant>,
    stall_count: AtomicU32,
    window: Duration,
    max_stalls: u32,
}

impl HeartbeatMonitor {
    pub fn new(window: Duration, max_stalls: u32) -> Self {
        Self {
            last_beat: Mutex::new(Instant::now()),
            stall_count: AtomicU32::new(0),
            window,
            max_stalls,
        }
    }

    /// Call this whenever the job makes observable progress (a Phase A
    /// response lands, a Phase B item completes). Resets the stall clock.
    pub async fn beat(&self) {
        *self.last_beat.lock().await = Instant::now();
        self.stall_count.store(0, Ordering::SeqCst);
    }

    /// Check whether the job has been silent for a full heartbeat window.
    /// Increments the stall counter on silence, resets it on activity.
    /// Returns `true` once `max_stalls` consecutive silent windows have
    /// elapsed — the caller should abandon the job.
    pub async fn check(&self) -> bool {
        let elapsed = self.last_beat.lock().await.elapsed();
        if elapsed >= self.window {
            let stalls = self.stall_count.fetch_add(1, Ordering::SeqCst) + 1;
            warn!(stalls, max = self.max_stalls, "job heartbeat window elapsed with no progress");
            stalls > self.max_stalls
        } else {
            false
        }
    }

    /// Runs `check()` on a timer until it returns `true`, at which point
    /// this future resolves. Intended to be raced against the job's actual
    /// work via `tokio::select!` — the job-work branch should `beat()` the
    /// same monitor as it makes progress.
    pub async fn watch_for_abandonment(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.window);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if self.check().await {
                info!("job exceeded max stalls, signaling abandonment");
                return;
            }
        }
    }
}
