//! ContentForge: embeddable bulk content generation pipeline
//!
//! Realizes the Admission API Surface as a plain library entry point
//! (`Pipeline`) that an embedding HTTP service, or the bundled CLI, calls
//! directly. Every dependency — stores, queue, LLM gateway, image adapter,
//! credit ledger — is constructed by the caller and handed to `Pipeline`;
//! there is no module-level singleton to initialize in any particular
//! order.

pub mod config;
pub mod error;
pub mod logging;

use contentforge_core::config::PipelineConfig;
use contentforge_core::manager::ProgressReporter;
use contentforge_core::queue::JobQueue;
use contentforge_core::scheduler::JobScheduler;
use contentforge_core::{
    Content, ContentStats, ContentStatus, ContentStore, CreditLedger, Job, JobStatus, JobStore,
    ScenarioStore, BLOG_TYPES, TONES,
};
use contentforge_images::ImageProvider;
use contentforge_llm::LlmGateway;
use error::{AdmissionError, RetrievalError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

/// Everything `submit_job` needs from a caller.
#[derive(Debug, Clone)]
pub struct SubmitJobRequest {
    pub niche: String,
    pub value_propositions: Vec<String>,
    pub tone: String,
    pub total_blogs: u32,
    pub blog_type_allocations: HashMap<String, u32>,
    pub target_word_count: u32,
    pub user_id: String,
    pub credits_cost: u32,
}

/// `get_status` response shape.
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobStatusView {
    pub status: JobStatus,
    pub progress: u8,
    pub total_content_generated: u32,
    pub total_blogs: u32,
    pub generated_titles: Vec<String>,
    pub error_message: Option<String>,
    pub estimated_seconds_remaining: Option<u32>,
}

/// `get_content` response shape: every Content row plus aggregate stats.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContentView {
    pub rows: Vec<Content>,
    pub stats: ContentStats,
}

fn validate_submission(req: &SubmitJobRequest) -> Result<(), AdmissionError> {
    if req.niche.trim().is_empty() {
        return Err(AdmissionError::EmptyNiche);
    }
    if req.user_id.trim().is_empty() {
        return Err(AdmissionError::EmptyUserId);
    }
    if req.value_propositions.is_empty() || req.value_propositions.len() > 10 {
        return Err(AdmissionError::InvalidValuePropositionCount(
            req.value_propositions.len(),
        ));
    }
    for (idx, vp) in req.value_propositions.iter().enumerate() {
        if vp.trim().is_empty() {
            return Err(AdmissionError::EmptyValueProposition(idx));
        }
    }
    if !TONES.contains(&req.tone.as_str()) {
        return Err(AdmissionError::InvalidTone(req.tone.clone()));
    }
    if req.total_blogs == 0 || req.total_blogs > 50 {
        return Err(AdmissionError::InvalidTotalBlogs(req.total_blogs));
    }
    let sum: u32 = BLOG_TYPES
        .iter()
        .map(|t| req.blog_type_allocations.get(*t).copied().unwrap_or(0))
        .sum();
    if sum != req.total_blogs {
        return Err(AdmissionError::AllocationSumMismatch {
            total_blogs: req.total_blogs,
            sum,
        });
    }
    if !(500..=2500).contains(&req.target_word_count) {
        return Err(AdmissionError::InvalidWordCount(req.target_word_count));
    }
    Ok(())
}

/// Estimated-seconds-remaining heuristic: 60s flat while researching,
/// `(N - done) * 10` while generating, `None` otherwise.
fn estimate_seconds_remaining(job: &Job) -> Option<u32> {
    match job.status {
        JobStatus::Enqueued | JobStatus::Researching => Some(60),
        JobStatus::Generating => {
            let remaining = job.total_blogs.saturating_sub(job.total_content_generated);
            Some(remaining * 10)
        }
        JobStatus::ResearchComplete => Some(60),
        JobStatus::Complete | JobStatus::PartialComplete | JobStatus::Failed => None,
    }
}

/// The Admission API Surface: accepts new jobs, exposes polling and
/// result-retrieval, and the cancel/delete operation. HTTP, auth, and the
/// credit ledger's own arithmetic are out of scope — this type is the
/// library boundary an HTTP layer would sit in front of.
pub struct Pipeline {
    job_store: Arc<dyn JobStore>,
    content_store: Arc<dyn ContentStore>,
    scenario_store: Arc<dyn ScenarioStore>,
    queue: Arc<JobQueue>,
    scheduler: Arc<JobScheduler>,
    reporter: ProgressReporter,
    guardian: JoinHandle<anyhow::Result<()>>,
}

impl Pipeline {
    /// Construct a pipeline from explicitly provided dependencies. Nothing
    /// here is a global; every caller gets its own wiring.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_store: Arc<dyn JobStore>,
        content_store: Arc<dyn ContentStore>,
        scenario_store: Arc<dyn ScenarioStore>,
        ledger: Arc<dyn CreditLedger>,
        gateway: Arc<dyn LlmGateway>,
        image_provider: Arc<dyn ImageProvider>,
        config: PipelineConfig,
        queue_capacity: usize,
    ) -> Self {
        let config = Arc::new(config);
        let (reporter, guardian) = ProgressReporter::spawn(job_store.clone());
        let queue = Arc::new(JobQueue::new(queue_capacity));
        let scheduler = Arc::new(JobScheduler::new(
            job_store.clone(),
            content_store.clone(),
            scenario_store.clone(),
            ledger,
            gateway,
            image_provider,
            config,
            reporter.clone(),
        ));

        Self {
            job_store,
            content_store,
            scenario_store,
            queue,
            scheduler,
            reporter,
            guardian,
        }
    }

    /// Validates inputs, creates the job row (status ENQUEUED), and admits
    /// it onto the queue. Rejected synchronously; never enqueued on
    /// failure.
    pub async fn submit_job(&self, req: SubmitJobRequest) -> anyhow::Result<String> {
        validate_submission(&req)?;

        let job_id = Uuid::new_v4().to_string();
        let job = Job {
            id: job_id.clone(),
            niche: req.niche,
            value_propositions: req.value_propositions,
            tone: req.tone,
            total_blogs: req.total_blogs,
            blog_type_allocations: req.blog_type_allocations,
            target_word_count: req.target_word_count,
            status: JobStatus::Enqueued,
            progress: 0,
            total_content_generated: 0,
            failed_content_count: 0,
            scenarios: Vec::new(),
            error_message: None,
            credits_cost: req.credits_cost,
            credits_refunded: 0,
            user_id: req.user_id,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        };

        self.job_store.create(&job).await?;
        self.queue
            .enqueue(job_id.clone())
            .await
            .map_err(|_| AdmissionError::DuplicateJob(job_id.clone()))?;

        info!(job_id = %job_id, niche = %job.niche, total_blogs = job.total_blogs, "job admitted");
        Ok(job_id)
    }

    /// Polls the current state of a job.
    pub async fn get_status(&self, job_id: &str) -> anyhow::Result<JobStatusView> {
        let job = self
            .job_store
            .get(job_id)
            .await?
            .ok_or_else(|| RetrievalError::JobNotFound(job_id.to_string()))?;

        let generated_titles = self
            .content_store
            .find_by_job_id(job_id)
            .await?
            .into_iter()
            .filter(|c| c.status == ContentStatus::Ok)
            .map(|c| c.blog_title)
            .collect();

        Ok(JobStatusView {
            estimated_seconds_remaining: estimate_seconds_remaining(&job),
            status: job.status,
            progress: job.progress,
            total_content_generated: job.total_content_generated,
            total_blogs: job.total_blogs,
            generated_titles,
            error_message: job.error_message,
        })
    }

    /// Returns every Content row and aggregate stats. Permitted only once
    /// the job has reached COMPLETE or PARTIAL_COMPLETE.
    pub async fn get_content(&self, job_id: &str) -> anyhow::Result<ContentView> {
        let job = self
            .job_store
            .get(job_id)
            .await?
            .ok_or_else(|| RetrievalError::JobNotFound(job_id.to_string()))?;

        if !matches!(job.status, JobStatus::Complete | JobStatus::PartialComplete) {
            return Err(RetrievalError::ContentNotReady(job.status).into());
        }

        let rows = self.content_store.find_by_job_id(job_id).await?;
        let stats = ContentStats::from_rows(&rows);
        Ok(ContentView { rows, stats })
    }

    /// Cancels the job if running and cascades delete of its scenarios and
    /// content. A no-op (not an error) if the job does not exist.
    pub async fn delete_job(&self, job_id: &str) -> anyhow::Result<()> {
        if self.job_store.get(job_id).await?.is_none() {
            return Ok(());
        }
        self.job_store.request_cancel(job_id).await?;
        self.scenario_store.delete_by_job_id(job_id).await?;
        self.content_store.delete_by_job_id(job_id).await?;
        self.job_store.delete_job(job_id).await?;
        self.queue.complete(job_id).await;
        Ok(())
    }

    /// Runs the worker loop forever, pulling job ids off the queue and
    /// driving each one through the scheduler to a terminal state. One job
    /// at a time per call to this method — run several concurrently (one
    /// task per call) to get more than one job in flight.
    pub async fn run_worker(&self) -> anyhow::Result<()> {
        while let Some(job_id) = self.queue.dequeue().await {
            let Some(job) = self.job_store.get(&job_id).await? else {
                self.queue.complete(&job_id).await;
                continue;
            };
            if job.status.is_terminal() {
                self.queue.complete(&job_id).await;
                continue;
            }
            if let Err(e) = self.scheduler.run_job(job).await {
                tracing::error!(job_id = %job_id, error = %e, "job run failed");
            }
            self.queue.complete(&job_id).await;
        }
        Ok(())
    }

    /// Flushes pending progress writes and stops the background guardian
    /// task. Call before dropping the pipeline to guarantee the last batch
    /// of progress updates has landed.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.reporter.shutdown().await;
        self.guardian.await??;
        Ok(())
    }
}
