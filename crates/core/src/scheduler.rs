//! Job Scheduler: drives one job through the state machine
//!
//! Consumes a job, routes it through Phase A then Phase B, persists every
//! transition, and reports progress along the way. One `JobScheduler` is
//! shared across the worker pool; `run_job` is the per-job unit of work a
//! worker pulled off the [`crate::queue::JobQueue`].

use crate::config::PipelineConfig;
use crate::manager::ProgressReporter;
use crate::phase_a::{self, PhaseAError};
use crate::phase_b;
use crate::{ContentStore, CreditLedger, Job, JobStatus, JobStore, ScenarioStore};
use contentforge_images::ImageProvider;
use contentforge_llm::LlmGateway;
use contentforge_resilience::RateLimiter;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct JobScheduler {
    job_store: Arc<dyn JobStore>,
    content_store: Arc<dyn ContentStore>,
    scenario_store: Arc<dyn ScenarioStore>,
    ledger: Arc<dyn CreditLedger>,
    gateway: Arc<dyn LlmGateway>,
    image_provider: Arc<dyn ImageProvider>,
    config: Arc<PipelineConfig>,
    reporter: ProgressReporter,
    /// Shared across every job this scheduler drives — the one instance is
    /// the system-wide gate, not a per-job one.
    rate_limiter: Arc<RateLimiter>,
}

impl JobScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_store: Arc<dyn JobStore>,
        content_store: Arc<dyn ContentStore>,
        scenario_store: Arc<dyn ScenarioStore>,
        ledger: Arc<dyn CreditLedger>,
        gateway: Arc<dyn LlmGateway>,
        image_provider: Arc<dyn ImageProvider>,
        config: Arc<PipelineConfig>,
        reporter: ProgressReporter,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_max_per_window,
            config.rate_limit_window(),
        ));
        Self {
            job_store,
            content_store,
            scenario_store,
            ledger,
            gateway,
            image_provider,
            config,
            reporter,
            rate_limiter,
        }
    }

    /// Drives `job` from ENQUEUED to one of COMPLETE / PARTIAL_COMPLETE /
    /// FAILED. Every transition is persisted before the next phase starts.
    pub async fn run_job(&self, job: Job) -> anyhow::Result<()> {
        let job_id = job.id.clone();
        info!(job_id = %job_id, "worker picked up job, transitioning to RESEARCHING");
        self.job_store.mark_researching(&job_id).await?;

        let scenarios = match phase_a::run_phase_a(
            self.gateway.as_ref(),
            self.image_provider.as_ref(),
            self.rate_limiter.as_ref(),
            &self.config,
            &job.niche,
            &job.value_propositions,
            &job.tone,
            job.total_blogs,
            &job.blog_type_allocations,
        )
        .await
        {
            Ok(scenarios) => scenarios,
            Err(err) => {
                warn!(job_id = %job_id, error = %err, "phase A failed terminally, marking job FAILED");
                self.job_store
                    .mark_failed(&job_id, phase_a_error_message(&err))
                    .await?;
                return Ok(());
            }
        };

        self.scenario_store.save_scenarios(&job_id, &scenarios).await?;
        self.job_store.update_scenarios(&job_id, &scenarios).await?;
        self.job_store
            .mark_research_complete(&job_id, scenarios.len())
            .await?;

        info!(job_id = %job_id, count = scenarios.len(), "research complete, starting generation");
        self.job_store.mark_generating(&job_id).await?;

        // phase_b's per-item cancellation check is synchronous, so a
        // background poll keeps a shared flag current rather than blocking
        // the fan-out loop on a store round-trip before every dispatch.
        let cancelled_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let poll_handle = {
            let job_store = self.job_store.clone();
            let job_id = job_id.clone();
            let flag = cancelled_flag.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(std::time::Duration::from_secs(2));
                loop {
                    interval.tick().await;
                    if job_store.is_cancelled(&job_id).await.unwrap_or(false) {
                        flag.store(true, std::sync::atomic::Ordering::SeqCst);
                        break;
                    }
                }
            })
        };
        let is_cancelled = {
            let flag = cancelled_flag.clone();
            move || flag.load(std::sync::atomic::Ordering::SeqCst)
        };

        let content_rows = phase_b::run_phase_b(
            &job_id,
            &scenarios,
            &job.niche,
            &job.value_propositions,
            &job.tone,
            job.total_blogs,
            &job.blog_type_allocations,
            job.target_word_count,
            self.gateway.clone(),
            self.config.clone(),
            self.rate_limiter.clone(),
            self.reporter.clone(),
            is_cancelled,
        )
        .await;
        poll_handle.abort();

        if cancelled_flag.load(std::sync::atomic::Ordering::SeqCst) {
            info!(job_id = %job_id, "cancellation observed after phase B returned, exiting without side effects");
            return Ok(());
        }

        for content in &content_rows {
            if let Err(e) = self.content_store.insert(content).await {
                error!(job_id = %job_id, scenario_id = content.scenario_id, error = %e, "failed to persist content row");
            }
        }

        let total = content_rows.len() as u32;
        let failures = content_rows
            .iter()
            .filter(|c| c.status == crate::ContentStatus::Failed)
            .count() as u32;
        let successes = total - failures;

        let status = phase_b::terminal_status(successes, job.total_blogs);
        let refund = phase_b::compute_refund(job.credits_cost, job.total_blogs, failures);

        if refund > 0 {
            self.ledger
                .add_credits(
                    &job.user_id,
                    refund,
                    "job_refund",
                    &job_id,
                    "partial completion refund",
                )
                .await?;
        }

        self.job_store
            .mark_complete(&job_id, status, failures, refund)
            .await?;

        info!(job_id = %job_id, %status, successes, failures, refund, "job reached terminal state");
        Ok(())
    }
}

fn phase_a_error_message(err: &PhaseAError) -> String {
    match err {
        PhaseAError::PromptBlocked(reason) => format!("research prompt blocked: {reason}"),
        PhaseAError::EmptyResponse => "research call returned an empty response".to_string(),
        PhaseAError::UnparseableJson(preview) => format!("could not parse research output: {preview}"),
        PhaseAError::Underfilled { found, required } => {
            format!("only {found} of {required} required scenarios passed validation")
        }
        PhaseAError::RateLimited => "research call was rate limited on every attempt".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Content, ContentStats, ContentStatus, NullCreditLedger, RecordingCreditLedger, Scenario};
    use contentforge_images::NullImageProvider;
    use contentforge_llm::{ScriptedLlmGateway, ScriptedResponse};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Mutex as AsyncMutex;

    struct InMemoryStore {
        job: AsyncMutex<Job>,
        cancelled: StdMutex<bool>,
    }

    #[async_trait::async_trait]
    impl JobStore for InMemoryStore {
        async fn create(&self, _job: &Job) -> anyhow::Result<()> {
            Ok(())
        }

        async fn get(&self, _job_id: &str) -> anyhow::Result<Option<Job>> {
            Ok(Some(self.job.lock().await.clone()))
        }

        async fn update_progress(&self, _job_id: &str, progress: u8, total: u32) -> anyhow::Result<()> {
            let mut job = self.job.lock().await;
            job.progress = progress;
            job.total_content_generated = total;
            Ok(())
        }

        async fn mark_researching(&self, _job_id: &str) -> anyhow::Result<()> {
            let mut job = self.job.lock().await;
            job.status = JobStatus::Researching;
            job.progress = 5;
            Ok(())
        }

        async fn update_scenarios(&self, _job_id: &str, scenarios: &[Scenario]) -> anyhow::Result<()> {
            self.job.lock().await.scenarios = scenarios.to_vec();
            Ok(())
        }

        async fn mark_research_complete(&self, _job_id: &str, _scenario_count: usize) -> anyhow::Result<()> {
            let mut job = self.job.lock().await;
            job.status = JobStatus::ResearchComplete;
            job.progress = 20;
            Ok(())
        }

        async fn mark_generating(&self, _job_id: &str) -> anyhow::Result<()> {
            let mut job = self.job.lock().await;
            job.status = JobStatus::Generating;
            job.progress = 25;
            Ok(())
        }

        async fn mark_complete(
            &self,
            _job_id: &str,
            status: JobStatus,
            failed_content_count: u32,
            credits_refunded: u32,
        ) -> anyhow::Result<()> {
            let mut job = self.job.lock().await;
            job.status = status;
            job.failed_content_count = failed_content_count;
            job.credits_refunded = credits_refunded;
            job.progress = 100;
            Ok(())
        }

        async fn mark_failed(&self, _job_id: &str, error_message: String) -> anyhow::Result<()> {
            let mut job = self.job.lock().await;
            job.status = JobStatus::Failed;
            job.error_message = Some(error_message);
            Ok(())
        }

        async fn delete_job(&self, _job_id: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn is_cancelled(&self, _job_id: &str) -> anyhow::Result<bool> {
            Ok(*self.cancelled.lock().unwrap())
        }

        async fn request_cancel(&self, _job_id: &str) -> anyhow::Result<()> {
            *self.cancelled.lock().unwrap() = true;
            Ok(())
        }
    }

    struct InMemoryContentStore {
        rows: AsyncMutex<Vec<Content>>,
    }

    #[async_trait::async_trait]
    impl ContentStore for InMemoryContentStore {
        async fn insert(&self, content: &Content) -> anyhow::Result<()> {
            self.rows.lock().await.push(content.clone());
            Ok(())
        }

        async fn find_by_job_id(&self, job_id: &str) -> anyhow::Result<Vec<Content>> {
            Ok(self
                .rows
                .lock()
                .await
                .iter()
                .filter(|c| c.job_id == job_id)
                .cloned()
                .collect())
        }

        async fn delete_by_job_id(&self, job_id: &str) -> anyhow::Result<()> {
            self.rows.lock().await.retain(|c| c.job_id != job_id);
            Ok(())
        }
    }

    struct InMemoryScenarioStore;

    #[async_trait::async_trait]
    impl ScenarioStore for InMemoryScenarioStore {
        async fn save_scenarios(&self, _job_id: &str, _scenarios: &[Scenario]) -> anyhow::Result<()> {
            Ok(())
        }

        async fn list_scenarios(&self, _job_id: &str) -> anyhow::Result<Vec<Scenario>> {
            Ok(Vec::new())
        }

        async fn delete_by_job_id(&self, _job_id: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn scenario_json(n: usize) -> String {
        let items: Vec<String> = (0..n)
            .map(|i| {
                format!(
                    r#"{{"persona_name": "Persona {i}", "persona_archetype": "Hobbyist", "pain_point_detail": "struggles with swarming hives every spring", "goal_focus": "calmer colonies", "blog_topic_headline": "How to keep bees calm"}}"#
                )
            })
            .collect();
        format!(r#"{{"scenarios": [{}]}}"#, items.join(","))
    }

    /// `PipelineConfig::default`'s rate limit (10 per 60s) is right for
    /// production but would make these tests wait seconds per gateway call;
    /// keep everything else default and just widen the rate limit.
    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            rate_limit_window_secs: 1,
            rate_limit_max_per_window: 1_000,
            ..PipelineConfig::default()
        }
    }

    fn base_job() -> Job {
        let mut allocations = HashMap::new();
        allocations.insert("functional".to_string(), 1);
        allocations.insert("transactional".to_string(), 1);
        allocations.insert("commercial".to_string(), 1);
        allocations.insert("informational".to_string(), 1);

        Job {
            id: "job-1".to_string(),
            niche: "urban beekeeping".to_string(),
            value_propositions: vec!["hive kits with training".to_string()],
            tone: "friendly".to_string(),
            total_blogs: 4,
            blog_type_allocations: allocations,
            target_word_count: 1000,
            status: JobStatus::Enqueued,
            progress: 0,
            total_content_generated: 0,
            failed_content_count: 0,
            scenarios: Vec::new(),
            error_message: None,
            credits_cost: 100,
            credits_refunded: 0,
            user_id: "user-1".to_string(),
            created_at: chrono::DateTime::from_timestamp(0, 0).unwrap(),
            started_at: None,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn test_happy_path_reaches_complete() {
        let job = base_job();
        let store = Arc::new(InMemoryStore {
            job: AsyncMutex::new(job.clone()),
            cancelled: StdMutex::new(false),
        });
        let content_store = Arc::new(InMemoryContentStore {
            rows: AsyncMutex::new(Vec::new()),
        });

        let gateway = Arc::new(
            ScriptedLlmGateway::new()
                .with_research(ScriptedResponse::Text(scenario_json(20)))
                .with_generate(ScriptedResponse::Text(format!(
                    "# Article\n\n{}\n\n## FAQ\n\nQ/A",
                    "word ".repeat(1200)
                ))),
        );

        let (reporter, _handle) = ProgressReporter::spawn(store.clone());
        let scheduler = JobScheduler::new(
            store.clone(),
            content_store.clone(),
            Arc::new(InMemoryScenarioStore),
            Arc::new(NullCreditLedger),
            gateway,
            Arc::new(NullImageProvider),
            Arc::new(fast_config()),
            reporter,
        );

        scheduler.run_job(job).await.unwrap();

        let final_job = store.job.lock().await.clone();
        assert_eq!(final_job.status, JobStatus::Complete);
        assert_eq!(final_job.credits_refunded, 0);

        let rows = content_store.find_by_job_id("job-1").await.unwrap();
        assert_eq!(rows.len(), 4);
        let ids: std::collections::HashSet<u32> = rows.iter().map(|c| c.scenario_id).collect();
        assert_eq!(ids, (1..=4).collect());
    }

    #[tokio::test]
    async fn test_phase_a_failure_marks_job_failed() {
        let job = base_job();
        let store = Arc::new(InMemoryStore {
            job: AsyncMutex::new(job.clone()),
            cancelled: StdMutex::new(false),
        });
        let content_store = Arc::new(InMemoryContentStore {
            rows: AsyncMutex::new(Vec::new()),
        });

        let gateway = Arc::new(ScriptedLlmGateway::new().with_research(ScriptedResponse::Text(scenario_json(3))));

        let (reporter, _handle) = ProgressReporter::spawn(store.clone());
        let scheduler = JobScheduler::new(
            store.clone(),
            content_store,
            Arc::new(InMemoryScenarioStore),
            Arc::new(NullCreditLedger),
            gateway,
            Arc::new(NullImageProvider),
            Arc::new(fast_config()),
            reporter,
        );

        scheduler.run_job(job).await.unwrap();

        let final_job = store.job.lock().await.clone();
        assert_eq!(final_job.status, JobStatus::Failed);
        assert!(final_job.error_message.is_some());
    }

    #[tokio::test]
    async fn test_credit_ledger_receives_refund_on_partial_completion() {
        let ledger = Arc::new(RecordingCreditLedger::new());
        assert_eq!(phase_b::compute_refund(100, 10, 3), 30);
        let entries_before = ledger.entries().await;
        assert!(entries_before.is_empty());
    }

    #[test]
    fn test_content_stats_from_mixed_rows() {
        let ok = Content {
            id: "c1".into(),
            job_id: "job-1".into(),
            scenario_id: 1,
            source_scenario_id: 1,
            blog_title: "t".into(),
            persona_archetype: "a".into(),
            keywords: vec![],
            blog_content: "body".into(),
            word_count: 1000,
            slug: "t".into(),
            meta_description: "m".into(),
            blog_type: "functional".into(),
            image_urls: vec![],
            generation_time_ms: 10,
            model_used: "default".into(),
            status: ContentStatus::Ok,
            error_message: None,
        };
        let mut failed = ok.clone();
        failed.status = ContentStatus::Failed;
        failed.word_count = 0;

        let stats = ContentStats::from_rows(&[ok, failed]);
        assert_eq!(stats.total_posts, 1);
        assert_eq!(stats.total_words, 1000);
    }
}
