//! End-to-end job runs through the admission surface, the real SQLite
//! backend, and the actual Phase A / Phase B executors — only the LLM
//! gateway is a double.

use contentforge::{Pipeline, SubmitJobRequest};
use contentforge_core::config::PipelineConfig;
use contentforge_core::{
    ContentStatus, ContentStore, CreditLedger, JobStatus, JobStore, NullCreditLedger,
    RecordingCreditLedger, ScenarioStore,
};
use contentforge_images::NullImageProvider;
use contentforge_llm::{GenerationOptions, LlmError, LlmGateway, ScriptedLlmGateway, ScriptedResponse};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn allocations(functional: u32, transactional: u32, commercial: u32, informational: u32) -> HashMap<String, u32> {
    let mut m = HashMap::new();
    m.insert("functional".to_string(), functional);
    m.insert("transactional".to_string(), transactional);
    m.insert("commercial".to_string(), commercial);
    m.insert("informational".to_string(), informational);
    m
}

fn scenario_json(n: usize) -> String {
    let items: Vec<String> = (0..n)
        .map(|i| {
            format!(
                r#"{{"persona_name": "Persona {i}", "persona_archetype": "Hobbyist", "pain_point_detail": "struggles with swarming hives every spring season", "goal_focus": "calmer, more productive colonies", "blog_topic_headline": "How to keep {i} hives calm"}}"#
            )
        })
        .collect();
    format!(r#"{{"scenarios": [{}]}}"#, items.join(","))
}

fn good_article(words: usize) -> String {
    std::iter::repeat("beekeeping").take(words).collect::<Vec<_>>().join(" ")
}

fn test_config(phase_b_max_attempts: u32, max_concurrent: usize) -> PipelineConfig {
    PipelineConfig {
        max_concurrent_content_generation: max_concurrent,
        request_timeout_ms: 300_000,
        rate_limit_window_secs: 1,
        rate_limit_max_per_window: 1_000,
        phase_a_max_attempts: 2,
        phase_b_max_attempts,
        word_count_floor: 20,
        phase_a_batch_size: 20,
        phase_a_underfill_threshold: 1,
        image_inlining_cutoff: 2,
        max_stalls: 2,
    }
}

async fn build_pipeline(
    db_path: &std::path::Path,
    gateway: Arc<dyn LlmGateway>,
    ledger: Arc<dyn CreditLedger>,
    config: PipelineConfig,
) -> Pipeline {
    let store = contentforge_core::open(&db_path.to_string_lossy()).await.unwrap();
    Pipeline::new(
        store.clone() as Arc<dyn JobStore>,
        store.clone() as Arc<dyn ContentStore>,
        store as Arc<dyn ScenarioStore>,
        ledger,
        gateway,
        Arc::new(NullImageProvider),
        config,
        64,
    )
}

async fn wait_for_terminal(
    pipeline: &Pipeline,
    job_id: &str,
    timeout: Duration,
) -> contentforge::JobStatusView {
    let start = std::time::Instant::now();
    loop {
        let status = pipeline.get_status(job_id).await.unwrap();
        if status.status.is_terminal() {
            return status;
        }
        if start.elapsed() > timeout {
            panic!("job {job_id} did not reach a terminal state in time (last status: {:?})", status.status);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn base_request(total_blogs: u32, blog_type_allocations: HashMap<String, u32>, credits_cost: u32) -> SubmitJobRequest {
    SubmitJobRequest {
        niche: "urban beekeeping".to_string(),
        value_propositions: vec!["hive kits with training".to_string()],
        tone: "friendly".to_string(),
        total_blogs,
        blog_type_allocations,
        target_word_count: 1000,
        user_id: "user-1".to_string(),
        credits_cost,
    }
}

/// Scenario 1: a small happy-path job runs end to end to COMPLETE.
#[tokio::test]
async fn test_happy_path_small_job_completes() {
    let dir = tempfile::tempdir().unwrap();
    let gateway: Arc<dyn LlmGateway> = Arc::new(
        ScriptedLlmGateway::new()
            .with_research(ScriptedResponse::Text(scenario_json(4)))
            .with_generate(ScriptedResponse::Text(good_article(200))),
    );

    let pipeline = Arc::new(
        build_pipeline(&dir.path().join("happy.db"), gateway, Arc::new(NullCreditLedger), test_config(1, 4)).await,
    );

    let job_id = pipeline.submit_job(base_request(4, allocations(1, 1, 1, 1), 40)).await.unwrap();

    let worker = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.run_worker().await }
    });

    let status = wait_for_terminal(&pipeline, &job_id, Duration::from_secs(5)).await;
    assert_eq!(status.status, JobStatus::Complete);
    assert_eq!(status.total_content_generated, 4);
    assert_eq!(status.generated_titles.len(), 4);

    let content = pipeline.get_content(&job_id).await.unwrap();
    assert_eq!(content.rows.len(), 4);
    assert!(content.rows.iter().all(|c| c.status == ContentStatus::Ok));
    assert_eq!(content.stats.total_posts, 4);

    worker.abort();
}

/// Scenario 2: partial Phase B failure triggers a pro-rata refund and lands
/// the job in PARTIAL_COMPLETE rather than COMPLETE or FAILED.
#[tokio::test]
async fn test_partial_failure_triggers_pro_rata_refund() {
    let dir = tempfile::tempdir().unwrap();

    let mut gateway = ScriptedLlmGateway::new().with_research(ScriptedResponse::Text(scenario_json(10)));
    for _ in 0..3 {
        gateway = gateway.with_generate(ScriptedResponse::Err(LlmError::Blocked { reason: "policy".to_string() }));
    }
    for _ in 0..7 {
        gateway = gateway.with_generate(ScriptedResponse::Text(good_article(200)));
    }

    let ledger = Arc::new(RecordingCreditLedger::new());
    let pipeline = Arc::new(
        build_pipeline(
            &dir.path().join("partial.db"),
            Arc::new(gateway),
            ledger.clone(),
            test_config(1, 10),
        )
        .await,
    );

    let job_id = pipeline.submit_job(base_request(10, allocations(3, 3, 2, 2), 100)).await.unwrap();

    let worker = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.run_worker().await }
    });

    let status = wait_for_terminal(&pipeline, &job_id, Duration::from_secs(5)).await;
    assert_eq!(status.status, JobStatus::PartialComplete);
    assert_eq!(status.total_content_generated, 10);

    let content = pipeline.get_content(&job_id).await.unwrap();
    let failures = content.rows.iter().filter(|c| c.status == ContentStatus::Failed).count();
    assert_eq!(failures, 3);

    let entries = ledger.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].1, 30); // floor(100/10 * 3)

    worker.abort();
}

/// Scenario 3: Phase A never produces parseable JSON, across every retry
/// attempt, so the job lands in FAILED with a descriptive error message and
/// a debug artifact is written for inspection.
#[tokio::test]
async fn test_total_phase_a_failure_lands_job_failed() {
    let dir = tempfile::tempdir().unwrap();
    let gateway: Arc<dyn LlmGateway> = Arc::new(
        ScriptedLlmGateway::new()
            .with_research(ScriptedResponse::Text("not json at all, just prose from a confused model".to_string())),
    );

    let pipeline = Arc::new(
        build_pipeline(&dir.path().join("failed.db"), gateway, Arc::new(NullCreditLedger), test_config(1, 4)).await,
    );

    let job_id = pipeline.submit_job(base_request(4, allocations(1, 1, 1, 1), 40)).await.unwrap();

    let worker = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.run_worker().await }
    });

    let status = wait_for_terminal(&pipeline, &job_id, Duration::from_secs(5)).await;
    assert_eq!(status.status, JobStatus::Failed);
    let message = status.error_message.expect("FAILED job must carry an error_message");
    assert!(message.contains("could not parse research output"));

    assert!(contentforge_core::json_extractor::debug_artifact_dir().exists());

    worker.abort();
}

/// Scenario 4: research output is two JSON objects concatenated back to
/// back (a common way grounded models run past their own stop sequence);
/// the extractor's concatenated-object repair still lets the job complete.
#[tokio::test]
async fn test_concatenated_json_is_repaired_and_job_completes() {
    let dir = tempfile::tempdir().unwrap();
    let first = scenario_json(4);
    let second = scenario_json(2);
    let concatenated = format!("{first}\n{second}");

    let gateway: Arc<dyn LlmGateway> = Arc::new(
        ScriptedLlmGateway::new()
            .with_research(ScriptedResponse::Text(concatenated))
            .with_generate(ScriptedResponse::Text(good_article(200))),
    );

    let pipeline = Arc::new(
        build_pipeline(&dir.path().join("concat.db"), gateway, Arc::new(NullCreditLedger), test_config(1, 4)).await,
    );

    let job_id = pipeline.submit_job(base_request(4, allocations(1, 1, 1, 1), 40)).await.unwrap();

    let worker = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.run_worker().await }
    });

    let status = wait_for_terminal(&pipeline, &job_id, Duration::from_secs(5)).await;
    assert_eq!(status.status, JobStatus::Complete);

    worker.abort();
}

/// Scenario 5: an allocation sum mismatch is rejected synchronously at
/// admission; no job is ever created or enqueued.
#[tokio::test]
async fn test_allocation_sum_mismatch_rejected_at_admission() {
    let dir = tempfile::tempdir().unwrap();
    let gateway: Arc<dyn LlmGateway> = Arc::new(ScriptedLlmGateway::new());
    let pipeline = build_pipeline(&dir.path().join("reject.db"), gateway, Arc::new(NullCreditLedger), test_config(1, 4)).await;

    let mut request = base_request(10, allocations(3, 3, 2, 2), 100);
    request.blog_type_allocations = allocations(2, 2, 2, 2); // sums to 8, not 10

    let result = pipeline.submit_job(request).await;
    assert!(result.is_err());
}

/// Scenario 6: deleting a job mid-run cancels it and tears down its data;
/// rows already persisted (or persisted shortly after, from in-flight
/// generations the cancellation signal hasn't reached yet) do not survive.
#[tokio::test]
async fn test_delete_mid_run_tears_down_job_and_content() {
    struct SlowGateway {
        research_text: String,
    }

    #[async_trait::async_trait]
    impl LlmGateway for SlowGateway {
        async fn research(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String, LlmError> {
            Ok(self.research_text.clone())
        }

        async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(good_article(200))
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let gateway: Arc<dyn LlmGateway> = Arc::new(SlowGateway { research_text: scenario_json(20) });

    let pipeline = Arc::new(
        build_pipeline(
            &dir.path().join("cancel.db"),
            gateway,
            Arc::new(NullCreditLedger),
            test_config(1, 1), // sequential, so cancellation has time to matter
        )
        .await,
    );

    let job_id = pipeline.submit_job(base_request(20, allocations(5, 5, 5, 5), 200)).await.unwrap();

    let worker = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.run_worker().await }
    });

    // Let a handful of items land before cancelling.
    let start = std::time::Instant::now();
    loop {
        let status = pipeline.get_status(&job_id).await.unwrap();
        if status.total_content_generated >= 2 || start.elapsed() > Duration::from_secs(3) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    pipeline.delete_job(&job_id).await.unwrap();

    // The job row and its content are gone immediately...
    let status_after_delete = pipeline.get_status(&job_id).await;
    assert!(status_after_delete.is_err());

    // ...and stay gone even while the in-flight run keeps working for a
    // while longer (its writes against the deleted job are no-ops).
    tokio::time::sleep(Duration::from_millis(300)).await;
    let status_still_gone = pipeline.get_status(&job_id).await;
    assert!(status_still_gone.is_err());

    worker.abort();
}
