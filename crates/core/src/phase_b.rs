//! Phase B — Content Executor
//!
//! Plans the full generation run from a set of validated scenarios and an
//! allocation, then renders one article per planned item with bounded
//! concurrency, per-item retries, and partial-failure accounting.

use crate::config::PipelineConfig;
use crate::faq::ensure_faq_section;
use crate::manager::ProgressReporter;
use crate::{Content, ContentStatus, Scenario, BLOG_TYPES};
use contentforge_images::ImageProvider;
use contentforge_llm::{GenerationOptions, LlmError, LlmGateway};
use contentforge_resilience::RateLimiter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

/// One planned work item: a blog_type and a source scenario, not yet
/// generated.
#[derive(Debug, Clone)]
pub struct WorkItemPlan {
    pub scenario_id: u32,
    pub source_scenario_id: u32,
    pub blog_type: String,
}

/// Normalizes a requested allocation against `total_blogs`:
/// - all-zero allocation is spread evenly with the remainder to the first
///   categories (in `BLOG_TYPES` order)
/// - a sum exceeding `total_blogs` is reduced from the largest category
///   first
/// - a sum under `total_blogs` has its remainder distributed round-robin
pub fn normalize_allocations(
    requested: &HashMap<String, u32>,
    total_blogs: u32,
) -> HashMap<String, u32> {
    let mut counts: Vec<(String, u32)> = BLOG_TYPES
        .iter()
        .map(|t| (t.to_string(), requested.get(*t).copied().unwrap_or(0)))
        .collect();

    let sum: u32 = counts.iter().map(|(_, c)| *c).sum();

    if sum == 0 {
        let base = total_blogs / 4;
        let remainder = total_blogs % 4;
        for (idx, (_, c)) in counts.iter_mut().enumerate() {
            *c = base + if (idx as u32) < remainder { 1 } else { 0 };
        }
    } else if sum > total_blogs {
        let mut excess = sum - total_blogs;
        while excess > 0 {
            let (idx, _) = counts
                .iter()
                .enumerate()
                .max_by_key(|(_, (_, c))| *c)
                .unwrap();
            if counts[idx].1 == 0 {
                break;
            }
            counts[idx].1 -= 1;
            excess -= 1;
        }
    } else if sum < total_blogs {
        let mut remainder = total_blogs - sum;
        let mut idx = 0;
        while remainder > 0 {
            counts[idx % 4].1 += 1;
            remainder -= 1;
            idx += 1;
        }
    }

    counts.into_iter().collect()
}

/// Flattens the normalized allocation into an ordered sequence of N work
/// items, in category order, each pointing at a source scenario via
/// `i mod |S|`.
pub fn enumerate_work_items(
    normalized: &HashMap<String, u32>,
    scenario_count: usize,
) -> Vec<WorkItemPlan> {
    let mut items = Vec::new();
    let mut position: u32 = 0;

    for blog_type in BLOG_TYPES.iter() {
        let count = normalized.get(*blog_type).copied().unwrap_or(0);
        for _ in 0..count {
            let source_scenario_id = (position as usize % scenario_count.max(1)) as u32 + 1;
            position += 1;
            items.push(WorkItemPlan {
                scenario_id: position,
                source_scenario_id,
                blog_type: blog_type.to_string(),
            });
        }
    }

    items
}

fn count_words(text: &str) -> u32 {
    text.split_whitespace().filter(|t| !t.is_empty()).count() as u32
}

fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn meta_description(headline: &str, target_word_count: u32) -> String {
    let mut desc = format!("{headline} — a {target_word_count}-word guide.");
    if desc.len() > 160 {
        desc.truncate(157);
        desc.push_str("...");
    }
    desc
}

fn build_generation_prompt(
    scenario: &Scenario,
    niche: &str,
    value_propositions: &[String],
    tone: &str,
    blog_type: &str,
    target_word_count: u32,
) -> String {
    format!(
        "Write a {blog_type} article of about {target_word_count} words for the \"{niche}\" niche, \
         tone: {tone}. Persona: {} ({}). Pain point: {}. Goal: {}. Headline: {}. \
         Value propositions: {}. Include a FAQ section.",
        scenario.persona_name,
        scenario.persona_archetype,
        scenario.pain_point_detail,
        scenario.goal_focus,
        scenario.blog_topic_headline,
        value_propositions.join(", "),
    )
}

fn is_rate_limited(err: &LlmError) -> bool {
    match err {
        LlmError::RateLimited => true,
        LlmError::Transient(msg) | LlmError::Fatal(msg) => {
            let lower = msg.to_lowercase();
            lower.contains("429") || lower.contains("quota") || lower.contains("too many requests")
        }
        LlmError::Blocked { .. } => false,
    }
}

/// Generate a single Content row for one planned work item, with up to
/// `max_attempts` retries. Every `gateway.generate` call waits on
/// `rate_limiter`, the same system-wide gate shared across every in-flight
/// job's Phase B fan-out and Phase A's research calls.
#[allow(clippy::too_many_arguments)]
async fn generate_one(
    job_id: &str,
    item: &WorkItemPlan,
    scenario: &Scenario,
    niche: &str,
    value_propositions: &[String],
    tone: &str,
    target_word_count: u32,
    gateway: &dyn LlmGateway,
    rate_limiter: &RateLimiter,
    config: &PipelineConfig,
) -> Content {
    let prompt = build_generation_prompt(
        scenario,
        niche,
        value_propositions,
        tone,
        &item.blog_type,
        target_word_count,
    );
    let options = GenerationOptions::default();

    let mut last_error = "no attempts made".to_string();

    for attempt in 1..=config.phase_b_max_attempts {
        rate_limiter.acquire().await;
        let start = Instant::now();
        match gateway.generate(&prompt, &options).await {
            Ok(text) => {
                if text.trim().is_empty() {
                    last_error = "empty response".to_string();
                } else {
                    let word_count = count_words(&text);
                    let is_final_attempt = attempt == config.phase_b_max_attempts;
                    if word_count < config.word_count_floor && !is_final_attempt {
                        last_error = format!("word count {word_count} below floor");
                        tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                        continue;
                    }
                    if word_count < config.word_count_floor {
                        warn!(
                            job_id,
                            scenario_id = item.scenario_id,
                            word_count,
                            "accepting short article on final attempt"
                        );
                    }

                    let value_prop = value_propositions.first().cloned().unwrap_or_default();
                    let body = ensure_faq_section(
                        &text,
                        &scenario.persona_archetype,
                        &scenario.pain_point_detail,
                        &scenario.goal_focus,
                        &value_prop,
                    );

                    let mut body = body;
                    for image_url in &scenario.image_urls {
                        body = format!("![{}]({})\n\n{}", scenario.blog_topic_headline, image_url, body);
                    }

                    let final_word_count = count_words(&body);

                    return Content {
                        id: Uuid::new_v4().to_string(),
                        job_id: job_id.to_string(),
                        scenario_id: item.scenario_id,
                        source_scenario_id: item.source_scenario_id,
                        blog_title: scenario.blog_topic_headline.clone(),
                        persona_archetype: scenario.persona_archetype.clone(),
                        keywords: scenario.target_keywords.clone(),
                        blog_content: body,
                        word_count: final_word_count,
                        slug: slugify(&scenario.blog_topic_headline),
                        meta_description: meta_description(&scenario.blog_topic_headline, target_word_count),
                        blog_type: item.blog_type.clone(),
                        image_urls: scenario.image_urls.clone(),
                        generation_time_ms: start.elapsed().as_millis() as u64,
                        model_used: "default".to_string(),
                        status: ContentStatus::Ok,
                        error_message: None,
                    };
                }
            }
            Err(LlmError::Blocked { reason }) => {
                last_error = format!("blocked: {reason}");
            }
            Err(err) => {
                last_error = err.to_string();
                if attempt < config.phase_b_max_attempts {
                    let wait = if is_rate_limited(&err) {
                        Duration::from_secs(60)
                    } else {
                        Duration::from_secs(2u64.pow(attempt))
                    };
                    tokio::time::sleep(wait).await;
                }
                continue;
            }
        }

        if attempt < config.phase_b_max_attempts {
            tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
        }
    }

    Content {
        id: Uuid::new_v4().to_string(),
        job_id: job_id.to_string(),
        scenario_id: item.scenario_id,
        source_scenario_id: item.source_scenario_id,
        blog_title: scenario.blog_topic_headline.clone(),
        persona_archetype: scenario.persona_archetype.clone(),
        keywords: scenario.target_keywords.clone(),
        blog_content: String::new(),
        word_count: 0,
        slug: slugify(&scenario.blog_topic_headline),
        meta_description: String::new(),
        blog_type: item.blog_type.clone(),
        image_urls: Vec::new(),
        generation_time_ms: 0,
        model_used: "default".to_string(),
        status: ContentStatus::Failed,
        error_message: Some(last_error),
    }
}

/// Runs Phase B to completion for every planned item, bounded to `C`
/// concurrent in-flight generations, honoring cancellation between items,
/// and reporting progress as each item lands. Returns the generated
/// Content rows (order not guaranteed — reconstruct from `scenario_id`).
/// `rate_limiter` is the global token bucket shared across every in-flight
/// job, not a per-job allowance — every `generate` call, across every task
/// this fan-out spawns, waits on the same instance.
#[allow(clippy::too_many_arguments)]
pub async fn run_phase_b(
    job_id: &str,
    scenarios: &[Scenario],
    niche: &str,
    value_propositions: &[String],
    tone: &str,
    total_blogs: u32,
    blog_type_allocations: &HashMap<String, u32>,
    target_word_count: u32,
    gateway: Arc<dyn LlmGateway>,
    config: Arc<PipelineConfig>,
    rate_limiter: Arc<RateLimiter>,
    reporter: ProgressReporter,
    is_cancelled: impl Fn() -> bool + Send + Sync + 'static,
) -> Vec<Content> {
    let normalized = normalize_allocations(blog_type_allocations, total_blogs);
    let plan = enumerate_work_items(&normalized, scenarios.len());
    let total = plan.len() as u32;

    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_content_generation));
    let is_cancelled = Arc::new(is_cancelled);
    let mut handles = Vec::with_capacity(plan.len());

    for item in plan {
        if is_cancelled() {
            info!(job_id, "cancellation observed before dispatching item, stopping fan-out");
            break;
        }

        let scenario = scenarios[(item.source_scenario_id as usize - 1) % scenarios.len()].clone();
        let job_id = job_id.to_string();
        let niche = niche.to_string();
        let value_propositions = value_propositions.to_vec();
        let tone = tone.to_string();
        let gateway = gateway.clone();
        let config = config.clone();
        let rate_limiter = rate_limiter.clone();
        let reporter = reporter.clone();
        let semaphore = semaphore.clone();
        let is_cancelled = is_cancelled.clone();

        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            if is_cancelled() {
                return None;
            }
            let content = generate_one(
                &job_id,
                &item,
                &scenario,
                &niche,
                &value_propositions,
                &tone,
                target_word_count,
                gateway.as_ref(),
                rate_limiter.as_ref(),
                config.as_ref(),
            )
            .await;
            reporter.report_content_completed(&job_id, total).await;
            Some(content)
        });

        handles.push(handle);
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        if let Ok(Some(content)) = handle.await {
            results.push(content);
        }
    }

    results
}

/// `successes = N` → COMPLETE; `0 < successes < N` → PARTIAL_COMPLETE;
/// `successes = 0` → FAILED.
pub fn terminal_status(successes: u32, total: u32) -> crate::JobStatus {
    if successes == total {
        crate::JobStatus::Complete
    } else if successes == 0 {
        crate::JobStatus::Failed
    } else {
        crate::JobStatus::PartialComplete
    }
}

/// `⌊(credits_cost / total_blogs) · failures⌋`
pub fn compute_refund(credits_cost: u32, total_blogs: u32, failures: u32) -> u32 {
    if total_blogs == 0 {
        return 0;
    }
    ((credits_cost as u64 * failures as u64) / total_blogs as u64) as u32
}
