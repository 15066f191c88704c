//! Phase A — Research Executor
//!
//! Produces a validated sequence of up to `phase_a_batch_size` scenarios
//! from a job description via a single grounded LLM call, retried on
//! failure.

use crate::config::PipelineConfig;
use crate::json_extractor::extract_json;
use crate::Scenario;
use contentforge_images::ImageProvider;
use contentforge_llm::{GenerationOptions, LlmError, LlmGateway};
use contentforge_resilience::RateLimiter;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, Clone)]
pub enum PhaseAError {
    #[error("prompt blocked: {0}")]
    PromptBlocked(String),
    #[error("empty response from model")]
    EmptyResponse,
    #[error("unparseable JSON: {0}")]
    UnparseableJson(String),
    #[error("underfilled: only {found} of required {required} scenarios survived validation")]
    Underfilled { found: usize, required: usize },
    #[error("rate limited")]
    RateLimited,
}

#[derive(Debug, Deserialize)]
struct RawScenario {
    persona_name: Option<String>,
    persona_archetype: Option<String>,
    pain_point_detail: Option<String>,
    goal_focus: Option<String>,
    blog_topic_headline: Option<String>,
    target_keywords: Option<Vec<String>>,
    required_word_count: Option<u32>,
    research_insight: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScenariosPayload {
    scenarios: Vec<RawScenario>,
}

fn build_research_prompt(
    niche: &str,
    value_propositions: &[String],
    tone: &str,
    batch_size: u32,
) -> String {
    format!(
        "Research {batch_size} distinct customer scenarios for a business in the \"{niche}\" niche.\n\
         Value propositions: {}.\n\
         Tone: {tone}.\n\
         Return a JSON object with a top-level \"scenarios\" array. Each scenario should include \
         persona_name, persona_archetype, pain_point_detail, goal_focus, blog_topic_headline, \
         target_keywords, required_word_count, and research_insight.",
        value_propositions.join(", ")
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

fn validate_and_fill(
    raw: Vec<RawScenario>,
    niche: &str,
) -> Vec<Scenario> {
    raw.into_iter()
        .filter(|s| {
            s.pain_point_detail.as_deref().map(str::len).unwrap_or(0) >= 20
                && s.goal_focus.as_deref().map(str::len).unwrap_or(0) >= 10
                && s.blog_topic_headline.as_deref().map(str::len).unwrap_or(0) >= 10
        })
        .enumerate()
        .map(|(idx, s)| Scenario {
            scenario_id: (idx + 1) as u32,
            persona_name: s.persona_name.unwrap_or_else(|| format!("Persona {}", idx + 1)),
            persona_archetype: s.persona_archetype.unwrap_or_else(|| "Professional User".to_string()),
            pain_point_detail: s.pain_point_detail.unwrap_or_default(),
            goal_focus: s.goal_focus.unwrap_or_default(),
            blog_topic_headline: s.blog_topic_headline.unwrap_or_default(),
            target_keywords: match s.target_keywords {
                Some(kws) if !kws.is_empty() => kws,
                _ => vec![niche.to_string(), "solution".to_string(), "guide".to_string()],
            },
            required_word_count: s.required_word_count.unwrap_or(1000),
            research_insight: s.research_insight,
            image_urls: Vec::new(),
            blog_type: None,
        })
        .collect()
}

/// Runs Phase A to completion: retries the grounded research call, extracts
/// and validates scenarios, and best-effort fetches images for the leading
/// `image_inlining_cutoff` scenarios. Every research call waits on
/// `rate_limiter`, the same system-wide gate Phase B's generation calls
/// share.
#[allow(clippy::too_many_arguments)]
pub async fn run_phase_a(
    gateway: &dyn LlmGateway,
    image_provider: &dyn ImageProvider,
    rate_limiter: &RateLimiter,
    config: &PipelineConfig,
    niche: &str,
    value_propositions: &[String],
    tone: &str,
    _total_blogs: u32,
    _blog_type_allocations: &HashMap<String, u32>,
) -> Result<Vec<Scenario>, PhaseAError> {
    let prompt = build_research_prompt(niche, value_propositions, tone, config.phase_a_batch_size);
    let options = GenerationOptions::grounded();

    let mut last_error = PhaseAError::EmptyResponse;

    for attempt in 1..=config.phase_a_max_attempts {
        rate_limiter.acquire().await;
        match gateway.research(&prompt, &options).await {
            Ok(text) => {
                match handle_response(&text, niche, config).await {
                    Ok(mut scenarios) => {
                        attach_images(&mut scenarios, image_provider, config.image_inlining_cutoff).await;
                        return Ok(scenarios);
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "phase A output handling failed");
                        last_error = e;
                    }
                }
            }
            Err(err) => {
                warn!(attempt, error = %err, "phase A research call failed");
                last_error = match &err {
                    LlmError::Blocked { reason } => PhaseAError::PromptBlocked(reason.clone()),
                    _ if is_rate_limited(&err) => PhaseAError::RateLimited,
                    _ => PhaseAError::EmptyResponse,
                };
            }
        }

        if attempt < config.phase_a_max_attempts {
            let wait = if is_rate_limit_error(&last_error) {
                Duration::from_secs(60)
            } else {
                Duration::from_secs(2 * attempt as u64)
            };
            tokio::time::sleep(wait).await;
        }
    }

    Err(last_error)
}

fn is_rate_limit_error(err: &PhaseAError) -> bool {
    matches!(err, PhaseAError::RateLimited)
}

async fn handle_response(
    text: &str,
    niche: &str,
    config: &PipelineConfig,
) -> Result<Vec<Scenario>, PhaseAError> {
    if text.trim().is_empty() {
        return Err(PhaseAError::EmptyResponse);
    }

    let value = extract_json(text, "scenarios")
        .await
        .map_err(|e| PhaseAError::UnparseableJson(e.preview))?;

    let payload: ScenariosPayload =
        serde_json::from_value(value).map_err(|e| PhaseAError::UnparseableJson(e.to_string()))?;

    let validated = validate_and_fill(payload.scenarios, niche);

    let required = config.phase_a_underfill_threshold as usize;
    if validated.len() < required {
        return Err(PhaseAError::Underfilled {
            found: validated.len(),
            required,
        });
    }

    let cap = (config.phase_a_batch_size as usize).min(50);
    let taken: Vec<Scenario> = validated.into_iter().take(cap).collect();

    info!(count = taken.len(), "phase A produced validated scenarios");
    Ok(taken)
}

async fn attach_images(scenarios: &mut [Scenario], image_provider: &dyn ImageProvider, k: usize) {
    for scenario in scenarios.iter_mut().take(k) {
        let images = image_provider
            .fetch_images(&scenario.target_keywords, Some(&scenario.persona_name), 1)
            .await;
        scenario.image_urls = images.into_iter().map(|img| img.url).collect();
    }
}
