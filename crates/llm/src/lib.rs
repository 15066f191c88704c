//! LLM Gateway: a thin adapter over a generative language model
//!
//! An async-trait interface the rest of the pipeline depends on, with a
//! scripted in-memory implementation standing in for the network call during
//! tests.
//!
//! Two capabilities are exposed: `research` (search-augmented, used by Phase
//! A) and `generate` (plain generation, used by Phase B). Both return raw
//! text; nothing downstream of this crate assumes any particular wire format.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;

/// Sampling and tool-use knobs passed through to the underlying model.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_tokens: u32,
    /// Grounded search tool enabled for this call.
    pub grounded_search: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            max_tokens: 8192,
            grounded_search: false,
        }
    }
}

impl GenerationOptions {
    pub fn grounded() -> Self {
        Self {
            grounded_search: true,
            ..Self::default()
        }
    }
}

/// Error taxonomy the gateway interface names: callers classify a failure
/// once and the retry policy in the calling phase decides what to do with it.
#[derive(Debug, Error, Clone)]
pub enum LlmError {
    /// The model refused the prompt on content-policy grounds.
    #[error("blocked: {reason}")]
    Blocked { reason: String },

    #[error("rate limited")]
    RateLimited,

    /// Network blip, upstream 5xx, or similar — worth retrying as-is.
    #[error("transient error: {0}")]
    Transient(String),

    /// Not worth retrying on the same input.
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl LlmError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Transient(_) | LlmError::RateLimited)
    }
}

#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Search-augmented call used by Phase A to produce scenarios grounded
    /// in real facts about the niche.
    async fn research(&self, prompt: &str, options: &GenerationOptions) -> Result<String, LlmError>;

    /// Plain generation call used by Phase B to render one article.
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, LlmError>;
}

/// A single scripted response, returned in order by `ScriptedLlmGateway`.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Text(String),
    Err(LlmError),
}

/// In-memory gateway double used throughout the test suite to simulate rate
/// limits, blocked content, malformed JSON, and partial Phase B failure
/// without a live network dependency.
///
/// Responses are consumed in FIFO order per call kind (research vs.
/// generate); once exhausted, the last entry repeats.
pub struct ScriptedLlmGateway {
    research_queue: Mutex<VecDeque<ScriptedResponse>>,
    generate_queue: Mutex<VecDeque<ScriptedResponse>>,
    research_calls: Mutex<u32>,
    generate_calls: Mutex<u32>,
}

impl ScriptedLlmGateway {
    pub fn new() -> Self {
        Self {
            research_queue: Mutex::new(VecDeque::new()),
            generate_queue: Mutex::new(VecDeque::new()),
            research_calls: Mutex::new(0),
            generate_calls: Mutex::new(0),
        }
    }

    pub fn with_research(self, response: ScriptedResponse) -> Self {
        self.research_queue.lock().unwrap().push_back(response);
        self
    }

    pub fn with_generate(self, response: ScriptedResponse) -> Self {
        self.generate_queue.lock().unwrap().push_back(response);
        self
    }

    pub fn research_call_count(&self) -> u32 {
        *self.research_calls.lock().unwrap()
    }

    pub fn generate_call_count(&self) -> u32 {
        *self.generate_calls.lock().unwrap()
    }

    fn next(queue: &Mutex<VecDeque<ScriptedResponse>>) -> ScriptedResponse {
        let mut q = queue.lock().unwrap();
        if q.len() > 1 {
            q.pop_front().unwrap()
        } else {
            q.front().cloned().unwrap_or_else(|| {
                ScriptedResponse::Err(LlmError::Fatal("no scripted response left".into()))
            })
        }
    }
}

impl Default for ScriptedLlmGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmGateway for ScriptedLlmGateway {
    async fn research(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String, LlmError> {
        *self.research_calls.lock().unwrap() += 1;
        match Self::next(&self.research_queue) {
            ScriptedResponse::Text(t) => Ok(t),
            ScriptedResponse::Err(e) => Err(e),
        }
    }

    async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String, LlmError> {
        *self.generate_calls.lock().unwrap() += 1;
        match Self::next(&self.generate_queue) {
            ScriptedResponse::Text(t) => Ok(t),
            ScriptedResponse::Err(e) => Err(e),
        }
    }
}
