//! ContentForge Core: job scheduler and content repository for the bulk
//! content generation pipeline
//!
//! # Overview
//!
//! This crate owns the asynchronous two-phase pipeline and its job
//! scheduler: job admission and queueing, the durable job record and its
//! state machine, Phase A research, Phase B content generation, progress
//! reporting, partial-failure accounting and credit refunds, and the
//! parsing/repair logic that makes the system robust against
//! non-deterministic LLM output.
//!
//! # Example
//!
//! ```no_run
//! use contentforge_core::{open, JobStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = open("jobs.db").await?;
//!     let job = store.get("job-1").await?;
//!     println!("{job:?}");
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

pub mod backends;
pub mod config;
pub mod executor;
pub mod faq;
pub mod json_extractor;
pub mod manager;
pub mod phase_a;
pub mod phase_b;
pub mod queue;
pub mod scheduler;

#[cfg(feature = "sqlite")]
pub use backends::sqlite::SqliteStore;

pub use manager::{ProgressReporter, ProgressReporterConfig};

/// The four article categories an allocation distributes `total_blogs`
/// across, in the fixed order used for planning and display.
pub const BLOG_TYPES: [&str; 4] = [
    "functional",
    "transactional",
    "commercial",
    "informational",
];

/// Closed set of tones accepted at admission.
pub const TONES: [&str; 6] = [
    "professional",
    "conversational",
    "authoritative",
    "friendly",
    "technical",
    "casual",
];

/// Job execution status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Enqueued,
    Researching,
    ResearchComplete,
    Generating,
    Complete,
    PartialComplete,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::PartialComplete | JobStatus::Failed
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Enqueued => "ENQUEUED",
            JobStatus::Researching => "RESEARCHING",
            JobStatus::ResearchComplete => "RESEARCH_COMPLETE",
            JobStatus::Generating => "GENERATING",
            JobStatus::Complete => "COMPLETE",
            JobStatus::PartialComplete => "PARTIAL_COMPLETE",
            JobStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ENQUEUED" => Ok(JobStatus::Enqueued),
            "RESEARCHING" => Ok(JobStatus::Researching),
            "RESEARCH_COMPLETE" => Ok(JobStatus::ResearchComplete),
            "GENERATING" => Ok(JobStatus::Generating),
            "COMPLETE" => Ok(JobStatus::Complete),
            "PARTIAL_COMPLETE" => Ok(JobStatus::PartialComplete),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(anyhow::anyhow!("invalid job status: {other}")),
        }
    }
}

/// The top-level unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub niche: String,
    pub value_propositions: Vec<String>,
    pub tone: String,
    pub total_blogs: u32,
    pub blog_type_allocations: HashMap<String, u32>,
    pub target_word_count: u32,
    pub status: JobStatus,
    pub progress: u8,
    pub total_content_generated: u32,
    pub failed_content_count: u32,
    pub scenarios: Vec<Scenario>,
    pub error_message: Option<String>,
    pub credits_cost: u32,
    pub credits_refunded: u32,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A research-stage artifact describing a persona, pain point, goal,
/// headline, and keywords — the seed for one or more articles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub scenario_id: u32,
    pub persona_name: String,
    pub persona_archetype: String,
    pub pain_point_detail: String,
    pub goal_focus: String,
    pub blog_topic_headline: String,
    pub target_keywords: Vec<String>,
    pub required_word_count: u32,
    pub research_insight: Option<String>,
    pub image_urls: Vec<String>,
    pub blog_type: Option<String>,
}

/// Status of a single rendered Content row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentStatus {
    Ok,
    Failed,
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentStatus::Ok => write!(f, "OK"),
            ContentStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for ContentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OK" => Ok(ContentStatus::Ok),
            "FAILED" => Ok(ContentStatus::Failed),
            other => Err(anyhow::anyhow!("invalid content status: {other}")),
        }
    }
}

/// One rendered article per Scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub id: String,
    pub job_id: String,
    pub scenario_id: u32,
    pub source_scenario_id: u32,
    pub blog_title: String,
    pub persona_archetype: String,
    pub keywords: Vec<String>,
    pub blog_content: String,
    pub word_count: u32,
    pub slug: String,
    pub meta_description: String,
    pub blog_type: String,
    pub image_urls: Vec<String>,
    pub generation_time_ms: u64,
    pub model_used: String,
    pub status: ContentStatus,
    pub error_message: Option<String>,
}

/// Aggregate stats returned alongside a job's content for `get_content`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentStats {
    pub total_posts: u32,
    pub avg_word_count: f64,
    pub total_words: u64,
    pub avg_generation_time_ms: f64,
}

impl ContentStats {
    pub fn from_rows(rows: &[Content]) -> Self {
        let ok_rows: Vec<&Content> = rows.iter().filter(|c| c.status == ContentStatus::Ok).collect();
        let total_posts = ok_rows.len() as u32;
        if total_posts == 0 {
            return Self {
                total_posts: 0,
                avg_word_count: 0.0,
                total_words: 0,
                avg_generation_time_ms: 0.0,
            };
        }
        let total_words: u64 = ok_rows.iter().map(|c| c.word_count as u64).sum();
        let total_time: u64 = ok_rows.iter().map(|c| c.generation_time_ms).sum();
        Self {
            total_posts,
            avg_word_count: total_words as f64 / total_posts as f64,
            total_words,
            avg_generation_time_ms: total_time as f64 / total_posts as f64,
        }
    }
}

/// CRUD for Job rows, with lazy initialization of the underlying store.
/// All operations are asynchronous and surface storage errors verbatim
/// except for the atomic convenience wrappers named below.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Validates required fields before writing.
    async fn create(&self, job: &Job) -> anyhow::Result<()>;

    async fn get(&self, job_id: &str) -> anyhow::Result<Option<Job>>;

    /// A single atomic write of the progress fields.
    async fn update_progress(
        &self,
        job_id: &str,
        progress: u8,
        total_content_generated: u32,
    ) -> anyhow::Result<()>;

    async fn mark_researching(&self, job_id: &str) -> anyhow::Result<()>;

    async fn update_scenarios(&self, job_id: &str, scenarios: &[Scenario]) -> anyhow::Result<()>;

    /// Transitions RESEARCHING -> RESEARCH_COMPLETE (progress 20), recording
    /// the validated scenario count.
    async fn mark_research_complete(&self, job_id: &str, scenario_count: usize) -> anyhow::Result<()>;

    async fn mark_generating(&self, job_id: &str) -> anyhow::Result<()>;

    async fn mark_complete(
        &self,
        job_id: &str,
        status: JobStatus,
        failed_content_count: u32,
        credits_refunded: u32,
    ) -> anyhow::Result<()>;

    async fn mark_failed(&self, job_id: &str, error_message: String) -> anyhow::Result<()>;

    async fn delete_job(&self, job_id: &str) -> anyhow::Result<()>;

    /// Whether a cancellation has been requested for this job (checked by
    /// the scheduler between Phase B items).
    async fn is_cancelled(&self, job_id: &str) -> anyhow::Result<bool>;

    async fn request_cancel(&self, job_id: &str) -> anyhow::Result<()>;
}

/// CRUD for Content rows. Content is insert-only; rows are never updated
/// after creation.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn insert(&self, content: &Content) -> anyhow::Result<()>;

    /// Returns an ordered sequence by `scenario_id` ascending.
    async fn find_by_job_id(&self, job_id: &str) -> anyhow::Result<Vec<Content>>;

    async fn delete_by_job_id(&self, job_id: &str) -> anyhow::Result<()>;
}

/// Scenario repository: bulk-write once at the end of Phase A, read-many
/// for Phase B planning and `get_content` aggregation. Mirrors `JobStore`'s
/// split between a one-shot bulk write and repeated reads.
#[async_trait]
pub trait ScenarioStore: Send + Sync {
    async fn save_scenarios(&self, job_id: &str, scenarios: &[Scenario]) -> anyhow::Result<()>;

    async fn list_scenarios(&self, job_id: &str) -> anyhow::Result<Vec<Scenario>>;

    async fn delete_by_job_id(&self, job_id: &str) -> anyhow::Result<()>;
}

/// Credit ledger sink: the pipeline hands it a computed refund amount; all
/// arithmetic lives in Phase B. Idempotent per `(entity_id, source_kind)`.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn add_credits(
        &self,
        user_id: &str,
        amount: u32,
        source_kind: &str,
        entity_id: &str,
        reason: &str,
    ) -> anyhow::Result<()>;
}

/// No-op ledger used when no billing system is wired in.
pub struct NullCreditLedger;

#[async_trait]
impl CreditLedger for NullCreditLedger {
    async fn add_credits(
        &self,
        _user_id: &str,
        _amount: u32,
        _source_kind: &str,
        _entity_id: &str,
        _reason: &str,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// In-memory ledger test double that records credits and enforces
/// idempotence per `(entity_id, source_kind)`, mirroring what a real ledger
/// backend is expected to guarantee.
pub struct RecordingCreditLedger {
    seen: Mutex<std::collections::HashSet<(String, String)>>,
    entries: Mutex<Vec<(String, u32, String, String, String)>>,
}

impl RecordingCreditLedger {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(std::collections::HashSet::new()),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub async fn entries(&self) -> Vec<(String, u32, String, String, String)> {
        self.entries.lock().await.clone()
    }
}

impl Default for RecordingCreditLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CreditLedger for RecordingCreditLedger {
    async fn add_credits(
        &self,
        user_id: &str,
        amount: u32,
        source_kind: &str,
        entity_id: &str,
        reason: &str,
    ) -> anyhow::Result<()> {
        let key = (entity_id.to_string(), source_kind.to_string());
        let mut seen = self.seen.lock().await;
        if !seen.insert(key) {
            return Ok(());
        }
        self.entries.lock().await.push((
            user_id.to_string(),
            amount,
            source_kind.to_string(),
            entity_id.to_string(),
            reason.to_string(),
        ));
        Ok(())
    }
}

/// Open a job store at the specified path.
///
/// The backend is selected based on enabled features; SQLite is the only
/// backend today.
pub async fn open(path: &str) -> anyhow::Result<Arc<SqliteStore>> {
    #[cfg(feature = "sqlite")]
    {
        let store = SqliteStore::open(path).await?;
        return Ok(Arc::new(store));
    }

    #[cfg(not(feature = "sqlite"))]
    {
        Err(anyhow::anyhow!(
            "no backend available for path: {path}. enable the 'sqlite' feature."
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_display_roundtrip() {
        use std::str::FromStr;
        for status in [
            JobStatus::Enqueued,
            JobStatus::Researching,
            JobStatus::ResearchComplete,
            JobStatus::Generating,
            JobStatus::Complete,
            JobStatus::PartialComplete,
            JobStatus::Failed,
        ] {
            let s = status.to_string();
            assert_eq!(JobStatus::from_str(&s).unwrap(), status);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Complete.is_terminal());
        assert!(JobStatus::PartialComplete.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Generating.is_terminal());
        assert!(!JobStatus::Enqueued.is_terminal());
    }

    #[test]
    fn test_content_stats_empty() {
        let stats = ContentStats::from_rows(&[]);
        assert_eq!(stats.total_posts, 0);
        assert_eq!(stats.total_words, 0);
    }

    #[tokio::test]
    async fn test_recording_ledger_is_idempotent() {
        let ledger = RecordingCreditLedger::new();
        ledger
            .add_credits("user-1", 30, "job_refund", "job-1", "partial completion")
            .await
            .unwrap();
        ledger
            .add_credits("user-1", 30, "job_refund", "job-1", "partial completion")
            .await
            .unwrap();

        let entries = ledger.entries().await;
        assert_eq!(entries.len(), 1);
    }
}
