//! Admission-time and retrieval-time error taxonomy
//!
//! Input errors are rejected synchronously, before anything is persisted or
//! enqueued.

use contentforge_core::JobStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("niche must not be empty")]
    EmptyNiche,

    #[error("value_propositions must contain between 1 and 10 entries, got {0}")]
    InvalidValuePropositionCount(usize),

    #[error("value proposition at index {0} must not be empty")]
    EmptyValueProposition(usize),

    #[error("tone {0:?} is not one of the accepted tones")]
    InvalidTone(String),

    #[error("total_blogs must be between 1 and 50, got {0}")]
    InvalidTotalBlogs(u32),

    #[error("blog_type_allocations must sum to total_blogs ({total_blogs}), got {sum}")]
    AllocationSumMismatch { total_blogs: u32, sum: u32 },

    #[error("target_word_count must be between 500 and 2500, got {0}")]
    InvalidWordCount(u32),

    #[error("user_id must not be empty")]
    EmptyUserId,

    #[error("job {0} is already enqueued or running")]
    DuplicateJob(String),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("content is only available for COMPLETE or PARTIAL_COMPLETE jobs (current status: {0})")]
    ContentNotReady(JobStatus),
}
