//! Pipeline configuration
//!
//! TOML-backed configuration with struct defaults: a plain struct plus a
//! `Default` impl rather than a load-order-sensitive global.

use std::time::Duration;

/// Every tunable named by the external interfaces: Phase B concurrency,
/// the rate-limiter window and cap, per-task wall-clock timeout, retry
/// attempt counts, the acceptance word-count floor, and the
/// image-inlining cutoff `k`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// `MAX_CONCURRENT_CONTENT_GENERATION`: Phase B fan-out cap per job (C).
    pub max_concurrent_content_generation: usize,

    /// `REQUEST_TIMEOUT_MS`: per-task wall-clock timeout.
    pub request_timeout_ms: u64,

    /// Rate limiter window in seconds.
    pub rate_limit_window_secs: u64,

    /// Max tasks per rate-limiter window (M), shared across all in-flight
    /// jobs.
    pub rate_limit_max_per_window: u32,

    /// Phase A attempt count.
    pub phase_a_max_attempts: u32,

    /// Phase B attempt count per item.
    pub phase_b_max_attempts: u32,

    /// Acceptance floor for article length (warn-only on the final
    /// attempt).
    pub word_count_floor: u32,

    /// Soft batch size the research prompt asks for; Phase A composes the
    /// final plan by cycling through whatever the model returns rather than
    /// requiring exactly N.
    pub phase_a_batch_size: u32,

    /// Minimum surviving scenarios required to proceed past Phase A.
    pub phase_a_underfill_threshold: u32,

    /// Number of leading scenarios for which the image adapter is
    /// consulted.
    pub image_inlining_cutoff: usize,

    /// Max stalls (queue-detected lack of progress) before a task is
    /// abandoned rather than retried.
    pub max_stalls: u32,
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_content_generation: 10,
            request_timeout_ms: 300_000,
            rate_limit_window_secs: 60,
            rate_limit_max_per_window: 10,
            phase_a_max_attempts: 3,
            phase_b_max_attempts: 3,
            word_count_floor: 1000,
            phase_a_batch_size: 30,
            phase_a_underfill_threshold: 15,
            image_inlining_cutoff: 2,
            max_stalls: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_external_interface() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_concurrent_content_generation, 10);
        assert_eq!(config.request_timeout_ms, 300_000);
        assert_eq!(config.rate_limit_max_per_window, 10);
        assert_eq!(config.word_count_floor, 1000);
        assert_eq!(config.phase_a_underfill_threshold, 15);
        assert_eq!(config.image_inlining_cutoff, 2);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = PipelineConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: PipelineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.max_concurrent_content_generation, config.max_concurrent_content_generation);
    }

    #[test]
    fn test_partial_toml_uses_defaults_for_missing_fields() {
        let parsed: PipelineConfig = toml::from_str("word_count_floor = 1200\n").unwrap();
        assert_eq!(parsed.word_count_floor, 1200);
        assert_eq!(parsed.max_concurrent_content_generation, 10);
    }
}
