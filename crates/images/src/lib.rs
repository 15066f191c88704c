//! Image Provider Adapter
//!
//! Optional: given keywords, returns 0..k image descriptors. This adapter
//! never raises — a provider failure collapses to an empty vector, since
//! missing images are a cosmetic degradation, not a pipeline failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub url: String,
    pub alt: String,
    pub photographer: String,
    pub photographer_url: String,
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Fetch up to `k` images relevant to `keywords` (and optionally a
    /// persona name for more targeted results). Always returns a vector —
    /// failures are swallowed and logged rather than propagated.
    async fn fetch_images(
        &self,
        keywords: &[String],
        persona_name: Option<&str>,
        k: usize,
    ) -> Vec<ImageDescriptor>;
}

/// Default provider: no image backend is configured. Always empty.
pub struct NullImageProvider;

#[async_trait]
impl ImageProvider for NullImageProvider {
    async fn fetch_images(
        &self,
        _keywords: &[String],
        _persona_name: Option<&str>,
        _k: usize,
    ) -> Vec<ImageDescriptor> {
        Vec::new()
    }
}

/// Test double returning a fixed, repeating pool of descriptors, optionally
/// simulating total provider failure (empty regardless of `k`).
pub struct StaticImageProvider {
    pool: Vec<ImageDescriptor>,
    fail: bool,
}

impl StaticImageProvider {
    pub fn new(pool: Vec<ImageDescriptor>) -> Self {
        Self { pool, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            pool: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl ImageProvider for StaticImageProvider {
    async fn fetch_images(
        &self,
        _keywords: &[String],
        _persona_name: Option<&str>,
        k: usize,
    ) -> Vec<ImageDescriptor> {
        if self.fail || self.pool.is_empty() {
            return Vec::new();
        }
        self.pool.iter().cycle().take(k).cloned().collect()
    }
}
