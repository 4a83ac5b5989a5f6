//! Tier processors.
//!
//! Each tier composes a source-specific retrieval step with the shared
//! chunk → embed → extract pipeline. Tiers are independent implementations
//! of [`TierProcessor`]; shared behavior lives in free functions under
//! [`steps`], not in a base type.

mod corporate;
mod news;
mod professional;
pub mod steps;

use std::sync::Arc;

use async_trait::async_trait;

use firmfacts_shared::{ChunkingConfig, Result, TierResult};
use firmfacts_storage::Storage;

use crate::context::EnrichmentContext;

pub use corporate::Tier1Corporate;
pub use news::Tier3News;
pub use professional::Tier2Professional;

/// One source-category enrichment pass.
#[async_trait]
pub trait TierProcessor: Send + Sync {
    /// Tier number (1 = corporate/financial, 2 = professional, 3 = news).
    fn tier(&self) -> u8;

    /// Human-readable name for logs.
    fn name(&self) -> &'static str;

    /// Whether this tier can run for the job: false when structurally
    /// inapplicable or when an earlier tier already satisfied the
    /// confidence threshold under stop-on-threshold.
    async fn can_handle(&self, ctx: &EnrichmentContext) -> bool;

    /// Run the tier. Facts are persisted by the tier itself so partial
    /// work survives a later failure; the returned result carries them to
    /// the orchestrator for merging. Errors are retryable by the
    /// orchestrator's retry policy.
    async fn execute(&self, ctx: &EnrichmentContext) -> Result<TierResult>;
}

/// Collaborators shared by every tier.
#[derive(Clone)]
pub struct TierDeps {
    pub storage: Arc<Storage>,
    pub embedder: Arc<dyn firmfacts_extractor::Embedder>,
    pub llm: Arc<dyn firmfacts_extractor::LlmExtractor>,
    pub chunking: ChunkingConfig,
    /// Facts below this confidence are dropped before merging.
    pub confidence_threshold: f64,
}
