//! Shared types, error model, configuration, and retry policy for firmfacts.
//!
//! This crate is the foundation depended on by all other firmfacts crates.
//! It provides:
//! - [`FirmfactsError`] — the unified error type
//! - Domain types ([`Job`], [`Fact`], [`CrawledPage`], [`TextChunk`], [`JobResult`])
//! - Configuration ([`AppConfig`], config loading)
//! - [`RetryPolicy`] — bounded exponential backoff for tiers and API calls

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ChunkingConfig, CrawlerConfig, DatabaseConfig, EmbeddingConfig, FilingsConfig,
    LlmConfig, OrchestratorConfig, RetryConfig, SourcesConfig, api_key_from_env, config_dir,
    config_file_path, expand_home, init_config, load_config, load_config_from,
};
pub use error::{FirmfactsError, Result};
pub use retry::RetryPolicy;
pub use types::{
    CrawlAttempt, CrawledPage, ExtractionMethod, Fact, FactData, FactType, Job, JobId, JobResult,
    JobStatus, ProgressDelta, StepName, StepStatus, StopReason, TextChunk, TierResult, TierStatus,
};
