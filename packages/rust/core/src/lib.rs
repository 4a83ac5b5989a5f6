//! Enrichment orchestration for firmfacts.
//!
//! Composes the crawl, chunk, embed, and extract steps into tiered
//! processors, sequences them under a time budget with retry and
//! confidence-based stopping, and drives the per-job state machine.

pub mod context;
pub mod orchestrator;
pub mod runner;
pub mod setup;
pub mod tiers;

pub use context::EnrichmentContext;
pub use orchestrator::Orchestrator;
pub use runner::JobRunner;
pub use setup::build_runtime;
pub use tiers::{Tier1Corporate, Tier2Professional, Tier3News, TierDeps, TierProcessor};
