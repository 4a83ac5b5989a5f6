//! Production wiring for the enrichment pipeline.
//!
//! Builds the orchestrator and runner from application config: the storage
//! handle is constructed once and shared by reference, collaborators that
//! need API keys degrade to their disabled variants when the key env var
//! is unset.

use std::sync::Arc;

use tracing::info;

use firmfacts_crawler::Crawler;
use firmfacts_extractor::{
    ChatLlmExtractor, DisabledEmbedder, DisabledLlmExtractor, Embedder, HttpEmbedder,
    LlmExtractor,
};
use firmfacts_filings::FilingsClient;
use firmfacts_shared::{AppConfig, Result, RetryPolicy, api_key_from_env};
use firmfacts_storage::Storage;

use crate::orchestrator::Orchestrator;
use crate::runner::JobRunner;
use crate::tiers::{Tier1Corporate, Tier2Professional, Tier3News, TierDeps, TierProcessor};

/// Assemble the orchestrator and its supervised runner.
pub fn build_runtime(storage: Arc<Storage>, config: &AppConfig) -> Result<(Arc<Orchestrator>, JobRunner)> {
    let retry = RetryPolicy::new(&config.retry);

    let embedder: Arc<dyn Embedder> =
        match api_key_from_env(&config.embeddings.api_key_env) {
            Some(key) => Arc::new(HttpEmbedder::new(&config.embeddings, key, retry.clone())?),
            None => {
                info!(
                    env = %config.embeddings.api_key_env,
                    "embedding API key not set, embeddings disabled"
                );
                Arc::new(DisabledEmbedder)
            }
        };

    let llm: Arc<dyn LlmExtractor> = match api_key_from_env(&config.llm.api_key_env) {
        Some(key) => Arc::new(ChatLlmExtractor::new(&config.llm, key, retry.clone())?),
        None => {
            info!(
                env = %config.llm.api_key_env,
                "LLM API key not set, LLM extraction disabled"
            );
            Arc::new(DisabledLlmExtractor)
        }
    };

    let deps = TierDeps {
        storage: storage.clone(),
        embedder,
        llm,
        chunking: config.chunking.clone(),
        confidence_threshold: config.orchestrator.confidence_threshold,
    };

    let crawler = Crawler::new(config.crawler.clone())?;
    let filings = FilingsClient::new(config.filings.clone(), retry.clone())?;

    let tiers: Vec<Arc<dyn TierProcessor>> = vec![
        Arc::new(Tier1Corporate::new(deps.clone(), crawler, filings)),
        Arc::new(Tier2Professional::new(
            deps.clone(),
            &config.sources,
            &config.crawler,
        )?),
        Arc::new(Tier3News::new(deps, &config.sources, &config.crawler)?),
    ];

    let orchestrator = Arc::new(Orchestrator::new(
        storage.clone(),
        tiers,
        config.orchestrator.clone(),
        &config.retry,
    ));
    let runner = JobRunner::new(
        storage,
        orchestrator.clone(),
        config.orchestrator.heartbeat_interval_ms,
        config.orchestrator.cleanup_interval_ms,
    );

    Ok((orchestrator, runner))
}
