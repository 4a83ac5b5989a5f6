//! Shared pipeline steps and progress helpers used by every tier.
//!
//! Step-status and progress-counter writes are best-effort: a repository
//! failure on these non-critical writes is logged and swallowed, never
//! aborting the tier.

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use firmfacts_chunker::chunk_pages;
use firmfacts_extractor::{ExtractedFact, score_candidates};
use firmfacts_shared::{
    CrawlAttempt, CrawledPage, Fact, FirmfactsError, JobId, ProgressDelta, Result, StepName,
    StepStatus,
};
use firmfacts_storage::Storage;

use super::TierDeps;

/// Best-effort step-status update.
pub async fn set_step(storage: &Storage, job_id: &JobId, step: StepName, status: StepStatus) {
    if let Err(e) = storage.update_step_status(job_id, step, status).await {
        warn!(step = step.as_str(), error = %e, "failed to update step status");
    }
}

/// Best-effort progress-counter update.
pub async fn add_progress(storage: &Storage, job_id: &JobId, delta: ProgressDelta) {
    if let Err(e) = storage.update_progress(job_id, delta).await {
        warn!(error = %e, "failed to update progress counters");
    }
}

/// Persist a tier's facts. Individual insert failures are logged and the
/// remaining facts continue; re-running a tier therefore never re-persists
/// work that already returned successfully.
pub async fn persist_facts(storage: &Storage, job_id: &JobId, facts: &[Fact]) {
    for fact in facts {
        if let Err(e) = storage.insert_fact(fact).await {
            warn!(fact_type = fact.fact_type.as_str(), error = %e, "failed to persist fact");
        }
    }
    add_progress(
        storage,
        job_id,
        ProgressDelta {
            facts_extracted: Some(facts.len() as u64),
            ..Default::default()
        },
    )
    .await;
}

/// Best-effort crawl-history record for a single source-page fetch.
pub async fn log_fetch(
    storage: &Storage,
    job_id: &JobId,
    url: &str,
    page: Option<&CrawledPage>,
    error: Option<&FirmfactsError>,
) {
    let attempt = CrawlAttempt {
        url: url.to_string(),
        status_code: page.map(|p| p.status_code),
        content_length: page.map(|p| p.html.len() as u64),
        word_count: page.map(|p| p.word_count),
        priority_score: 0,
        error_message: error.map(|e| e.to_string()),
        crawled_at: Utc::now(),
    };
    if let Err(e) = storage.upsert_crawl_history(job_id, &attempt).await {
        warn!(%url, error = %e, "failed to record fetch attempt");
    }
}

/// Attribute locally-scored extractions to a job and tier.
pub fn into_facts(extracted: Vec<ExtractedFact>, job_id: &JobId, tier: u8) -> Vec<Fact> {
    extracted
        .into_iter()
        .map(|e| Fact {
            id: Uuid::now_v7().to_string(),
            job_id: job_id.clone(),
            fact_type: e.fact_type,
            fact_data: e.fact_data,
            confidence_score: e.confidence,
            source_url: e.source_url,
            source_text: e.source_text,
            tier_used: tier,
            validated: false,
            created_at: Utc::now(),
        })
        .collect()
}

/// Run the shared chunk → embed → extract pipeline over retrieved pages.
///
/// Embedding failure marks its step failed but never aborts extraction.
/// Chunk-level extraction failures are skipped; the pipeline only errors
/// when every chunk failed, which makes the tier retryable.
pub async fn chunk_embed_extract(
    deps: &TierDeps,
    job_id: &JobId,
    company: &str,
    pages: &[CrawledPage],
) -> Result<Vec<ExtractedFact>> {
    let storage = &deps.storage;

    // --- Chunking ---
    set_step(storage, job_id, StepName::Chunking, StepStatus::Running).await;
    let chunks = chunk_pages(pages, &deps.chunking);
    add_progress(
        storage,
        job_id,
        ProgressDelta {
            chunks_created: Some(chunks.len() as u64),
            ..Default::default()
        },
    )
    .await;
    set_step(storage, job_id, StepName::Chunking, StepStatus::Completed).await;

    if chunks.is_empty() {
        debug!("no chunks produced, skipping embed/extract");
        return Ok(Vec::new());
    }

    // --- Embedding (non-fatal) ---
    set_step(storage, job_id, StepName::Embedding, StepStatus::Running).await;
    let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    match deps.embedder.embed(&contents).await {
        Ok(vectors) => {
            add_progress(
                storage,
                job_id,
                ProgressDelta {
                    embeddings_generated: Some(vectors.len() as u64),
                    ..Default::default()
                },
            )
            .await;
            set_step(storage, job_id, StepName::Embedding, StepStatus::Completed).await;
        }
        Err(e) => {
            warn!(error = %e, "embedding failed, continuing without vectors");
            set_step(storage, job_id, StepName::Embedding, StepStatus::Failed).await;
        }
    }

    // --- Extraction ---
    set_step(storage, job_id, StepName::Extraction, StepStatus::Running).await;
    let mut extracted = Vec::new();
    let mut failures = 0usize;

    for chunk in &chunks {
        match deps.llm.extract(chunk, company).await {
            Ok(candidates) => {
                let mut facts = score_candidates(chunk, candidates);
                facts.retain(|f| f.confidence >= deps.confidence_threshold);
                extracted.extend(facts);
            }
            Err(e) => {
                // Chunk-local failure: skip this chunk, keep going.
                debug!(chunk = %chunk.id, error = %e, "chunk extraction failed");
                failures += 1;
            }
        }
    }

    if failures == chunks.len() {
        set_step(storage, job_id, StepName::Extraction, StepStatus::Failed).await;
        return Err(FirmfactsError::extraction(format!(
            "all {failures} chunks failed extraction"
        )));
    }

    set_step(storage, job_id, StepName::Extraction, StepStatus::Completed).await;
    Ok(extracted)
}
