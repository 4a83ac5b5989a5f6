//! Tier 1 — corporate sites and financial filings.
//!
//! Crawls the company's own domain and retrieves recent filings from the
//! filing index. Filing sections go through pattern extraction; crawled
//! pages go through the shared chunk → embed → extract pipeline. Either
//! source failing alone degrades the tier; both failing makes it
//! retryable.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use firmfacts_crawler::Crawler;
use firmfacts_extractor::extract_from_sections;
use firmfacts_filings::{FilingsClient, split_sections};
use firmfacts_shared::{
    FirmfactsError, ProgressDelta, Result, StepName, StepStatus, TierResult, TierStatus,
};

use crate::context::EnrichmentContext;
use crate::tiers::{TierDeps, TierProcessor, steps};

pub struct Tier1Corporate {
    deps: TierDeps,
    crawler: Crawler,
    filings: FilingsClient,
}

impl Tier1Corporate {
    pub fn new(deps: TierDeps, crawler: Crawler, filings: FilingsClient) -> Self {
        Self {
            deps,
            crawler,
            filings,
        }
    }
}

#[async_trait]
impl TierProcessor for Tier1Corporate {
    fn tier(&self) -> u8 {
        1
    }

    fn name(&self) -> &'static str {
        "corporate"
    }

    async fn can_handle(&self, ctx: &EnrichmentContext) -> bool {
        !ctx.job.domain.trim().is_empty() && !ctx.threshold_reached()
    }

    #[instrument(skip_all, fields(job_id = %ctx.job.id, domain = %ctx.job.domain))]
    async fn execute(&self, ctx: &EnrichmentContext) -> Result<TierResult> {
        let started = Instant::now();
        let storage = &self.deps.storage;
        let job_id = &ctx.job.id;
        let mut soft_errors: Vec<String> = Vec::new();

        // --- Corporate site crawl ---
        steps::set_step(storage, job_id, StepName::Crawling, StepStatus::Running).await;
        let pages = match self.crawler.crawl(job_id, &ctx.job.domain, storage).await {
            Ok(pages) => {
                steps::add_progress(
                    storage,
                    job_id,
                    ProgressDelta {
                        pages_crawled: Some(pages.len() as u64),
                        ..Default::default()
                    },
                )
                .await;
                steps::set_step(storage, job_id, StepName::Crawling, StepStatus::Completed).await;
                pages
            }
            Err(e) => {
                warn!(error = %e, "site crawl failed");
                steps::set_step(storage, job_id, StepName::Crawling, StepStatus::Failed).await;
                soft_errors.push(e.to_string());
                Vec::new()
            }
        };

        // --- Filing retrieval + pattern extraction ---
        let query = ctx.company_query();
        let filing_extraction = match self.filings.retrieve(&query).await {
            Ok(documents) => {
                let sections: Vec<_> = documents
                    .iter()
                    .flat_map(|doc| split_sections(&doc.text, &doc.source_url))
                    .collect();
                let extraction =
                    extract_from_sections(&sections, self.deps.confidence_threshold);
                for err in &extraction.errors {
                    soft_errors.push(err.clone());
                }
                Some(extraction)
            }
            Err(e) => {
                warn!(error = %e, "filing retrieval failed");
                soft_errors.push(e.to_string());
                None
            }
        };

        // Nothing retrievable at all: the tier is retryable.
        if pages.is_empty() && filing_extraction.is_none() {
            return Err(FirmfactsError::TierExhausted {
                tier: 1,
                attempts: 1,
                message: soft_errors.join("; "),
            });
        }

        // --- Chunk / embed / extract over crawled pages ---
        let mut extracted = Vec::new();
        if !pages.is_empty() {
            extracted.extend(
                steps::chunk_embed_extract(&self.deps, job_id, &query, &pages).await?,
            );
        }
        if let Some(extraction) = filing_extraction {
            if pages.is_empty() && !extraction.facts.is_empty() {
                // Pattern extraction ran even though the chunk pipeline did not.
                steps::set_step(storage, job_id, StepName::Extraction, StepStatus::Completed)
                    .await;
            }
            extracted.extend(extraction.facts);
        }

        let facts = steps::into_facts(extracted, job_id, self.tier());
        steps::persist_facts(storage, job_id, &facts).await;

        info!(facts = facts.len(), "tier 1 pass complete");
        Ok(TierResult {
            tier: self.tier(),
            facts,
            processing_time_ms: started.elapsed().as_millis(),
            status: TierStatus::Completed,
            error: if soft_errors.is_empty() {
                None
            } else {
                Some(soft_errors.join("; "))
            },
        })
    }
}
