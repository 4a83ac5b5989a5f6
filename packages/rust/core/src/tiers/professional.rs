//! Tier 2 — professional-network company pages.
//!
//! Fetches a fixed set of profile pages built from configured URL
//! templates (`{slug}` substitution), then runs the shared
//! chunk → embed → extract pipeline over whatever loaded.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, instrument, warn};
use url::Url;

use firmfacts_crawler::fetch_page;
use firmfacts_shared::{
    CrawlerConfig, FirmfactsError, ProgressDelta, Result, SourcesConfig, StepName, StepStatus,
    TierResult, TierStatus,
};

use crate::context::EnrichmentContext;
use crate::tiers::{TierDeps, TierProcessor, steps};

pub struct Tier2Professional {
    deps: TierDeps,
    templates: Vec<String>,
    client: Client,
    delay_ms: u64,
}

impl Tier2Professional {
    pub fn new(
        deps: TierDeps,
        sources: &SourcesConfig,
        crawler_config: &CrawlerConfig,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&crawler_config.user_agent)
            .timeout(Duration::from_millis(crawler_config.timeout_ms))
            .build()
            .map_err(|e| FirmfactsError::crawl(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            deps,
            templates: sources.professional_page_templates.clone(),
            client,
            delay_ms: crawler_config.delay_ms,
        })
    }
}

#[async_trait]
impl TierProcessor for Tier2Professional {
    fn tier(&self) -> u8 {
        2
    }

    fn name(&self) -> &'static str {
        "professional"
    }

    async fn can_handle(&self, ctx: &EnrichmentContext) -> bool {
        !self.templates.is_empty()
            && !ctx.company_slug().is_empty()
            && !ctx.threshold_reached()
    }

    #[instrument(skip_all, fields(job_id = %ctx.job.id))]
    async fn execute(&self, ctx: &EnrichmentContext) -> Result<TierResult> {
        let started = Instant::now();
        let storage = &self.deps.storage;
        let job_id = &ctx.job.id;
        let slug = ctx.company_slug();

        steps::set_step(storage, job_id, StepName::Crawling, StepStatus::Running).await;

        let mut pages = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        let mut first_request = true;

        for template in &self.templates {
            let raw = template.replace("{slug}", &slug);
            let Ok(url) = Url::parse(&raw) else {
                errors.push(format!("invalid source url: {raw}"));
                continue;
            };

            if !first_request && self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            first_request = false;

            match fetch_page(&self.client, &url).await {
                Ok(page) => {
                    steps::log_fetch(storage, job_id, &page.url, Some(&page), None).await;
                    pages.push(page);
                }
                Err(e) => {
                    warn!(%url, error = %e, "profile page fetch failed");
                    steps::log_fetch(storage, job_id, url.as_str(), None, Some(&e)).await;
                    errors.push(e.to_string());
                }
            }
        }

        if pages.is_empty() {
            steps::set_step(storage, job_id, StepName::Crawling, StepStatus::Failed).await;
            return Err(FirmfactsError::crawl(format!(
                "no professional pages reachable: {}",
                errors.join("; ")
            )));
        }

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

        let extracted =
            steps::chunk_embed_extract(&self.deps, job_id, &ctx.company_query(), &pages).await?;
        let facts = steps::into_facts(extracted, job_id, self.tier());
        steps::persist_facts(storage, job_id, &facts).await;

        info!(facts = facts.len(), "tier 2 pass complete");
        Ok(TierResult {
            tier: self.tier(),
            facts,
            processing_time_ms: started.elapsed().as_millis(),
            status: TierStatus::Completed,
            error: if errors.is_empty() {
                None
            } else {
                Some(errors.join("; "))
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use firmfacts_extractor::{DisabledEmbedder, LlmCandidate, LlmExtractor};
    use firmfacts_shared::{FactType, StepStatus, TextChunk};
    use firmfacts_storage::Storage;

    use crate::context::EnrichmentContext;
    use crate::tiers::TierDeps;

    /// Proposes one product fact for every chunk it sees.
    struct StubLlm;

    #[async_trait]
    impl LlmExtractor for StubLlm {
        async fn extract(
            &self,
            _chunk: &TextChunk,
            _company: &str,
        ) -> firmfacts_shared::Result<Vec<LlmCandidate>> {
            let candidates: Vec<LlmCandidate> = serde_json::from_str(
                r#"[{"fact_type": "product", "value": "industrial robots"}]"#,
            )
            .expect("valid candidate json");
            Ok(candidates)
        }
    }

    async fn test_storage() -> Arc<Storage> {
        let tmp = std::env::temp_dir().join(format!("ff_tier2_test_{}.db", Uuid::now_v7()));
        Arc::new(Storage::open(&tmp).await.expect("open test db"))
    }

    fn deps(storage: Arc<Storage>) -> TierDeps {
        TierDeps {
            storage,
            embedder: Arc::new(DisabledEmbedder),
            llm: Arc::new(StubLlm),
            chunking: Default::default(),
            confidence_threshold: 0.5,
        }
    }

    fn crawler_config() -> CrawlerConfig {
        CrawlerConfig {
            max_pages: 5,
            delay_ms: 0,
            timeout_ms: 5_000,
            user_agent: "firmfacts/0.1.0 (enrichment bot)".into(),
            respect_robots_txt: true,
        }
    }

    fn sources(server_uri: &str) -> SourcesConfig {
        SourcesConfig {
            professional_page_templates: vec![
                format!("{server_uri}/company/{{slug}}"),
                format!("{server_uri}/org/{{slug}}"),
            ],
            news_search_templates: vec![],
            max_articles_per_search: 5,
        }
    }

    #[tokio::test]
    async fn profile_pages_flow_through_the_chunk_pipeline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/company/acme-industrial"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(
                        "<html><body><h1>Acme Industrial</h1><p>Acme Industrial builds \
                         factory automation systems and employs thousands of people \
                         across three continents.</p></body></html>",
                    )
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;
        // The second template 404s; one reachable page is enough.
        Mock::given(method("GET"))
            .and(path("/org/acme-industrial"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let job = storage
            .create_job("acme.com", Some("Acme Industrial"))
            .await
            .unwrap();

        let tier =
            Tier2Professional::new(deps(storage.clone()), &sources(&server.uri()), &crawler_config())
                .unwrap();
        let ctx = EnrichmentContext::new(job.clone(), 0.7, true);
        assert!(tier.can_handle(&ctx).await);

        let result = tier.execute(&ctx).await.unwrap();

        assert_eq!(result.status, TierStatus::Completed);
        assert!(result.error.as_deref().unwrap().contains("404"));
        assert!(!result.facts.is_empty());
        assert!(result.facts.iter().all(|f| f.tier_used == 2));
        assert!(
            result
                .facts
                .iter()
                .any(|f| f.fact_type == FactType::Product)
        );

        let stored = storage.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.crawling_status, StepStatus::Completed);
        assert_eq!(stored.chunking_status, StepStatus::Completed);
        assert_eq!(stored.extraction_status, StepStatus::Completed);
        assert!(stored.pages_crawled >= 1);
        assert!(stored.facts_extracted >= 1);

        let history = storage.list_crawl_history(&job.id).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn unreachable_sources_make_the_tier_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/company/acme"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/org/acme"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let job = storage.create_job("acme.com", Some("Acme")).await.unwrap();

        let tier =
            Tier2Professional::new(deps(storage.clone()), &sources(&server.uri()), &crawler_config())
                .unwrap();
        let ctx = EnrichmentContext::new(job.clone(), 0.7, true);

        let result = tier.execute(&ctx).await;
        assert!(matches!(result.unwrap_err(), FirmfactsError::Crawl(_)));

        let stored = storage.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.crawling_status, StepStatus::Failed);
    }
}
