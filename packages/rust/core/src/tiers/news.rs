//! Tier 3 — news-article retrieval.
//!
//! Fetches news-search pages from configured URL templates (`{query}`
//! substitution), follows a bounded number of off-site article links, and
//! runs the shared chunk → embed → extract pipeline over the articles.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

use firmfacts_crawler::{extract_links, fetch_page};
use firmfacts_shared::{
    CrawledPage, CrawlerConfig, FirmfactsError, ProgressDelta, Result, SourcesConfig, StepName,
    StepStatus, TierResult, TierStatus,
};

use crate::context::EnrichmentContext;
use crate::tiers::{TierDeps, TierProcessor, steps};

pub struct Tier3News {
    deps: TierDeps,
    templates: Vec<String>,
    max_articles: usize,
    client: Client,
    delay_ms: u64,
}

impl Tier3News {
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
            templates: sources.news_search_templates.clone(),
            max_articles: sources.max_articles_per_search,
            client,
            delay_ms: crawler_config.delay_ms,
        })
    }

    async fn polite_fetch(&self, url: &Url, first: &mut bool) -> Result<CrawledPage> {
        if !*first && self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        *first = false;
        fetch_page(&self.client, url).await
    }
}

#[async_trait]
impl TierProcessor for Tier3News {
    fn tier(&self) -> u8 {
        3
    }

    fn name(&self) -> &'static str {
        "news"
    }

    async fn can_handle(&self, ctx: &EnrichmentContext) -> bool {
        !self.templates.is_empty()
            && !ctx.company_query().is_empty()
            && !ctx.threshold_reached()
    }

    #[instrument(skip_all, fields(job_id = %ctx.job.id))]
    async fn execute(&self, ctx: &EnrichmentContext) -> Result<TierResult> {
        let started = Instant::now();
        let storage = &self.deps.storage;
        let job_id = &ctx.job.id;
        let query = ctx.company_query();
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();

        steps::set_step(storage, job_id, StepName::Crawling, StepStatus::Running).await;

        let mut articles: Vec<CrawledPage> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        let mut search_failures = 0usize;
        let mut first_request = true;

        for template in &self.templates {
            let raw = template.replace("{query}", &encoded);
            let Ok(search_url) = Url::parse(&raw) else {
                errors.push(format!("invalid search url: {raw}"));
                search_failures += 1;
                continue;
            };

            let search_page = match self.polite_fetch(&search_url, &mut first_request).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(url = %search_url, error = %e, "news search fetch failed");
                    steps::log_fetch(storage, job_id, search_url.as_str(), None, Some(&e)).await;
                    errors.push(e.to_string());
                    search_failures += 1;
                    continue;
                }
            };

            // Search results link off-site; same-host links are navigation.
            let search_host = (
                search_url.host_str().unwrap_or("").to_string(),
                search_url.port(),
            );
            let article_urls: Vec<Url> = extract_links(&search_page.html, &search_url)
                .into_iter()
                .filter_map(|(link, _)| Url::parse(&link).ok())
                .filter(|u| {
                    matches!(u.scheme(), "http" | "https")
                        && (u.host_str().unwrap_or("").to_string(), u.port()) != search_host
                })
                .take(self.max_articles)
                .collect();

            debug!(
                url = %search_url,
                articles = article_urls.len(),
                "news search page fetched"
            );

            for article_url in article_urls {
                match self.polite_fetch(&article_url, &mut first_request).await {
                    Ok(page) => {
                        steps::log_fetch(storage, job_id, &page.url, Some(&page), None).await;
                        articles.push(page);
                    }
                    Err(e) => {
                        warn!(url = %article_url, error = %e, "article fetch failed");
                        steps::log_fetch(storage, job_id, article_url.as_str(), None, Some(&e))
                            .await;
                        errors.push(e.to_string());
                    }
                }
            }
        }

        // Every search endpoint failing makes the tier retryable.
        if search_failures == self.templates.len() {
            steps::set_step(storage, job_id, StepName::Crawling, StepStatus::Failed).await;
            return Err(FirmfactsError::crawl(format!(
                "all news searches failed: {}",
                errors.join("; ")
            )));
        }

        steps::add_progress(
            storage,
            job_id,
            ProgressDelta {
                pages_crawled: Some(articles.len() as u64),
                ..Default::default()
            },
        )
        .await;
        steps::set_step(storage, job_id, StepName::Crawling, StepStatus::Completed).await;

        let extracted =
            steps::chunk_embed_extract(&self.deps, job_id, &query, &articles).await?;
        let facts = steps::into_facts(extracted, job_id, self.tier());
        steps::persist_facts(storage, job_id, &facts).await;

        info!(facts = facts.len(), "tier 3 pass complete");
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
    use firmfacts_shared::{FactType, TextChunk};
    use firmfacts_storage::Storage;

    use crate::context::EnrichmentContext;
    use crate::tiers::TierDeps;

    struct StubLlm;

    #[async_trait]
    impl LlmExtractor for StubLlm {
        async fn extract(
            &self,
            _chunk: &TextChunk,
            _company: &str,
        ) -> firmfacts_shared::Result<Vec<LlmCandidate>> {
            let candidates: Vec<LlmCandidate> = serde_json::from_str(
                r#"[{"fact_type": "geography", "value": "Brazil"}]"#,
            )
            .expect("valid candidate json");
            Ok(candidates)
        }
    }

    async fn test_storage() -> Arc<Storage> {
        let tmp = std::env::temp_dir().join(format!("ff_tier3_test_{}.db", Uuid::now_v7()));
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

    #[tokio::test]
    async fn follows_offsite_article_links_up_to_the_bound() {
        let search = MockServer::start().await;
        let outlet = MockServer::start().await;

        let article_body = format!(
            "<html><body><h1>Acme expands</h1><p>Acme announced a new plant in Brazil, \
             adding capacity for its automation business. {}</p></body></html>",
            "The expansion continues a multi-year growth plan. ".repeat(3)
        );
        for route in ["/story-1", "/story-2", "/story-3"] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(article_body.clone())
                        .insert_header("content-type", "text/html"),
                )
                .mount(&outlet)
                .await;
        }

        // Search page links: three off-site stories plus on-site navigation
        // that must be ignored.
        let search_body = format!(
            r#"<html><body>
                <a href="/settings">Settings</a>
                <a href="{0}/story-1">Story one</a>
                <a href="{0}/story-2">Story two</a>
                <a href="{0}/story-3">Story three</a>
            </body></html>"#,
            outlet.uri()
        );
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(search_body)
                    .insert_header("content-type", "text/html"),
            )
            .mount(&search)
            .await;

        let storage = test_storage().await;
        let job = storage
            .create_job("acme.com", Some("Acme Industrial"))
            .await
            .unwrap();

        let sources = SourcesConfig {
            professional_page_templates: vec![],
            news_search_templates: vec![format!("{}/search?q={{query}}", search.uri())],
            max_articles_per_search: 2,
        };
        let tier = Tier3News::new(deps(storage.clone()), &sources, &crawler_config()).unwrap();
        let ctx = EnrichmentContext::new(job.clone(), 0.7, true);
        assert!(tier.can_handle(&ctx).await);

        let result = tier.execute(&ctx).await.unwrap();

        assert_eq!(result.status, TierStatus::Completed);
        assert!(result.facts.iter().all(|f| f.tier_used == 3));
        assert!(
            result
                .facts
                .iter()
                .any(|f| f.fact_type == FactType::Geography)
        );

        // Bounded to two articles; the on-site settings link was ignored.
        let history = storage.list_crawl_history(&job.id).await.unwrap();
        let article_rows = history
            .iter()
            .filter(|h| h.url.contains("/story-"))
            .count();
        assert_eq!(article_rows, 2);
        assert!(!history.iter().any(|h| h.url.contains("/settings")));

        let stored = storage.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.pages_crawled, 2);
    }

    #[tokio::test]
    async fn all_searches_failing_makes_the_tier_retryable() {
        let search = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&search)
            .await;

        let storage = test_storage().await;
        let job = storage.create_job("acme.com", Some("Acme")).await.unwrap();

        let sources = SourcesConfig {
            professional_page_templates: vec![],
            news_search_templates: vec![format!("{}/search?q={{query}}", search.uri())],
            max_articles_per_search: 2,
        };
        let tier = Tier3News::new(deps(storage.clone()), &sources, &crawler_config()).unwrap();
        let ctx = EnrichmentContext::new(job, 0.7, true);

        let result = tier.execute(&ctx).await;
        assert!(matches!(result.unwrap_err(), FirmfactsError::Crawl(_)));
    }
}
