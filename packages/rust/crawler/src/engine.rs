//! Prioritized, politeness-bounded web crawl over one company domain.
//!
//! The crawler starts at the domain root, performs a breadth-first
//! traversal over a priority-ranked frontier, and stays within the
//! registrable domain. Fetches are sequential with an explicit delay
//! between requests; rate-limiting here is deliberate, not a throughput
//! limitation. Every page attempt is logged to crawl history, upserted by
//! (job, url).

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use url::Url;

use firmfacts_shared::{CrawlAttempt, CrawledPage, CrawlerConfig, FirmfactsError, JobId, Result};
use firmfacts_storage::Storage;

use crate::fetch::{extract_links, fetch_page};
use crate::robots::{self, RobotsVerdict};

/// Link keywords crawled before anything else (business relevance).
const HIGH_PRIORITY_KEYWORDS: &[&str] = &[
    "about",
    "company",
    "locations",
    "products",
    "services",
    "investors",
    "contact",
    "team",
    "leadership",
];

/// Link keywords crawled after high-priority matches but before the rest.
const MEDIUM_PRIORITY_KEYWORDS: &[&str] = &[
    "careers",
    "news",
    "press",
    "blog",
    "technology",
];

/// Priority score recorded in crawl history for ranked links.
const HIGH_PRIORITY_SCORE: i64 = 10;
const MEDIUM_PRIORITY_SCORE: i64 = 5;

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

/// Scope-aware domain crawler with a priority-ranked frontier.
pub struct Crawler {
    config: CrawlerConfig,
    client: Client,
}

impl Crawler {
    /// Create a new crawler with the given configuration.
    pub fn new(config: CrawlerConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| FirmfactsError::crawl(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Crawl `domain`, logging each attempt to crawl history for `job_id`.
    ///
    /// Returns at most `max_pages` pages. A full robots.txt disallow is an
    /// error (the crawling step fails); individual page failures are logged
    /// and skipped.
    #[instrument(skip_all, fields(domain = %domain, job_id = %job_id))]
    pub async fn crawl(
        &self,
        job_id: &JobId,
        domain: &str,
        storage: &Storage,
    ) -> Result<Vec<CrawledPage>> {
        let root = root_url(domain)?;
        let site = registrable_domain(domain);

        if self.config.respect_robots_txt {
            let verdict = robots::check(&self.client, &root, &self.config.user_agent).await;
            if verdict == RobotsVerdict::FullyDisallowed {
                return Err(FirmfactsError::crawl(format!(
                    "robots.txt disallows crawling {domain}"
                )));
            }
        }

        let mut frontier = Frontier::new();
        frontier.push(root.clone(), HIGH_PRIORITY_SCORE);

        let mut pages: Vec<CrawledPage> = Vec::new();
        let mut content_hashes: HashSet<String> = HashSet::new();
        let mut first_request = true;

        info!(
            max_pages = self.config.max_pages,
            delay_ms = self.config.delay_ms,
            "starting crawl"
        );

        while pages.len() < self.config.max_pages {
            let Some((url, priority)) = frontier.pop() else {
                break;
            };

            // Politeness delay between successive requests.
            if !first_request && self.config.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
            }
            first_request = false;

            match fetch_page(&self.client, &url).await {
                Ok(page) => {
                    log_attempt(storage, job_id, &page.url, priority, Some(&page), None).await;

                    let hash = content_hash(&page.html);
                    if !content_hashes.insert(hash) {
                        debug!(%url, "duplicate content, skipping");
                        continue;
                    }

                    for (link, anchor) in extract_links(&page.html, &url) {
                        if let Ok(link_url) = Url::parse(&link) {
                            if !in_scope(&link_url, &site) {
                                continue;
                            }
                            frontier.push(link_url, score_link(&link, &anchor));
                        }
                    }

                    pages.push(page);
                }
                Err(e) => {
                    // Per-page failures never halt the frontier.
                    warn!(%url, error = %e, "page fetch failed");
                    log_attempt(storage, job_id, url.as_str(), priority, None, Some(&e)).await;
                }
            }
        }

        info!(pages_fetched = pages.len(), "crawl completed");
        Ok(pages)
    }
}

/// Best-effort crawl-history write: a logging failure never aborts the crawl.
async fn log_attempt(
    storage: &Storage,
    job_id: &JobId,
    url: &str,
    priority: i64,
    page: Option<&CrawledPage>,
    error: Option<&FirmfactsError>,
) {
    let attempt = CrawlAttempt {
        url: url.to_string(),
        status_code: page.map(|p| p.status_code),
        content_length: page.map(|p| p.html.len() as u64),
        word_count: page.map(|p| p.word_count),
        priority_score: priority,
        error_message: error.map(|e| e.to_string()),
        crawled_at: Utc::now(),
    };

    if let Err(e) = storage.upsert_crawl_history(job_id, &attempt).await {
        warn!(%url, error = %e, "failed to record crawl attempt");
    }
}

// ---------------------------------------------------------------------------
// Frontier
// ---------------------------------------------------------------------------

/// Priority-ranked crawl frontier. High-priority links are dequeued before
/// medium, medium before unranked; ties preserve discovery order.
/// Duplicate URLs are rejected on push, keeping the first-seen rank.
struct Frontier {
    high: VecDeque<(Url, i64)>,
    medium: VecDeque<(Url, i64)>,
    low: VecDeque<(Url, i64)>,
    seen: HashSet<String>,
}

impl Frontier {
    fn new() -> Self {
        Self {
            high: VecDeque::new(),
            medium: VecDeque::new(),
            low: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    fn push(&mut self, url: Url, score: i64) {
        let normalized = normalize_url(&url);
        if !self.seen.insert(normalized) {
            return;
        }

        let entry = (url, score);
        if score >= HIGH_PRIORITY_SCORE {
            self.high.push_back(entry);
        } else if score >= MEDIUM_PRIORITY_SCORE {
            self.medium.push_back(entry);
        } else {
            self.low.push_back(entry);
        }
    }

    fn pop(&mut self) -> Option<(Url, i64)> {
        self.high
            .pop_front()
            .or_else(|| self.medium.pop_front())
            .or_else(|| self.low.pop_front())
    }
}

/// Rank a link by business-relevance keywords in its path or anchor text.
fn score_link(url: &str, anchor_text: &str) -> i64 {
    let haystack = format!("{} {}", url.to_lowercase(), anchor_text.to_lowercase());

    if HIGH_PRIORITY_KEYWORDS.iter().any(|k| haystack.contains(k)) {
        HIGH_PRIORITY_SCORE
    } else if MEDIUM_PRIORITY_KEYWORDS.iter().any(|k| haystack.contains(k)) {
        MEDIUM_PRIORITY_SCORE
    } else {
        0
    }
}

// ---------------------------------------------------------------------------
// URL helpers
// ---------------------------------------------------------------------------

/// Build the crawl root for a domain, defaulting to https.
pub fn root_url(domain: &str) -> Result<Url> {
    let candidate = if domain.contains("://") {
        domain.to_string()
    } else {
        format!("https://{domain}/")
    };

    Url::parse(&candidate)
        .map_err(|e| FirmfactsError::validation(format!("invalid domain {domain}: {e}")))
}

/// The registrable portion of the configured domain (strips scheme, port,
/// path, and a leading www).
fn registrable_domain(domain: &str) -> String {
    let host = domain
        .rsplit("://")
        .next()
        .unwrap_or(domain)
        .split('/')
        .next()
        .unwrap_or(domain)
        .split(':')
        .next()
        .unwrap_or(domain);
    host.trim_start_matches("www.").to_lowercase()
}

/// Only http(s) URLs on the same registrable domain are in scope.
fn in_scope(url: &Url, site: &str) -> bool {
    if url.scheme() != "http" && url.scheme() != "https" {
        return false;
    }

    match url.host_str() {
        Some(host) => {
            let host = host.to_lowercase();
            host == site || host.ends_with(&format!(".{site}"))
        }
        None => false,
    }
}

/// Normalize a URL for deduplication (strip fragment, trailing slash).
fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    let mut s = normalized.to_string();
    // Remove trailing slash for consistency (except root path)
    if s.ends_with('/') && s.matches('/').count() > 3 {
        s.pop();
    }
    s
}

/// Compute SHA-256 hash of content for duplicate-page suppression.
fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
