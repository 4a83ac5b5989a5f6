//! Filing index client.
//!
//! Talks to an EDGAR-style filing index: a ticker directory resolves a
//! company to its CIK, a submissions endpoint lists recent filings, and the
//! archive serves the primary document of each filing. Base URLs are
//! configurable so tests can point at a mock server. Every call carries a
//! contact-bearing user-agent and is wrapped in the shared retry policy.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use firmfacts_shared::{FilingsConfig, FirmfactsError, Result, RetryPolicy};

use crate::sections::strip_html;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// A company resolved through the ticker directory.
#[derive(Debug, Clone)]
pub struct CompanyRef {
    pub cik: u64,
    pub ticker: String,
    pub title: String,
}

/// One filing listed in a company's submission history.
#[derive(Debug, Clone)]
pub struct FilingRef {
    pub accession_number: String,
    pub form_type: String,
    pub filing_date: NaiveDate,
    pub primary_document: String,
}

/// A retrieved filing with its document converted to plain text.
#[derive(Debug, Clone)]
pub struct FilingDocument {
    pub filing: FilingRef,
    pub source_url: String,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Wire formats
// ---------------------------------------------------------------------------

/// Entry in the ticker directory (`company_tickers.json`).
#[derive(Debug, Deserialize)]
struct TickerEntry {
    cik_str: u64,
    ticker: String,
    title: String,
}

/// Submissions endpoint payload. Filing fields arrive as parallel arrays.
#[derive(Debug, Deserialize)]
struct Submissions {
    filings: SubmissionFilings,
}

#[derive(Debug, Deserialize)]
struct SubmissionFilings {
    recent: RecentFilings,
}

#[derive(Debug, Deserialize)]
struct RecentFilings {
    #[serde(rename = "accessionNumber")]
    accession_number: Vec<String>,
    form: Vec<String>,
    #[serde(rename = "filingDate")]
    filing_date: Vec<String>,
    #[serde(rename = "primaryDocument")]
    primary_document: Vec<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the filing index.
pub struct FilingsClient {
    config: FilingsConfig,
    client: Client,
    retry: RetryPolicy,
}

impl FilingsClient {
    pub fn new(config: FilingsConfig, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FirmfactsError::retrieval(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            retry,
        })
    }

    /// Resolve a company name or ticker to its CIK via the ticker directory.
    /// Ticker matches are exact; name matches are case-insensitive substring.
    pub async fn lookup_company(&self, query: &str) -> Result<Option<CompanyRef>> {
        let url = format!("{}/files/company_tickers.json", self.config.base_url);

        let entries: HashMap<String, TickerEntry> = self
            .retry
            .run("ticker-directory", || async {
                let resp = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| FirmfactsError::retrieval(format!("{url}: {e}")))?;
                if !resp.status().is_success() {
                    return Err(FirmfactsError::retrieval(format!(
                        "{url}: HTTP {}",
                        resp.status()
                    )));
                }
                resp.json()
                    .await
                    .map_err(|e| FirmfactsError::retrieval(format!("{url}: decode: {e}")))
            })
            .await?;

        let query_lower = query.trim().to_lowercase();
        let found = entries
            .values()
            .find(|e| e.ticker.to_lowercase() == query_lower)
            .or_else(|| {
                entries
                    .values()
                    .find(|e| e.title.to_lowercase().contains(&query_lower))
            });

        Ok(found.map(|e| {
            debug!(cik = e.cik_str, ticker = %e.ticker, "resolved company");
            CompanyRef {
                cik: e.cik_str,
                ticker: e.ticker.clone(),
                title: e.title.clone(),
            }
        }))
    }

    /// List a company's recent filings, filtered by configured form types
    /// and maximum age, bounded by `max_filings`.
    pub async fn recent_filings(&self, cik: u64) -> Result<Vec<FilingRef>> {
        let url = format!("{}/submissions/CIK{cik:010}.json", self.config.data_base_url);

        let submissions: Submissions = self
            .retry
            .run("submissions", || async {
                let resp = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| FirmfactsError::retrieval(format!("{url}: {e}")))?;
                if !resp.status().is_success() {
                    return Err(FirmfactsError::retrieval(format!(
                        "{url}: HTTP {}",
                        resp.status()
                    )));
                }
                resp.json()
                    .await
                    .map_err(|e| FirmfactsError::retrieval(format!("{url}: decode: {e}")))
            })
            .await?;

        let recent = &submissions.filings.recent;
        let today = Utc::now().date_naive();
        let mut filings = Vec::new();

        for i in 0..recent.accession_number.len() {
            let (Some(accession), Some(form), Some(date), Some(doc)) = (
                recent.accession_number.get(i),
                recent.form.get(i),
                recent.filing_date.get(i),
                recent.primary_document.get(i),
            ) else {
                break; // ragged parallel arrays
            };

            if !self.config.form_types.iter().any(|f| f == form) {
                continue;
            }

            let Ok(filing_date) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
                continue;
            };
            if (today - filing_date).num_days() > self.config.max_filing_age_days {
                continue;
            }

            filings.push(FilingRef {
                accession_number: accession.clone(),
                form_type: form.clone(),
                filing_date,
                primary_document: doc.clone(),
            });

            if filings.len() >= self.config.max_filings {
                break;
            }
        }

        Ok(filings)
    }

    /// Fetch one filing's primary document and convert it to plain text.
    pub async fn fetch_document(&self, cik: u64, filing: &FilingRef) -> Result<FilingDocument> {
        let accession = filing.accession_number.replace('-', "");
        let url = format!(
            "{}/Archives/edgar/data/{cik}/{accession}/{}",
            self.config.base_url, filing.primary_document
        );

        let body = self
            .retry
            .run("filing-document", || async {
                let resp = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| FirmfactsError::retrieval(format!("{url}: {e}")))?;
                if !resp.status().is_success() {
                    return Err(FirmfactsError::retrieval(format!(
                        "{url}: HTTP {}",
                        resp.status()
                    )));
                }
                resp.text()
                    .await
                    .map_err(|e| FirmfactsError::retrieval(format!("{url}: body: {e}")))
            })
            .await?;

        Ok(FilingDocument {
            filing: filing.clone(),
            source_url: url,
            text: strip_html(&body),
        })
    }

    /// Full retrieval pass: resolve the company, list matching filings, and
    /// fetch each document. An unresolvable company yields an empty list.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<FilingDocument>> {
        let Some(company) = self.lookup_company(query).await? else {
            info!("company not found in ticker directory");
            return Ok(Vec::new());
        };

        let filings = self.recent_filings(company.cik).await?;
        info!(
            cik = company.cik,
            filings = filings.len(),
            "retrieving filing documents"
        );

        let mut documents = Vec::new();
        for filing in &filings {
            match self.fetch_document(company.cik, filing).await {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    // One unreadable filing should not sink the rest.
                    tracing::warn!(
                        accession = %filing.accession_number,
                        error = %e,
                        "filing document fetch failed"
                    );
                }
            }
        }

        Ok(documents)
    }
}
