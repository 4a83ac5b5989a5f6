//! Core domain types for firmfacts enrichment jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for enrichment job identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new time-sortable job identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Job state machine
// ---------------------------------------------------------------------------

/// Terminal and non-terminal states of an enrichment job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    PartialSuccess,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Storage/display string for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::PartialSuccess => "partial_success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the job can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::PartialSuccess | Self::Failed | Self::Cancelled
        )
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "partial_success" => Ok(Self::PartialSuccess),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Status of one pipeline step within a job. Each step advances
/// `pending → running → {completed | failed}` independently; a failed step
/// re-enters `running` only when a later tier re-invokes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown step status: {other}")),
        }
    }
}

/// The four tracked pipeline steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepName {
    Crawling,
    Chunking,
    Embedding,
    Extraction,
}

impl StepName {
    /// Column-name string used by the job repository.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crawling => "crawling",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Extraction => "extraction",
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// An enrichment job for one company domain. Owned by the storage layer;
/// the orchestrator mutates it only through repository calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier (UUID v7).
    pub id: JobId,
    /// Company domain being enriched, e.g. `acme.com`.
    pub domain: String,
    /// Company display name, when known (used for filing lookup and news queries).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    /// Overall job status.
    pub status: JobStatus,
    /// Per-step statuses.
    pub crawling_status: StepStatus,
    pub chunking_status: StepStatus,
    pub embedding_status: StepStatus,
    pub extraction_status: StepStatus,
    /// Progress counters, cumulative across tiers.
    pub pages_crawled: u64,
    pub chunks_created: u64,
    pub embeddings_generated: u64,
    pub facts_extracted: u64,
    /// Number of tier retry attempts consumed so far.
    pub retry_count: u32,
    /// Populated when the job ends failed or partial_success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Liveness timestamp refreshed by the heartbeat task while running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

/// Partial progress-counter update. `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressDelta {
    pub pages_crawled: Option<u64>,
    pub chunks_created: Option<u64>,
    pub embeddings_generated: Option<u64>,
    pub facts_extracted: Option<u64>,
}

// ---------------------------------------------------------------------------
// Crawl output
// ---------------------------------------------------------------------------

/// A fetched page with extracted plain text. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawledPage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Raw response body.
    pub html: String,
    /// Plain text extracted from the body.
    pub text: String,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub word_count: u64,
    pub fetched_at: DateTime<Utc>,
}

/// One crawl attempt (success or failure) recorded per (job, url).
#[derive(Debug, Clone)]
pub struct CrawlAttempt {
    pub url: String,
    pub status_code: Option<u16>,
    pub content_length: Option<u64>,
    pub word_count: Option<u64>,
    pub priority_score: i64,
    pub error_message: Option<String>,
    pub crawled_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

/// A bounded, overlap-seeded text segment used as the unit of extraction input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChunk {
    pub id: String,
    pub content: String,
    pub source_url: String,
    /// Position of this chunk within its source page.
    pub chunk_index: usize,
    pub word_count: u64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Facts
// ---------------------------------------------------------------------------

/// Categories of extracted facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    Facility,
    EmployeeCount,
    BusinessDescription,
    Product,
    Subsidiary,
    Geography,
    Financial,
    Personnel,
}

impl FactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Facility => "facility",
            Self::EmployeeCount => "employee_count",
            Self::BusinessDescription => "business_description",
            Self::Product => "product",
            Self::Subsidiary => "subsidiary",
            Self::Geography => "geography",
            Self::Financial => "financial",
            Self::Personnel => "personnel",
        }
    }
}

impl std::str::FromStr for FactType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "facility" => Ok(Self::Facility),
            "employee_count" => Ok(Self::EmployeeCount),
            "business_description" => Ok(Self::BusinessDescription),
            "product" => Ok(Self::Product),
            "subsidiary" => Ok(Self::Subsidiary),
            "geography" => Ok(Self::Geography),
            "financial" => Ok(Self::Financial),
            "personnel" => Ok(Self::Personnel),
            other => Err(format!("unknown fact type: {other}")),
        }
    }
}

/// Typed fact payload, serialized as JSON in the facts table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FactData {
    Facility {
        name: Option<String>,
        location: String,
    },
    EmployeeCount {
        count: u64,
    },
    BusinessDescription {
        description: String,
    },
    Product {
        name: String,
    },
    Subsidiary {
        name: String,
    },
    Geography {
        region: String,
    },
    Financial {
        metric: String,
        value: String,
    },
    Personnel {
        name: String,
        role: Option<String>,
    },
}

impl FactData {
    /// The display value used for numeric-token confidence bonuses.
    pub fn value_text(&self) -> String {
        match self {
            Self::Facility { name, location } => match name {
                Some(n) => format!("{n}, {location}"),
                None => location.clone(),
            },
            Self::EmployeeCount { count } => count.to_string(),
            Self::BusinessDescription { description } => description.clone(),
            Self::Product { name } => name.clone(),
            Self::Subsidiary { name } => name.clone(),
            Self::Geography { region } => region.clone(),
            Self::Financial { metric, value } => format!("{metric}: {value}"),
            Self::Personnel { name, role } => match role {
                Some(r) => format!("{name} ({r})"),
                None => name.clone(),
            },
        }
    }
}

/// How a fact was produced; drives the confidence base score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Parsed from structured data (filing metadata, JSON endpoints).
    Structured,
    /// Produced by the LLM extraction collaborator.
    Llm,
    /// Matched by a section-keyed regex pattern.
    Regex,
}

/// One extracted, typed, confidence-scored datum. Append-only once created;
/// later human review only flips `validated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    pub job_id: JobId,
    pub fact_type: FactType,
    pub fact_data: FactData,
    /// Always in `[0, 1]`, recomputed from evidence — never a placeholder.
    pub confidence_score: f64,
    pub source_url: String,
    /// Evidence snippet the fact was extracted from.
    pub source_text: String,
    /// Tier (1..=3) whose processor produced this fact.
    pub tier_used: u8,
    pub validated: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tier and job results
// ---------------------------------------------------------------------------

/// Outcome of one tier pass. Aggregation/reporting only — not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierStatus {
    Completed,
    Failed,
    Skipped,
}

/// Per-tier outcome returned to the orchestrator.
#[derive(Debug, Clone)]
pub struct TierResult {
    pub tier: u8,
    pub facts: Vec<Fact>,
    pub processing_time_ms: u128,
    pub status: TierStatus,
    pub error: Option<String>,
}

impl TierResult {
    /// A skipped tier with no work done.
    pub fn skipped(tier: u8) -> Self {
        Self {
            tier,
            facts: Vec::new(),
            processing_time_ms: 0,
            status: TierStatus::Skipped,
            error: None,
        }
    }
}

/// Why the orchestrator ceased processing a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    ConfidenceThresholdMet,
    Timeout,
    AllTiersExhausted,
    FatalError,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfidenceThresholdMet => "confidence_threshold_met",
            Self::Timeout => "timeout",
            Self::AllTiersExhausted => "all_tiers_exhausted",
            Self::FatalError => "fatal_error",
        }
    }
}

/// Final output of one orchestrator execution.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub final_status: JobStatus,
    pub total_facts_extracted: usize,
    /// Mean confidence over all collected facts; 0.0 when no facts exist.
    pub average_confidence: f64,
    /// Tiers that fully completed, in execution order.
    pub tiers_completed: Vec<u8>,
    pub total_runtime_seconds: u64,
    pub stop_reason: Option<StopReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_roundtrip() {
        let id = JobId::new();
        let s = id.to_string();
        let parsed: JobId = s.parse().expect("parse JobId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn job_status_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::PartialSuccess,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            let parsed: JobStatus = status.as_str().parse().expect("parse status");
            assert_eq!(parsed, status);
        }
        assert!("bogus".parse::<JobStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::PartialSuccess.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn fact_data_serialization() {
        let data = FactData::Facility {
            name: Some("HQ".into()),
            location: "Austin, Texas".into(),
        };
        let json = serde_json::to_string(&data).expect("serialize");
        assert!(json.contains(r#""kind":"facility""#));
        let parsed: FactData = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.value_text(), "HQ, Austin, Texas");
    }

    #[test]
    fn fact_data_value_text_has_numeric_token() {
        let data = FactData::EmployeeCount { count: 4200 };
        assert!(data.value_text().chars().any(|c| c.is_ascii_digit()));
    }
}
