//! Application configuration for firmfacts.
//!
//! User config lives at `~/.firmfacts/firmfacts.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FirmfactsError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "firmfacts.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".firmfacts";

// ---------------------------------------------------------------------------
// Config structs (matching firmfacts.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Orchestration settings.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Retry/backoff settings shared by tiers and outbound API calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Web crawl settings.
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Text chunking settings.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Filing retrieval (SEC-style index) settings.
    #[serde(default)]
    pub filings: FilingsConfig,

    /// LLM extraction collaborator settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding collaborator settings.
    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    /// Tier 2/3 source URL templates.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Storage settings.
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// `[orchestrator]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Average confidence at which processing may stop early.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Wall-clock budget for one job.
    #[serde(default = "default_max_job_runtime_minutes")]
    pub max_job_runtime_minutes: u64,

    /// Retry attempts per tier before its error is recorded.
    #[serde(default = "default_max_retries_per_tier")]
    pub max_retries_per_tier: u32,

    /// Stop once the confidence threshold is reached.
    #[serde(default = "default_true")]
    pub stop_on_confidence_threshold: bool,

    #[serde(default = "default_true")]
    pub enable_tier_1: bool,

    #[serde(default = "default_true")]
    pub enable_tier_2: bool,

    #[serde(default = "default_true")]
    pub enable_tier_3: bool,

    /// Liveness timestamp refresh interval while a job runs.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Sweep interval for releasing finished per-job resources.
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_job_runtime_minutes: default_max_job_runtime_minutes(),
            max_retries_per_tier: default_max_retries_per_tier(),
            stop_on_confidence_threshold: true,
            enable_tier_1: true,
            enable_tier_2: true,
            enable_tier_3: true,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
        }
    }
}

fn default_confidence_threshold() -> f64 {
    0.7
}
fn default_max_job_runtime_minutes() -> u64 {
    30
}
fn default_max_retries_per_tier() -> u32 {
    2
}
fn default_heartbeat_interval_ms() -> u64 {
    5_000
}
fn default_cleanup_interval_ms() -> u64 {
    60_000
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            exponential_base: default_exponential_base(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    60_000
}
fn default_exponential_base() -> f64 {
    2.0
}

/// `[crawler]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Hard bound on pages fetched per crawl.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Politeness delay between successive requests.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Per-request timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_true")]
    pub respect_robots_txt: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            delay_ms: default_delay_ms(),
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            respect_robots_txt: true,
        }
    }
}

fn default_max_pages() -> usize {
    25
}
fn default_delay_ms() -> u64 {
    500
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_user_agent() -> String {
    concat!("firmfacts/", env!("CARGO_PKG_VERSION"), " (enrichment bot)").into()
}

/// `[chunking]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    #[serde(default = "default_overlap_size")]
    pub overlap_size: usize,

    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            overlap_size: default_overlap_size(),
            min_chunk_size: default_min_chunk_size(),
        }
    }
}

fn default_max_chunk_size() -> usize {
    1_000
}
fn default_overlap_size() -> usize {
    100
}
fn default_min_chunk_size() -> usize {
    100
}

/// `[filings]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingsConfig {
    /// Archive host serving the ticker index and filing documents.
    #[serde(default = "default_filings_base_url")]
    pub base_url: String,

    /// Host serving per-company submission JSON.
    #[serde(default = "default_filings_data_url")]
    pub data_base_url: String,

    /// Contact-bearing user-agent, required by the filing index operator.
    #[serde(default = "default_filings_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_filings_timeout_secs")]
    pub timeout_secs: u64,

    /// Form types worth retrieving, e.g. 10-K.
    #[serde(default = "default_form_types")]
    pub form_types: Vec<String>,

    /// Ignore filings older than this.
    #[serde(default = "default_max_filing_age_days")]
    pub max_filing_age_days: i64,

    /// Fetch at most this many matching filings per company.
    #[serde(default = "default_max_filings")]
    pub max_filings: usize,
}

impl Default for FilingsConfig {
    fn default() -> Self {
        Self {
            base_url: default_filings_base_url(),
            data_base_url: default_filings_data_url(),
            user_agent: default_filings_user_agent(),
            timeout_secs: default_filings_timeout_secs(),
            form_types: default_form_types(),
            max_filing_age_days: default_max_filing_age_days(),
            max_filings: default_max_filings(),
        }
    }
}

fn default_filings_base_url() -> String {
    "https://www.sec.gov".into()
}
fn default_filings_data_url() -> String {
    "https://data.sec.gov".into()
}
fn default_filings_user_agent() -> String {
    "firmfacts research contact@firmfacts.dev".into()
}
fn default_filings_timeout_secs() -> u64 {
    20
}
fn default_form_types() -> Vec<String> {
    vec!["10-K".into(), "10-Q".into()]
}
fn default_max_filing_age_days() -> i64 {
    730
}
fn default_max_filings() -> usize {
    3
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_llm_api_key_env(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_llm_model() -> String {
    "moonshotai/kimi-k2.5".into()
}
fn default_llm_timeout_secs() -> u64 {
    60
}

/// `[embeddings]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embed_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_embed_base_url")]
    pub base_url: String,

    #[serde(default = "default_embed_model")]
    pub model: String,

    /// Optional reduced output dimensionality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,

    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_embed_api_key_env(),
            base_url: default_embed_base_url(),
            model: default_embed_model(),
            dimensions: None,
            batch_size: default_embed_batch_size(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

fn default_embed_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_embed_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_embed_model() -> String {
    "text-embedding-3-small".into()
}
fn default_embed_batch_size() -> usize {
    64
}
fn default_embed_timeout_secs() -> u64 {
    30
}

/// `[sources]` section — URL templates for tier 2/3 retrieval.
/// `{slug}` is replaced by the company slug, `{query}` by the search query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Professional-network company pages (tier 2).
    #[serde(default = "default_professional_templates")]
    pub professional_page_templates: Vec<String>,

    /// News-search pages (tier 3).
    #[serde(default = "default_news_templates")]
    pub news_search_templates: Vec<String>,

    /// Article links followed per news-search page (tier 3).
    #[serde(default = "default_max_articles")]
    pub max_articles_per_search: usize,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            professional_page_templates: default_professional_templates(),
            news_search_templates: default_news_templates(),
            max_articles_per_search: default_max_articles(),
        }
    }
}

fn default_professional_templates() -> Vec<String> {
    vec![
        "https://www.linkedin.com/company/{slug}".into(),
        "https://www.crunchbase.com/organization/{slug}".into(),
    ]
}
fn default_news_templates() -> Vec<String> {
    vec!["https://news.google.com/search?q={query}".into()]
}
fn default_max_articles() -> usize {
    5
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file. `~` expands to the home directory.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.firmfacts/firmfacts.db".into()
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.firmfacts/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| FirmfactsError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.firmfacts/firmfacts.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FirmfactsError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        FirmfactsError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FirmfactsError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| FirmfactsError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FirmfactsError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~` in a configured path to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Check that an API key env var is set and non-empty.
pub fn api_key_from_env(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("confidence_threshold"));
        assert!(toml_str.contains("max_pages"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.orchestrator.max_retries_per_tier, 2);
        assert_eq!(parsed.retry.base_delay_ms, 1_000);
        assert_eq!(parsed.chunking.max_chunk_size, 1_000);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[orchestrator]
confidence_threshold = 0.85
enable_tier_3 = false

[crawler]
max_pages = 10
"#;
        let parsed: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(parsed.orchestrator.confidence_threshold, 0.85);
        assert!(!parsed.orchestrator.enable_tier_3);
        assert!(parsed.orchestrator.enable_tier_1);
        assert_eq!(parsed.crawler.max_pages, 10);
        assert_eq!(parsed.crawler.delay_ms, 500);
    }

    #[test]
    fn api_key_env_lookup() {
        assert!(api_key_from_env("FIRMFACTS_TEST_NONEXISTENT_KEY_12345").is_none());
    }

    #[test]
    fn expand_home_passthrough() {
        let p = expand_home("/var/lib/firmfacts.db");
        assert_eq!(p, PathBuf::from("/var/lib/firmfacts.db"));
    }
}
