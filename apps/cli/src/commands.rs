//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use firmfacts_core::build_runtime;
use firmfacts_shared::{
    AppConfig, JobId, JobStatus, expand_home, init_config, load_config,
};
use firmfacts_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// firmfacts — enrich a company domain into structured facts.
#[derive(Parser)]
#[command(
    name = "firmfacts",
    version,
    about = "Enrich company domains into structured, confidence-scored facts.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Enrich a company domain and wait for the result.
    Enrich {
        /// Company domain, e.g. acme.com.
        domain: String,

        /// Company display name (improves filing and news lookup).
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List enrichment jobs.
    Jobs {
        /// Filter by domain.
        #[arg(long)]
        domain: Option<String>,

        /// Filter by status (pending, running, completed, ...).
        #[arg(long)]
        status: Option<String>,
    },

    /// Show the facts extracted by a job.
    Facts {
        /// Job ID.
        job_id: String,
    },

    /// Show the crawl history recorded for a job.
    History {
        /// Job ID.
        job_id: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a default config file.
    Init,
    /// Print the effective configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "firmfacts=info",
        1 => "firmfacts=debug",
        _ => "firmfacts=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = load_config()?;

    match cli.command {
        Command::Enrich { domain, name } => enrich(&config, &domain, name.as_deref()).await,
        Command::Jobs { domain, status } => {
            list_jobs(&config, domain.as_deref(), status.as_deref()).await
        }
        Command::Facts { job_id } => list_facts(&config, &job_id).await,
        Command::History { job_id } => show_history(&config, &job_id).await,
        Command::Config { action } => match action {
            ConfigAction::Init => {
                let path = init_config()?;
                println!("Wrote default config to {}", path.display());
                Ok(())
            }
            ConfigAction::Show => {
                println!("{}", render_config(&config)?);
                Ok(())
            }
        },
    }
}

fn render_config(config: &AppConfig) -> Result<String> {
    serde_json::to_string_pretty(config).map_err(|e| eyre!("config serialization failed: {e}"))
}

async fn open_storage(config: &AppConfig) -> Result<Arc<Storage>> {
    let path = expand_home(&config.database.path);
    Ok(Arc::new(Storage::open(&path).await?))
}

// ---------------------------------------------------------------------------
// enrich
// ---------------------------------------------------------------------------

async fn enrich(config: &AppConfig, domain: &str, name: Option<&str>) -> Result<()> {
    let storage = open_storage(config).await?;
    let (_orchestrator, runner) = build_runtime(storage.clone(), config)?;

    let job = storage.create_job(domain, name).await?;
    info!(job_id = %job.id, %domain, "created enrichment job");

    let job_id = job.id.clone();
    runner.dispatch(job).await?;

    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .expect("valid progress template"),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    // The dispatch is fire-and-forget; the CLI polls the repository like
    // any other observer would.
    let finished = loop {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let current = storage
            .get_job(&job_id)
            .await?
            .ok_or_else(|| eyre!("job {job_id} disappeared"))?;

        bar.set_message(format!(
            "{} | pages {} | chunks {} | facts {}",
            current.status.as_str(),
            current.pages_crawled,
            current.chunks_created,
            current.facts_extracted,
        ));

        if current.status.is_terminal() {
            break current;
        }
    };
    bar.finish_and_clear();

    println!("Job {}: {}", finished.id, finished.status.as_str());
    println!(
        "  pages crawled: {}, chunks: {}, embeddings: {}, facts: {}",
        finished.pages_crawled,
        finished.chunks_created,
        finished.embeddings_generated,
        finished.facts_extracted
    );
    if let Some(err) = &finished.error_message {
        println!("  errors: {err}");
    }

    let facts = storage.list_facts_by_job(&finished.id).await?;
    for fact in &facts {
        println!(
            "  [tier {} | {:.2}] {}: {}",
            fact.tier_used,
            fact.confidence_score,
            fact.fact_type.as_str(),
            fact.fact_data.value_text()
        );
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// jobs / facts / history
// ---------------------------------------------------------------------------

async fn list_jobs(
    config: &AppConfig,
    domain: Option<&str>,
    status: Option<&str>,
) -> Result<()> {
    let storage = open_storage(config).await?;

    let jobs = if let Some(domain) = domain {
        storage.find_jobs_by_domain(domain).await?
    } else if let Some(status) = status {
        let status: JobStatus = status
            .parse()
            .map_err(|e: String| eyre!(e))?;
        storage.find_jobs_by_status(status).await?
    } else {
        let mut all = Vec::new();
        for status in [
            JobStatus::Running,
            JobStatus::Pending,
            JobStatus::Completed,
            JobStatus::PartialSuccess,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            all.extend(storage.find_jobs_by_status(status).await?);
        }
        all
    };

    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    for job in jobs {
        println!(
            "{}  {:16}  {:15}  facts {:4}  created {}",
            job.id,
            job.status.as_str(),
            job.domain,
            job.facts_extracted,
            job.created_at.format("%Y-%m-%d %H:%M"),
        );
    }
    Ok(())
}

async fn list_facts(config: &AppConfig, job_id: &str) -> Result<()> {
    let storage = open_storage(config).await?;
    let job_id: JobId = job_id.parse().map_err(|e| eyre!("invalid job id: {e}"))?;

    let facts = storage.list_facts_by_job(&job_id).await?;
    if facts.is_empty() {
        println!("No facts recorded for this job.");
        return Ok(());
    }

    for fact in facts {
        println!(
            "[tier {} | {:.2}{}] {}: {}\n    source: {}",
            fact.tier_used,
            fact.confidence_score,
            if fact.validated { " | validated" } else { "" },
            fact.fact_type.as_str(),
            fact.fact_data.value_text(),
            fact.source_url,
        );
    }
    Ok(())
}

async fn show_history(config: &AppConfig, job_id: &str) -> Result<()> {
    let storage = open_storage(config).await?;
    let job_id: JobId = job_id.parse().map_err(|e| eyre!("invalid job id: {e}"))?;

    let history = storage.list_crawl_history(&job_id).await?;
    if history.is_empty() {
        println!("No crawl history for this job.");
        return Ok(());
    }

    for row in history {
        let status = row
            .status_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "ERR".into());
        println!(
            "{:4}  prio {:3}  words {:6}  {}{}",
            status,
            row.priority_score,
            row.word_count.unwrap_or(0),
            row.url,
            row.error_message
                .map(|e| format!("  ({e})"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}
