//! libSQL storage layer for firmfacts.
//!
//! The [`Storage`] struct wraps a libSQL database holding the job
//! repository, append-only fact records, and per-page crawl history.
//! It is constructed once at process start and passed by handle
//! (`Arc<Storage>`) into the orchestrator and tier processors — there is
//! no global instance.

mod migrations;

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use uuid::Uuid;

use firmfacts_shared::{
    CrawlAttempt, Fact, FactData, FactType, FirmfactsError, Job, JobId, JobStatus, ProgressDelta,
    Result, StepName, StepStatus,
};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FirmfactsError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| FirmfactsError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| FirmfactsError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    FirmfactsError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Job repository
    // -----------------------------------------------------------------------

    /// Create a new pending job for a domain. Returns the stored job.
    pub async fn create_job(&self, domain: &str, company_name: Option<&str>) -> Result<Job> {
        if domain.trim().is_empty() {
            return Err(FirmfactsError::validation("job domain must not be empty"));
        }

        let id = JobId::new();
        let now = Utc::now();
        self.conn
            .execute(
                "INSERT INTO jobs (id, domain, company_name, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    id.to_string(),
                    domain,
                    company_name,
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| FirmfactsError::Storage(e.to_string()))?;

        self.get_job(&id)
            .await?
            .ok_or_else(|| FirmfactsError::Storage("job vanished after insert".into()))
    }

    /// Get a job by ID.
    pub async fn get_job(&self, id: &JobId) -> Result<Option<Job>> {
        let mut rows = self
            .conn
            .query(
                &format!("{JOB_SELECT} WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| FirmfactsError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_job(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(FirmfactsError::Storage(e.to_string())),
        }
    }

    /// List jobs for a domain, newest first.
    pub async fn find_jobs_by_domain(&self, domain: &str) -> Result<Vec<Job>> {
        let mut rows = self
            .conn
            .query(
                &format!("{JOB_SELECT} WHERE domain = ?1 ORDER BY created_at DESC"),
                params![domain],
            )
            .await
            .map_err(|e| FirmfactsError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_job(&row)?);
        }
        Ok(results)
    }

    /// List jobs in a given status, newest first.
    pub async fn find_jobs_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        let mut rows = self
            .conn
            .query(
                &format!("{JOB_SELECT} WHERE status = ?1 ORDER BY created_at DESC"),
                params![status.as_str()],
            )
            .await
            .map_err(|e| FirmfactsError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_job(&row)?);
        }
        Ok(results)
    }

    /// Update a job's status. Entering `running` stamps `started_at`;
    /// entering a terminal status stamps `completed_at`.
    pub async fn update_job_status(&self, id: &JobId, status: JobStatus) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let sql = if status == JobStatus::Running {
            "UPDATE jobs SET status = ?1, started_at = ?2 WHERE id = ?3"
        } else if status.is_terminal() {
            "UPDATE jobs SET status = ?1, completed_at = ?2 WHERE id = ?3"
        } else {
            "UPDATE jobs SET status = ?1, last_heartbeat_at = ?2 WHERE id = ?3"
        };

        self.conn
            .execute(sql, params![status.as_str(), now.as_str(), id.to_string()])
            .await
            .map_err(|e| FirmfactsError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Update one pipeline step's status.
    pub async fn update_step_status(
        &self,
        id: &JobId,
        step: StepName,
        status: StepStatus,
    ) -> Result<()> {
        // Column picked from a fixed enum, not user input.
        let sql = format!(
            "UPDATE jobs SET {}_status = ?1 WHERE id = ?2",
            step.as_str()
        );
        self.conn
            .execute(&sql, params![status.as_str(), id.to_string()])
            .await
            .map_err(|e| FirmfactsError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Add partial progress-counter deltas. `None` fields are untouched.
    pub async fn update_progress(&self, id: &JobId, delta: ProgressDelta) -> Result<()> {
        self.conn
            .execute(
                "UPDATE jobs SET
                   pages_crawled = pages_crawled + ?1,
                   chunks_created = chunks_created + ?2,
                   embeddings_generated = embeddings_generated + ?3,
                   facts_extracted = facts_extracted + ?4
                 WHERE id = ?5",
                params![
                    delta.pages_crawled.unwrap_or(0) as i64,
                    delta.chunks_created.unwrap_or(0) as i64,
                    delta.embeddings_generated.unwrap_or(0) as i64,
                    delta.facts_extracted.unwrap_or(0) as i64,
                    id.to_string()
                ],
            )
            .await
            .map_err(|e| FirmfactsError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Record a job-level error message (kept for terminal reporting).
    pub async fn log_job_error(&self, id: &JobId, message: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE jobs SET error_message = ?1 WHERE id = ?2",
                params![message, id.to_string()],
            )
            .await
            .map_err(|e| FirmfactsError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Increment the job's tier retry counter.
    pub async fn increment_retry_count(&self, id: &JobId, by: u32) -> Result<()> {
        self.conn
            .execute(
                "UPDATE jobs SET retry_count = retry_count + ?1 WHERE id = ?2",
                params![by as i64, id.to_string()],
            )
            .await
            .map_err(|e| FirmfactsError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Refresh the job's liveness timestamp.
    pub async fn touch_heartbeat(&self, id: &JobId) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE jobs SET last_heartbeat_at = ?1 WHERE id = ?2",
                params![now.as_str(), id.to_string()],
            )
            .await
            .map_err(|e| FirmfactsError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Fact persistence (append-only)
    // -----------------------------------------------------------------------

    /// Insert a fact record. Facts are never updated except `validated`.
    pub async fn insert_fact(&self, fact: &Fact) -> Result<()> {
        let data_json = serde_json::to_string(&fact.fact_data)
            .map_err(|e| FirmfactsError::Storage(format!("fact_data encode: {e}")))?;

        self.conn
            .execute(
                "INSERT INTO facts
                   (id, job_id, fact_type, fact_data, confidence_score,
                    source_url, source_text, tier_used, validated, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    fact.id.as_str(),
                    fact.job_id.to_string(),
                    fact.fact_type.as_str(),
                    data_json.as_str(),
                    fact.confidence_score,
                    fact.source_url.as_str(),
                    fact.source_text.as_str(),
                    fact.tier_used as i64,
                    fact.validated as i64,
                    fact.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| FirmfactsError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List all facts for a job, in insertion order.
    pub async fn list_facts_by_job(&self, job_id: &JobId) -> Result<Vec<Fact>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, job_id, fact_type, fact_data, confidence_score,
                        source_url, source_text, tier_used, validated, created_at
                 FROM facts WHERE job_id = ?1 ORDER BY created_at, id",
                params![job_id.to_string()],
            )
            .await
            .map_err(|e| FirmfactsError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_fact(&row)?);
        }
        Ok(results)
    }

    /// Flip a fact's `validated` flag (owned by the human review workflow).
    pub async fn set_fact_validated(&self, fact_id: &str, validated: bool) -> Result<()> {
        self.conn
            .execute(
                "UPDATE facts SET validated = ?1 WHERE id = ?2",
                params![validated as i64, fact_id],
            )
            .await
            .map_err(|e| FirmfactsError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Crawl history (upsert by job_id + url)
    // -----------------------------------------------------------------------

    /// Record one crawl attempt. Repeated crawls of the same (job, url)
    /// overwrite the previous row rather than duplicating it.
    pub async fn upsert_crawl_history(&self, job_id: &JobId, attempt: &CrawlAttempt) -> Result<()> {
        let id = Uuid::now_v7().to_string();
        self.conn
            .execute(
                "INSERT INTO crawl_history
                   (id, job_id, url, status_code, content_length, word_count,
                    priority_score, error_message, crawled_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(job_id, url) DO UPDATE SET
                   status_code = excluded.status_code,
                   content_length = excluded.content_length,
                   word_count = excluded.word_count,
                   priority_score = excluded.priority_score,
                   error_message = excluded.error_message,
                   crawled_at = excluded.crawled_at",
                params![
                    id.as_str(),
                    job_id.to_string(),
                    attempt.url.as_str(),
                    attempt.status_code.map(i64::from),
                    attempt.content_length.map(|v| v as i64),
                    attempt.word_count.map(|v| v as i64),
                    attempt.priority_score,
                    attempt.error_message.as_deref(),
                    attempt.crawled_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| FirmfactsError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List crawl attempts for a job, highest priority first.
    pub async fn list_crawl_history(&self, job_id: &JobId) -> Result<Vec<CrawlAttempt>> {
        let mut rows = self
            .conn
            .query(
                "SELECT url, status_code, content_length, word_count,
                        priority_score, error_message, crawled_at
                 FROM crawl_history WHERE job_id = ?1
                 ORDER BY priority_score DESC, crawled_at",
                params![job_id.to_string()],
            )
            .await
            .map_err(|e| FirmfactsError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(CrawlAttempt {
                url: get_text(&row, 0)?,
                status_code: row.get::<i64>(1).ok().map(|v| v as u16),
                content_length: row.get::<i64>(2).ok().map(|v| v as u64),
                word_count: row.get::<i64>(3).ok().map(|v| v as u64),
                priority_score: get_i64(&row, 4)?,
                error_message: row.get::<String>(5).ok(),
                crawled_at: parse_ts(&get_text(&row, 6)?)?,
            });
        }
        Ok(results)
    }
}

/// Shared SELECT column list for job rows.
const JOB_SELECT: &str = "SELECT id, domain, company_name, status,
       crawling_status, chunking_status, embedding_status, extraction_status,
       pages_crawled, chunks_created, embeddings_generated, facts_extracted,
       retry_count, error_message, created_at, started_at, completed_at,
       last_heartbeat_at
FROM jobs";

fn get_text(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx)
        .map_err(|e| FirmfactsError::Storage(e.to_string()))
}

fn get_i64(row: &libsql::Row, idx: i32) -> Result<i64> {
    row.get::<i64>(idx)
        .map_err(|e| FirmfactsError::Storage(e.to_string()))
}

fn get_f64(row: &libsql::Row, idx: i32) -> Result<f64> {
    row.get::<f64>(idx)
        .map_err(|e| FirmfactsError::Storage(e.to_string()))
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FirmfactsError::Storage(format!("invalid timestamp: {e}")))
}

fn parse_opt_ts(row: &libsql::Row, idx: i32) -> Option<DateTime<Utc>> {
    row.get::<String>(idx).ok().and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// Convert a database row to a [`Job`].
fn row_to_job(row: &libsql::Row) -> Result<Job> {
    let parse_step = |idx: i32| -> Result<StepStatus> {
        StepStatus::from_str(&get_text(row, idx)?).map_err(FirmfactsError::Storage)
    };

    Ok(Job {
        id: JobId::from_str(&get_text(row, 0)?)
            .map_err(|e| FirmfactsError::Storage(e.to_string()))?,
        domain: get_text(row, 1)?,
        company_name: row.get::<String>(2).ok(),
        status: JobStatus::from_str(&get_text(row, 3)?).map_err(FirmfactsError::Storage)?,
        crawling_status: parse_step(4)?,
        chunking_status: parse_step(5)?,
        embedding_status: parse_step(6)?,
        extraction_status: parse_step(7)?,
        pages_crawled: get_i64(row, 8)? as u64,
        chunks_created: get_i64(row, 9)? as u64,
        embeddings_generated: get_i64(row, 10)? as u64,
        facts_extracted: get_i64(row, 11)? as u64,
        retry_count: get_i64(row, 12)? as u32,
        error_message: row.get::<String>(13).ok(),
        created_at: parse_ts(&get_text(row, 14)?)?,
        started_at: parse_opt_ts(row, 15),
        completed_at: parse_opt_ts(row, 16),
        last_heartbeat_at: parse_opt_ts(row, 17),
    })
}

/// Convert a database row to a [`Fact`].
fn row_to_fact(row: &libsql::Row) -> Result<Fact> {
    let data_json = get_text(row, 3)?;
    let fact_data: FactData = serde_json::from_str(&data_json)
        .map_err(|e| FirmfactsError::Storage(format!("fact_data decode: {e}")))?;

    Ok(Fact {
        id: get_text(row, 0)?,
        job_id: JobId::from_str(&get_text(row, 1)?)
            .map_err(|e| FirmfactsError::Storage(e.to_string()))?,
        fact_type: FactType::from_str(&get_text(row, 2)?).map_err(FirmfactsError::Storage)?,
        fact_data,
        confidence_score: get_f64(row, 4)?,
        source_url: get_text(row, 5)?,
        source_text: get_text(row, 6)?,
        tier_used: get_i64(row, 7)? as u8,
        validated: get_i64(row, 8)? != 0,
        created_at: parse_ts(&get_text(row, 9)?)?,
    })
}
