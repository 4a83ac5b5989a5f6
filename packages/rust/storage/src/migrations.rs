//! SQL migration definitions for the firmfacts database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as a batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: jobs, facts, crawl_history",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Enrichment jobs
CREATE TABLE IF NOT EXISTS jobs (
    id                    TEXT PRIMARY KEY,
    domain                TEXT NOT NULL,
    company_name          TEXT,
    status                TEXT NOT NULL DEFAULT 'pending',
    crawling_status       TEXT NOT NULL DEFAULT 'pending',
    chunking_status       TEXT NOT NULL DEFAULT 'pending',
    embedding_status      TEXT NOT NULL DEFAULT 'pending',
    extraction_status     TEXT NOT NULL DEFAULT 'pending',
    pages_crawled         INTEGER NOT NULL DEFAULT 0,
    chunks_created        INTEGER NOT NULL DEFAULT 0,
    embeddings_generated  INTEGER NOT NULL DEFAULT 0,
    facts_extracted       INTEGER NOT NULL DEFAULT 0,
    retry_count           INTEGER NOT NULL DEFAULT 0,
    error_message         TEXT,
    created_at            TEXT NOT NULL,
    started_at            TEXT,
    completed_at          TEXT,
    last_heartbeat_at     TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_domain ON jobs(domain);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);

-- Extracted facts (append-only; only `validated` may change)
CREATE TABLE IF NOT EXISTS facts (
    id               TEXT PRIMARY KEY,
    job_id           TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    fact_type        TEXT NOT NULL,
    fact_data        TEXT NOT NULL,
    confidence_score REAL NOT NULL,
    source_url       TEXT NOT NULL,
    source_text      TEXT NOT NULL,
    tier_used        INTEGER NOT NULL,
    validated        INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_facts_job_id ON facts(job_id);
CREATE INDEX IF NOT EXISTS idx_facts_type ON facts(fact_type);

-- Per-page crawl attempts, one row per (job, url)
CREATE TABLE IF NOT EXISTS crawl_history (
    id             TEXT PRIMARY KEY,
    job_id         TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    url            TEXT NOT NULL,
    status_code    INTEGER,
    content_length INTEGER,
    word_count     INTEGER,
    priority_score INTEGER NOT NULL DEFAULT 0,
    error_message  TEXT,
    crawled_at     TEXT NOT NULL,
    UNIQUE(job_id, url)
);

CREATE INDEX IF NOT EXISTS idx_crawl_history_job ON crawl_history(job_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
