//! Per-job enrichment context.
//!
//! Exactly one context exists per job execution. Tiers receive it as a
//! read-only view; each tier returns its own result and the orchestrator
//! merges facts back explicitly. Nothing here is shared across jobs.

use firmfacts_shared::{Fact, Job};

/// Read-only view of one job's accumulated enrichment state.
#[derive(Debug, Clone)]
pub struct EnrichmentContext {
    /// Snapshot of the job being enriched.
    pub job: Job,
    /// Facts collected from tiers executed so far.
    pub facts: Vec<Fact>,
    /// Mean confidence over `facts`; 0.0 before any fact exists.
    pub average_confidence: f64,
    /// Early-stop settings visible to `can_handle`.
    pub confidence_threshold: f64,
    pub stop_on_confidence_threshold: bool,
}

impl EnrichmentContext {
    pub fn new(job: Job, confidence_threshold: f64, stop_on_confidence_threshold: bool) -> Self {
        Self {
            job,
            facts: Vec::new(),
            average_confidence: 0.0,
            confidence_threshold,
            stop_on_confidence_threshold,
        }
    }

    /// Merge one tier's facts and recompute the running average confidence.
    pub fn merge_facts(&mut self, facts: Vec<Fact>) {
        self.facts.extend(facts);
        self.average_confidence =
            firmfacts_extractor::average(self.facts.iter().map(|f| f.confidence_score));
    }

    /// True once the configured early-stop condition is satisfied.
    pub fn threshold_reached(&self) -> bool {
        self.stop_on_confidence_threshold
            && !self.facts.is_empty()
            && self.average_confidence >= self.confidence_threshold
    }

    /// Query string for company lookups: the display name when known,
    /// otherwise the domain without its TLD.
    pub fn company_query(&self) -> String {
        match &self.job.company_name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => domain_stem(&self.job.domain),
        }
    }

    /// URL-path slug for source templates: `Acme Industrial` → `acme-industrial`.
    pub fn company_slug(&self) -> String {
        let base = self.company_query().to_lowercase();
        let mut slug = String::with_capacity(base.len());
        let mut last_dash = true;
        for c in base.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c);
                last_dash = false;
            } else if !last_dash {
                slug.push('-');
                last_dash = true;
            }
        }
        slug.trim_end_matches('-').to_string()
    }
}

/// `acme.com` → `acme`; `investors.acme.co.uk` → `investors`.
fn domain_stem(domain: &str) -> String {
    domain
        .trim_start_matches("www.")
        .split('.')
        .next()
        .unwrap_or(domain)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use firmfacts_shared::{FactData, FactType, JobId, JobStatus, StepStatus};

    fn job(domain: &str, company_name: Option<&str>) -> Job {
        Job {
            id: JobId::new(),
            domain: domain.into(),
            company_name: company_name.map(String::from),
            status: JobStatus::Pending,
            crawling_status: StepStatus::Pending,
            chunking_status: StepStatus::Pending,
            embedding_status: StepStatus::Pending,
            extraction_status: StepStatus::Pending,
            pages_crawled: 0,
            chunks_created: 0,
            embeddings_generated: 0,
            facts_extracted: 0,
            retry_count: 0,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            last_heartbeat_at: None,
        }
    }

    fn fact(job_id: &JobId, confidence: f64) -> Fact {
        Fact {
            id: uuid::Uuid::now_v7().to_string(),
            job_id: job_id.clone(),
            fact_type: FactType::Geography,
            fact_data: FactData::Geography {
                region: "Japan".into(),
            },
            confidence_score: confidence,
            source_url: "https://acme.com".into(),
            source_text: "operations in Japan".into(),
            tier_used: 1,
            validated: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn merge_recomputes_average() {
        let job = job("acme.com", None);
        let id = job.id.clone();
        let mut ctx = EnrichmentContext::new(job, 0.7, true);
        assert_eq!(ctx.average_confidence, 0.0);

        ctx.merge_facts(vec![fact(&id, 0.9), fact(&id, 0.7)]);
        assert!((ctx.average_confidence - 0.8).abs() < 1e-9);

        ctx.merge_facts(vec![fact(&id, 0.5)]);
        assert!((ctx.average_confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn threshold_requires_facts_and_flag() {
        let job = job("acme.com", None);
        let id = job.id.clone();

        let mut ctx = EnrichmentContext::new(job.clone(), 0.7, true);
        assert!(!ctx.threshold_reached());
        ctx.merge_facts(vec![fact(&id, 0.85)]);
        assert!(ctx.threshold_reached());

        let mut no_stop = EnrichmentContext::new(job, 0.7, false);
        no_stop.merge_facts(vec![fact(&id, 0.85)]);
        assert!(!no_stop.threshold_reached());
    }

    #[test]
    fn company_query_falls_back_to_domain_stem() {
        let ctx = EnrichmentContext::new(job("acme.com", Some("Acme Industrial Corp.")), 0.7, true);
        assert_eq!(ctx.company_query(), "Acme Industrial Corp.");
        assert_eq!(ctx.company_slug(), "acme-industrial-corp");

        let bare = EnrichmentContext::new(job("www.globex.com", None), 0.7, true);
        assert_eq!(bare.company_query(), "globex");
        assert_eq!(bare.company_slug(), "globex");
    }
}
