//! Enrichment orchestration.
//!
//! Sequences tier processors in fixed priority order under a wall-clock
//! budget, wraps each tier in the retry policy, merges facts, applies the
//! stop rules, and drives the job state machine through the repository.
//! Tier failures degrade gracefully; only a failed terminal status write
//! escalates to the caller.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{info, instrument, warn};

use firmfacts_shared::{
    FirmfactsError, Job, JobResult, JobStatus, OrchestratorConfig, Result, RetryConfig,
    RetryPolicy, StopReason, TierResult, TierStatus,
};
use firmfacts_storage::Storage;

use crate::context::EnrichmentContext;
use crate::tiers::TierProcessor;

pub struct Orchestrator {
    storage: Arc<Storage>,
    tiers: Vec<Arc<dyn TierProcessor>>,
    config: OrchestratorConfig,
    tier_retry: RetryPolicy,
}

impl Orchestrator {
    /// Tiers are sorted by number so facts are always attributed in
    /// declared priority order, whatever order the caller registered them.
    pub fn new(
        storage: Arc<Storage>,
        mut tiers: Vec<Arc<dyn TierProcessor>>,
        config: OrchestratorConfig,
        retry_config: &RetryConfig,
    ) -> Self {
        tiers.sort_by_key(|t| t.tier());
        let tier_retry =
            RetryPolicy::new(retry_config).with_max_retries(config.max_retries_per_tier);
        Self {
            storage,
            tiers,
            config,
            tier_retry,
        }
    }

    fn tier_enabled(&self, tier: u8) -> bool {
        match tier {
            1 => self.config.enable_tier_1,
            2 => self.config.enable_tier_2,
            3 => self.config.enable_tier_3,
            _ => false,
        }
    }

    /// Run one job to a terminal status and return its result.
    #[instrument(skip_all, fields(job_id = %job.id, domain = %job.domain))]
    pub async fn execute(&self, job: &Job) -> Result<JobResult> {
        if job.status == JobStatus::Running {
            return Err(FirmfactsError::validation("job is already running"));
        }
        if job.status.is_terminal() {
            return Err(FirmfactsError::validation(format!(
                "job already reached terminal status {}",
                job.status.as_str()
            )));
        }

        self.storage
            .update_job_status(&job.id, JobStatus::Running)
            .await?;

        let started = Instant::now();
        let deadline_secs = self.config.max_job_runtime_minutes * 60;
        let deadline_exceeded = |now: Instant| now.duration_since(started).as_secs() >= deadline_secs;

        let mut ctx = EnrichmentContext::new(
            job.clone(),
            self.config.confidence_threshold,
            self.config.stop_on_confidence_threshold,
        );
        let mut results: Vec<TierResult> = Vec::new();
        let mut tiers_completed: Vec<u8> = Vec::new();
        let mut stop_reason: Option<StopReason> = None;
        let mut attempted_count = 0usize;
        let enabled_count = self
            .tiers
            .iter()
            .filter(|t| self.tier_enabled(t.tier()))
            .count();

        info!(
            tiers = enabled_count,
            deadline_secs, "starting enrichment"
        );

        for tier in &self.tiers {
            if !self.tier_enabled(tier.tier()) {
                continue;
            }

            // Deadline is evaluated at tier boundaries (coarse-grained);
            // in-flight requests are bounded by their own timeouts.
            if deadline_exceeded(Instant::now()) {
                stop_reason = Some(StopReason::Timeout);
                warn!(tier = tier.tier(), "deadline exceeded before tier");
                break;
            }

            if !tier.can_handle(&ctx).await {
                info!(tier = tier.tier(), name = tier.name(), "tier skipped");
                results.push(TierResult::skipped(tier.tier()));
                continue;
            }

            attempted_count += 1;
            let label = format!("tier-{}", tier.tier());
            let outcome = self
                .tier_retry
                .run(&label, || tier.execute(&ctx))
                .await;

            match outcome {
                Ok(result) => {
                    info!(
                        tier = result.tier,
                        facts = result.facts.len(),
                        elapsed_ms = result.processing_time_ms as u64,
                        "tier completed"
                    );
                    if result.status == TierStatus::Completed {
                        tiers_completed.push(result.tier);
                    }
                    ctx.merge_facts(result.facts.clone());
                    results.push(result);
                }
                Err(e) => {
                    // Exhausted retries degrade to a recorded tier failure;
                    // the next tier still runs.
                    warn!(tier = tier.tier(), error = %e, "tier exhausted retries");
                    let _ = self
                        .storage
                        .increment_retry_count(&job.id, self.config.max_retries_per_tier)
                        .await;
                    results.push(TierResult {
                        tier: tier.tier(),
                        facts: Vec::new(),
                        processing_time_ms: 0,
                        status: TierStatus::Failed,
                        error: Some(e.to_string()),
                    });
                }
            }

            // Stop conditions, in order: deadline, confidence threshold.
            if deadline_exceeded(Instant::now()) {
                stop_reason = Some(StopReason::Timeout);
                break;
            }
            if ctx.threshold_reached() {
                stop_reason = Some(StopReason::ConfidenceThresholdMet);
                info!(
                    average_confidence = ctx.average_confidence,
                    "confidence threshold met"
                );
                break;
            }
        }

        let classified = classify(
            &results,
            &ctx,
            stop_reason,
            enabled_count,
            attempted_count,
        );
        let result = JobResult {
            final_status: classified.status,
            total_facts_extracted: ctx.facts.len(),
            average_confidence: ctx.average_confidence,
            tiers_completed,
            total_runtime_seconds: started.elapsed().as_secs(),
            stop_reason: classified.stop_reason,
        };

        // Error message lands before the terminal write so partial info
        // survives even if the final update fails.
        if let Some(message) = &classified.error_message {
            if let Err(e) = self.storage.log_job_error(&job.id, message).await {
                warn!(error = %e, "failed to record job error message");
            }
        }

        // The terminal status write is the one critical persistence call.
        self.storage
            .update_job_status(&job.id, result.final_status)
            .await?;

        info!(
            final_status = result.final_status.as_str(),
            facts = result.total_facts_extracted,
            average_confidence = result.average_confidence,
            runtime_secs = result.total_runtime_seconds,
            stop_reason = result.stop_reason.map(|r| r.as_str()).unwrap_or("none"),
            "enrichment finished"
        );

        Ok(result)
    }
}

struct Classified {
    status: JobStatus,
    stop_reason: Option<StopReason>,
    error_message: Option<String>,
}

/// Terminal classification:
/// `completed` when at least one tier fully succeeded and either the
/// confidence threshold was satisfied or every enabled tier ran;
/// `partial_success` when facts exist but not every enabled tier completed;
/// `failed` when no facts exist and every attempted tier errored.
fn classify(
    results: &[TierResult],
    ctx: &EnrichmentContext,
    stop_reason: Option<StopReason>,
    enabled_count: usize,
    attempted_count: usize,
) -> Classified {
    let any_completed = results.iter().any(|r| r.status == TierStatus::Completed);
    let any_failed = results.iter().any(|r| r.status == TierStatus::Failed);
    let reached_count = results.len();

    let tier_errors: Vec<String> = results
        .iter()
        .filter(|r| r.status == TierStatus::Failed)
        .filter_map(|r| r.error.clone())
        .collect();

    if attempted_count == 0 {
        let message = if stop_reason == Some(StopReason::Timeout) {
            "job timed out before any tier ran"
        } else {
            "no enabled tier could handle this job"
        };
        return Classified {
            status: JobStatus::Failed,
            stop_reason: Some(stop_reason.unwrap_or(StopReason::FatalError)),
            error_message: Some(message.into()),
        };
    }

    if ctx.facts.is_empty() && !any_completed {
        // Every attempted tier errored and nothing was extracted.
        return Classified {
            status: JobStatus::Failed,
            stop_reason: Some(stop_reason.unwrap_or(StopReason::FatalError)),
            error_message: Some(if tier_errors.is_empty() {
                "no facts extracted".into()
            } else {
                tier_errors.join(" | ")
            }),
        };
    }

    let stop_reason = stop_reason.unwrap_or(StopReason::AllTiersExhausted);

    if stop_reason == StopReason::ConfidenceThresholdMet {
        return Classified {
            status: JobStatus::Completed,
            stop_reason: Some(stop_reason),
            error_message: None,
        };
    }

    // Enabled tiers never reached (timeout) count as not completed.
    let unreached = enabled_count.saturating_sub(reached_count);
    if any_failed || unreached > 0 {
        let mut message = tier_errors.join(" | ");
        if unreached > 0 {
            if !message.is_empty() {
                message.push_str(" | ");
            }
            message.push_str("job stopped before all tiers ran");
        }
        return Classified {
            status: if ctx.facts.is_empty() {
                JobStatus::Failed
            } else {
                JobStatus::PartialSuccess
            },
            stop_reason: Some(stop_reason),
            error_message: Some(message),
        };
    }

    Classified {
        status: JobStatus::Completed,
        stop_reason: Some(stop_reason),
        error_message: None,
    }
}
