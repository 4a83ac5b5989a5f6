//! Supervised fire-and-forget job execution.
//!
//! `dispatch` spawns a worker for the orchestrator run and returns
//! immediately; a supervisor task awaits the worker so that an error or a
//! panic still produces a terminal status write. While a job runs, a
//! heartbeat task refreshes its liveness timestamp so a stalled job is
//! externally detectable. A cleanup timer sweeps finished job handles,
//! releasing per-job transient state regardless of outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use firmfacts_shared::{Job, JobId, JobStatus, Result};
use firmfacts_storage::Storage;

use crate::orchestrator::Orchestrator;

type ActiveJobs = Arc<Mutex<HashMap<String, JoinHandle<()>>>>;

pub struct JobRunner {
    storage: Arc<Storage>,
    orchestrator: Arc<Orchestrator>,
    heartbeat_interval: Duration,
    active: ActiveJobs,
}

impl JobRunner {
    /// Create a runner and start its cleanup sweep.
    pub fn new(
        storage: Arc<Storage>,
        orchestrator: Arc<Orchestrator>,
        heartbeat_interval_ms: u64,
        cleanup_interval_ms: u64,
    ) -> Self {
        let active: ActiveJobs = Arc::new(Mutex::new(HashMap::new()));

        let sweep = active.clone();
        let cleanup_interval = Duration::from_millis(cleanup_interval_ms.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let mut jobs = sweep.lock().await;
                let before = jobs.len();
                jobs.retain(|_, handle| !handle.is_finished());
                if jobs.len() < before {
                    info!(released = before - jobs.len(), "cleaned up finished jobs");
                }
            }
        });

        Self {
            storage,
            orchestrator,
            heartbeat_interval: Duration::from_millis(heartbeat_interval_ms.max(1)),
            active,
        }
    }

    /// Number of jobs whose supervisors are still tracked.
    pub async fn active_jobs(&self) -> usize {
        self.active.lock().await.len()
    }

    /// Start a job in the background and return immediately. The spawned
    /// supervisor guarantees the job reaches a terminal status even if the
    /// worker errors or panics.
    pub async fn dispatch(&self, job: Job) -> Result<()> {
        let storage = self.storage.clone();
        let orchestrator = self.orchestrator.clone();
        let heartbeat_interval = self.heartbeat_interval;
        let job_id = job.id.clone();

        let supervisor = tokio::spawn(async move {
            let heartbeat = spawn_heartbeat(storage.clone(), job.id.clone(), heartbeat_interval);

            let worker_job = job.clone();
            let worker =
                tokio::spawn(async move { orchestrator.execute(&worker_job).await });

            match worker.await {
                Ok(Ok(result)) => {
                    info!(
                        job_id = %job.id,
                        final_status = result.final_status.as_str(),
                        facts = result.total_facts_extracted,
                        "job finished"
                    );
                }
                Ok(Err(e)) => {
                    error!(job_id = %job.id, error = %e, "job execution failed");
                    finalize_as_failed(&storage, &job.id, &e.to_string()).await;
                }
                Err(join_err) => {
                    // A panicking worker must still leave a terminal status.
                    error!(job_id = %job.id, error = %join_err, "job worker panicked");
                    finalize_as_failed(&storage, &job.id, "internal error: worker panicked")
                        .await;
                }
            }

            heartbeat.abort();
        });

        self.active
            .lock()
            .await
            .insert(job_id.to_string(), supervisor);
        Ok(())
    }
}

/// Refresh the job's liveness timestamp until aborted.
fn spawn_heartbeat(storage: Arc<Storage>, job_id: JobId, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = storage.touch_heartbeat(&job_id).await {
                warn!(%job_id, error = %e, "heartbeat write failed");
            }
        }
    })
}

/// Write the terminal failure state unless the job already terminated.
async fn finalize_as_failed(storage: &Storage, job_id: &JobId, message: &str) {
    match storage.get_job(job_id).await {
        Ok(Some(job)) if job.status.is_terminal() => return,
        Ok(_) => {}
        Err(e) => {
            error!(%job_id, error = %e, "could not read job during finalization");
            return;
        }
    }

    if let Err(e) = storage.log_job_error(job_id, message).await {
        error!(%job_id, error = %e, "could not record failure message");
    }
    if let Err(e) = storage.update_job_status(job_id, JobStatus::Failed).await {
        error!(%job_id, error = %e, "could not write terminal status");
    }
}
