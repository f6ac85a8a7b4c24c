//! Event Dispatcher
//!
//! Background worker loop that claims due dispatch jobs, resolves tenant
//! credentials, runs each event through the orchestrator, and manages
//! retry backoff. The queue's retry policy re-attempts the whole job on
//! any failure; exhausted jobs are retained as `failed` alongside their
//! ledger entries for operator inspection.

use chrono::{Duration as ChronoDuration, Utc};
use metrics::{counter, histogram};
use rand::{Rng, thread_rng};
use sea_orm::DatabaseConnection;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::DispatchConfig;
use crate::crypto::CredentialKey;
use crate::error::ProcessError;
use crate::events::LifecycleEvent;
use crate::models::dispatch_job::Model as JobModel;
use crate::orchestrator::{EventOrchestrator, Outcome};
use crate::repositories::credential::{CredentialResolver, DefaultCredentials};
use crate::repositories::dispatch::DispatchRepository;
use crate::repositories::ledger::LedgerRepository;
use crate::repositories::tenant::TenantRepository;

/// Background dispatcher for queued event jobs.
#[derive(Clone)]
pub struct Dispatcher {
    db: Arc<DatabaseConnection>,
    orchestrator: Arc<EventOrchestrator>,
    config: DispatchConfig,
    credential_key: Option<Arc<CredentialKey>>,
    default_creds: Option<Arc<DefaultCredentials>>,
}

impl Dispatcher {
    pub fn new(
        db: Arc<DatabaseConnection>,
        orchestrator: EventOrchestrator,
        config: DispatchConfig,
        credential_key: Option<CredentialKey>,
        default_creds: Option<DefaultCredentials>,
    ) -> Self {
        Self {
            db,
            orchestrator: Arc::new(orchestrator),
            config,
            credential_key: credential_key.map(Arc::new),
            default_creds: default_creds.map(Arc::new),
        }
    }

    /// Run the dispatcher loop until the shutdown token fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(config = ?self.config, "starting event dispatcher");

        loop {
            let start = std::time::Instant::now();

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("event dispatcher shutting down");
                    return;
                }
                result = self.claim_and_run_jobs() => {
                    match result {
                        Ok(count) if count > 0 => debug!("dispatched {count} event jobs"),
                        Ok(_) => {}
                        Err(err) => error!(error = %err, "dispatcher tick failed"),
                    }
                }
            }

            let tick = Duration::from_millis(self.config.tick_ms);
            let elapsed = start.elapsed();
            if elapsed < tick {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("event dispatcher shutting down");
                        return;
                    }
                    _ = sleep(tick - elapsed) => {}
                }
            }
        }
    }

    /// Claim due jobs and run them with bounded concurrency.
    #[instrument(skip(self), fields(batch_size = self.config.claim_batch))]
    pub async fn claim_and_run_jobs(&self) -> Result<usize, crate::error::RepositoryError> {
        let jobs = DispatchRepository::new(&self.db)
            .claim_due(self.config.claim_batch as u64)
            .await?;
        let count = jobs.len();
        if jobs.is_empty() {
            return Ok(0);
        }

        debug!("claimed {count} event jobs");

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.concurrency));
        let mut handles = Vec::with_capacity(count);
        for job in jobs {
            let dispatcher = self.clone();
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                dispatcher.run_single_job(job).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
        Ok(count)
    }

    /// Run one claimed job through the orchestrator and record the outcome.
    #[instrument(skip(self, job), fields(event_message_id = %job.event_message_id, attempt = job.attempts))]
    pub async fn run_single_job(&self, job: JobModel) {
        let timer = std::time::Instant::now();
        let result = self.process_job(&job).await;
        histogram!("dispatch_job_duration_seconds").record(timer.elapsed().as_secs_f64());

        match result {
            Ok(Outcome::Applied { action }) => {
                counter!("dispatch_jobs_succeeded").increment(1);
                info!(action = action, "event job succeeded");
                self.finish_job(&job).await;
            }
            Ok(Outcome::Skipped { reason }) => {
                counter!("dispatch_jobs_skipped").increment(1);
                info!(reason = %reason, "event job skipped");
                self.finish_job(&job).await;
            }
            Err(err) => {
                self.handle_failure(&job, err).await;
            }
        }
    }

    async fn process_job(&self, job: &JobModel) -> Result<Outcome, ProcessError> {
        let ledger = LedgerRepository::new(&self.db);
        let entry = ledger
            .find_by_event_message_id(&job.event_message_id)
            .await?
            .ok_or_else(|| {
                ProcessError::MalformedEvent(format!(
                    "no ledger entry for job {}",
                    job.event_message_id
                ))
            })?;

        let event: LifecycleEvent = serde_json::from_value(entry.payload.clone())
            .map_err(|e| ProcessError::MalformedEvent(format!("stored payload invalid: {e}")))?;

        let tenant = TenantRepository::new(&self.db)
            .find_by_id(entry.tenant_id)
            .await?
            .ok_or_else(|| {
                ProcessError::MalformedEvent(format!("tenant {} missing", entry.tenant_id))
            })?;

        let resolver = CredentialResolver::new(
            &self.db,
            self.credential_key.as_deref(),
            self.default_creds.as_deref(),
        );
        let creds = resolver.resolve(&tenant).await?;

        self.orchestrator.process(&event, &creds).await
    }

    /// Mark the job succeeded and the ledger entry terminal.
    async fn finish_job(&self, job: &JobModel) {
        if let Err(err) = DispatchRepository::new(&self.db).mark_succeeded(job.id).await {
            error!(error = %err, "failed to mark job succeeded");
        }
        if let Err(err) = LedgerRepository::new(&self.db)
            .mark_processed(&job.event_message_id)
            .await
        {
            error!(error = %err, "failed to mark ledger entry processed");
        }
    }

    async fn handle_failure(&self, job: &JobModel, err: ProcessError) {
        let error_json = json!({
            "message": err.to_string(),
            "attempt": job.attempts,
        });

        if job.attempts >= self.config.max_attempts as i32 {
            counter!("dispatch_jobs_exhausted").increment(1);
            error!(error = %err, attempts = job.attempts, "event job exhausted its retries");
            if let Err(db_err) = DispatchRepository::new(&self.db)
                .mark_exhausted(job.id, error_json)
                .await
            {
                error!(error = %db_err, "failed to mark job exhausted");
            }
            if let Err(db_err) = LedgerRepository::new(&self.db)
                .mark_failed(&job.event_message_id, &err.to_string())
                .await
            {
                error!(error = %db_err, "failed to mark ledger entry failed");
            }
            return;
        }

        let backoff_secs = self.backoff_seconds(job.attempts);
        counter!("dispatch_jobs_retried").increment(1);
        warn!(
            error = %err,
            attempts = job.attempts,
            backoff_secs = backoff_secs,
            "event job failed, scheduling retry"
        );

        let retry_after = Utc::now() + ChronoDuration::seconds(backoff_secs as i64);
        if let Err(db_err) = DispatchRepository::new(&self.db)
            .schedule_retry(job.id, error_json, retry_after)
            .await
        {
            error!(error = %db_err, "failed to schedule job retry");
        }
    }

    /// Exponential backoff with jitter, capped at the configured maximum.
    fn backoff_seconds(&self, attempts_completed: i32) -> f64 {
        let base = self.config.base_seconds as f64;
        let max = self.config.max_seconds as f64;
        let backoff = (base * 2_f64.powi(attempts_completed.max(0))).min(max);
        let band = self.config.jitter_factor * backoff;
        let jitter = if band > 0.0 {
            thread_rng().gen_range(0.0..band)
        } else {
            0.0
        };
        backoff + jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dispatcher(config: DispatchConfig) -> Dispatcher {
        // The loop is exercised in integration tests; these cover the
        // backoff arithmetic only, so the db never gets touched.
        let db = Arc::new(DatabaseConnection::default());
        let orchestrator = EventOrchestrator::new(
            crate::source::aggregator::SnapshotFetcher::new(
                crate::source::client::SourceClient::new("http://localhost").unwrap(),
            ),
            crate::sink::client::SinkClient::new(&crate::config::SinkConfig::default()).unwrap(),
        );
        Dispatcher::new(db, orchestrator, config, None, None)
    }

    #[test]
    fn test_backoff_grows_exponentially_and_caps() {
        let dispatcher = test_dispatcher(DispatchConfig {
            base_seconds: 5,
            max_seconds: 900,
            jitter_factor: 0.0,
            ..Default::default()
        });

        assert_eq!(dispatcher.backoff_seconds(0), 5.0);
        assert_eq!(dispatcher.backoff_seconds(1), 10.0);
        assert_eq!(dispatcher.backoff_seconds(2), 20.0);
        assert_eq!(dispatcher.backoff_seconds(10), 900.0);
    }

    #[test]
    fn test_backoff_jitter_stays_in_band() {
        let dispatcher = test_dispatcher(DispatchConfig {
            base_seconds: 5,
            max_seconds: 900,
            jitter_factor: 0.1,
            ..Default::default()
        });

        for _ in 0..100 {
            let backoff = dispatcher.backoff_seconds(1);
            assert!((10.0..11.0).contains(&backoff));
        }
    }
}
