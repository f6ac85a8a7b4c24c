//! # Dispatch Queue Repository
//!
//! Durable queue of event jobs between webhook intake and the dispatcher
//! workers. Enqueue dedupes on the event-message id; claiming flips a
//! job to `running` behind an optimistic status guard so a job is never
//! handed to two workers.

use crate::error::{RepositoryError, is_unique_violation};
use crate::models::dispatch_job::{
    ActiveModel as JobActiveModel, Column as JobColumn, Entity as DispatchJob, Model as JobModel,
    status,
};
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Repository for dispatch-queue operations.
pub struct DispatchRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> DispatchRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Enqueue a job for an event. Returns `None` when a job for this
    /// event-message id already exists.
    pub async fn enqueue(&self, event_message_id: &str) -> Result<Option<JobModel>, RepositoryError> {
        let now = Utc::now();
        let job = JobActiveModel {
            id: Set(Uuid::new_v4()),
            event_message_id: Set(event_message_id.to_string()),
            status: Set(status::QUEUED.to_string()),
            attempts: Set(0),
            scheduled_at: Set(now.into()),
            retry_after: Set(None),
            started_at: Set(None),
            finished_at: Set(None),
            error: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        match job.insert(self.db).await {
            Ok(created) => Ok(Some(created)),
            Err(err) if is_unique_violation(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Claim up to `limit` due jobs, marking each `running` and counting
    /// the attempt. A job lost to a concurrent claimer is skipped.
    pub async fn claim_due(&self, limit: u64) -> Result<Vec<JobModel>, RepositoryError> {
        let now: DateTime<FixedOffset> = Utc::now().into();

        let candidates = DispatchJob::find()
            .filter(JobColumn::Status.eq(status::QUEUED))
            .filter(
                Condition::any()
                    .add(JobColumn::RetryAfter.is_null())
                    .add(JobColumn::RetryAfter.lte(now)),
            )
            .order_by_asc(JobColumn::ScheduledAt)
            .limit(limit)
            .all(self.db)
            .await?;

        let mut claimed = Vec::with_capacity(candidates.len());
        for job in candidates {
            let result = DispatchJob::update_many()
                .col_expr(JobColumn::Status, Expr::value(status::RUNNING))
                .col_expr(JobColumn::Attempts, Expr::col(JobColumn::Attempts).add(1))
                .col_expr(JobColumn::StartedAt, Expr::value(now))
                .col_expr(JobColumn::UpdatedAt, Expr::value(now))
                .filter(JobColumn::Id.eq(job.id))
                .filter(JobColumn::Status.eq(status::QUEUED))
                .exec(self.db)
                .await?;

            if result.rows_affected == 1 {
                if let Some(fresh) = DispatchJob::find_by_id(job.id).one(self.db).await? {
                    claimed.push(fresh);
                }
            }
        }
        Ok(claimed)
    }

    /// Mark a job finished successfully.
    pub async fn mark_succeeded(&self, job_id: Uuid) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let job = self.require(job_id).await?;
        let mut active = job.into_active_model();
        active.status = Set(status::SUCCEEDED.to_string());
        active.finished_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());
        active.update(self.db).await?;
        Ok(())
    }

    /// Return a failed job to the queue with a retry barrier.
    pub async fn schedule_retry(
        &self,
        job_id: Uuid,
        error: JsonValue,
        retry_after: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let job = self.require(job_id).await?;
        let mut active = job.into_active_model();
        active.status = Set(status::QUEUED.to_string());
        active.retry_after = Set(Some(retry_after.into()));
        active.error = Set(Some(error));
        active.updated_at = Set(now.into());
        active.update(self.db).await?;
        Ok(())
    }

    /// Mark a job failed for good. The row is retained for inspection and
    /// operator replay rather than deleted.
    pub async fn mark_exhausted(
        &self,
        job_id: Uuid,
        error: JsonValue,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let job = self.require(job_id).await?;
        let mut active = job.into_active_model();
        active.status = Set(status::FAILED.to_string());
        active.error = Set(Some(error));
        active.finished_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());
        active.update(self.db).await?;
        Ok(())
    }

    pub async fn find_by_event_message_id(
        &self,
        event_message_id: &str,
    ) -> Result<Option<JobModel>, RepositoryError> {
        let job = DispatchJob::find()
            .filter(JobColumn::EventMessageId.eq(event_message_id))
            .one(self.db)
            .await?;
        Ok(job)
    }

    async fn require(&self, job_id: Uuid) -> Result<JobModel, RepositoryError> {
        DispatchJob::find_by_id(job_id)
            .one(self.db)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("no dispatch job {job_id}")))
    }
}
