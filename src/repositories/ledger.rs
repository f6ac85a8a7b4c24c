//! # Event Ledger Repository
//!
//! One ledger row per unique event-message id. The unique index on that
//! column is the exactly-once guarantee: concurrent deliveries of the
//! same event race on the insert and the loser sees the winner's row.
//!
//! Status transitions are idempotent; marking an already-terminal entry
//! again is a no-op so dispatcher retries never corrupt the record.

use crate::error::{RepositoryError, is_unique_violation};
use crate::events::LifecycleEvent;
use crate::models::event_ledger::{
    ActiveModel as LedgerActiveModel, Column as LedgerColumn, Entity as EventLedger,
    Model as LedgerModel, status,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use uuid::Uuid;

/// Error text stored on failed entries is capped at this length.
const MAX_ERROR_LEN: usize = 1000;

/// Repository for event-ledger operations.
pub struct LedgerRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> LedgerRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Record an incoming event, returning the ledger entry and whether
    /// the event was already known.
    ///
    /// The insert relies on the unique index over `event_message_id`; a
    /// duplicate delivery returns the existing entry untouched.
    pub async fn record_incoming_event(
        &self,
        event: &LifecycleEvent,
        tenant_id: Uuid,
    ) -> Result<(LedgerModel, bool), RepositoryError> {
        let entry = LedgerActiveModel {
            id: Set(Uuid::new_v4()),
            event_message_id: Set(event.event_message_id.clone()),
            tenant_id: Set(tenant_id),
            community_id: Set(event.community_id.clone()),
            event_type: Set(event.event_type.clone()),
            payload: Set(serde_json::to_value(event).map_err(|e| {
                RepositoryError::Validation(format!("event not serializable: {e}"))
            })?),
            status: Set(status::RECEIVED.to_string()),
            error: Set(None),
            received_at: Set(Utc::now().into()),
            processed_at: Set(None),
        };

        match entry.insert(self.db).await {
            Ok(created) => Ok((created, false)),
            Err(err) if is_unique_violation(&err) => {
                let existing = self
                    .find_by_event_message_id(&event.event_message_id)
                    .await?
                    .ok_or_else(|| {
                        RepositoryError::NotFound("ledger entry vanished after race".to_string())
                    })?;
                Ok((existing, true))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn find_by_event_message_id(
        &self,
        event_message_id: &str,
    ) -> Result<Option<LedgerModel>, RepositoryError> {
        let entry = EventLedger::find()
            .filter(LedgerColumn::EventMessageId.eq(event_message_id))
            .one(self.db)
            .await?;
        Ok(entry)
    }

    /// Mark an entry queued for dispatch. Only a `received` entry moves;
    /// anything else stays as it is.
    pub async fn mark_queued(&self, event_message_id: &str) -> Result<(), RepositoryError> {
        self.transition(event_message_id, &[status::RECEIVED], status::QUEUED, None)
            .await
    }

    /// Mark an entry successfully processed.
    pub async fn mark_processed(&self, event_message_id: &str) -> Result<(), RepositoryError> {
        self.transition(
            event_message_id,
            &[status::RECEIVED, status::QUEUED],
            status::PROCESSED,
            None,
        )
        .await
    }

    /// Mark an entry failed with a truncated error description.
    pub async fn mark_failed(
        &self,
        event_message_id: &str,
        error: &str,
    ) -> Result<(), RepositoryError> {
        self.transition(
            event_message_id,
            &[status::RECEIVED, status::QUEUED],
            status::FAILED,
            Some(truncate_error(error)),
        )
        .await
    }

    /// Mark an entry ignored (duplicate, unsupported or test event).
    pub async fn mark_ignored(&self, event_message_id: &str) -> Result<(), RepositoryError> {
        self.transition(
            event_message_id,
            &[status::RECEIVED, status::QUEUED],
            status::IGNORED,
            None,
        )
        .await
    }

    async fn transition(
        &self,
        event_message_id: &str,
        from: &[&str],
        to: &str,
        error: Option<String>,
    ) -> Result<(), RepositoryError> {
        let Some(entry) = self.find_by_event_message_id(event_message_id).await? else {
            return Err(RepositoryError::NotFound(format!(
                "no ledger entry for event {event_message_id}"
            )));
        };

        if entry.status == to || !from.contains(&entry.status.as_str()) {
            return Ok(());
        }

        let terminal = matches!(to, status::PROCESSED | status::FAILED | status::IGNORED);
        let mut active = entry.into_active_model();
        active.status = Set(to.to_string());
        active.error = Set(error);
        if terminal {
            active.processed_at = Set(Some(Utc::now().into()));
        }
        active.update(self.db).await?;
        Ok(())
    }
}

fn truncate_error(error: &str) -> String {
    if error.len() <= MAX_ERROR_LEN {
        return error.to_string();
    }
    let mut end = MAX_ERROR_LEN;
    while !error.is_char_boundary(end) {
        end -= 1;
    }
    error[..end].to_string()
}
