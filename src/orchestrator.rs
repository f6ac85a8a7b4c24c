//! Event orchestration
//!
//! Drives one event through `resolve resident -> lookup sink record ->
//! update or insert`. Skip branches are outcomes, not errors: an event the
//! pipeline cannot act on is logged and dropped, while source and sink
//! failures propagate to the dispatcher which schedules the retry.

use tracing::{debug, info, warn};

use crate::error::ProcessError;
use crate::events::{EventKind, LifecycleEvent};
use crate::mapper;
use crate::sink::client::SinkClient;
use crate::source::aggregator::SnapshotFetcher;
use crate::source::client::SourceCredentials;

/// Result of processing one event.
#[derive(Debug)]
pub enum Outcome {
    /// A sink write happened.
    Applied { action: &'static str },
    /// Nothing to do; the reason is logged and the ledger entry is still
    /// marked processed.
    Skipped { reason: String },
}

impl Outcome {
    fn skipped<S: Into<String>>(reason: S) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

/// Processes classified events against the source and sink systems.
pub struct EventOrchestrator {
    fetcher: SnapshotFetcher,
    sink: SinkClient,
}

impl EventOrchestrator {
    pub fn new(fetcher: SnapshotFetcher, sink: SinkClient) -> Self {
        Self { fetcher, sink }
    }

    /// Process a single event end to end.
    pub async fn process(
        &self,
        event: &LifecycleEvent,
        creds: &SourceCredentials,
    ) -> Result<Outcome, ProcessError> {
        let Some(kind) = event.kind() else {
            return Ok(Outcome::skipped(format!(
                "unsupported event type '{}'",
                event.event_type
            )));
        };

        let Some(community_id) = event.community_id.as_deref() else {
            warn!(
                event_message_id = %event.event_message_id,
                event_type = %event.event_type,
                "event carries no community id, dropping"
            );
            return Ok(Outcome::skipped("missing community id"));
        };

        let resident_id = event.resident_id().ok_or_else(|| {
            ProcessError::MalformedEvent("notification payload has no resident id".to_string())
        })?;

        let existing = self
            .sink
            .find_record(Some(community_id), &resident_id)
            .await?;

        match kind {
            EventKind::MoveIn => {
                let snapshot = self
                    .fetcher
                    .fetch(creds, &resident_id, Some(community_id))
                    .await?;
                match existing {
                    Some(row) => {
                        let patch = mapper::map_move_in(event, &snapshot, Some(&row));
                        let Some(row_id) = row.row_id.as_deref() else {
                            warn!(resident_id = %resident_id, "matched record has no row id");
                            return Ok(Outcome::skipped("matched record has no row id"));
                        };
                        self.sink.update_record(row_id, &patch).await?;
                        info!(resident_id = %resident_id, "move-in applied to existing record");
                        Ok(Outcome::Applied { action: "update" })
                    }
                    None => {
                        let patch = mapper::map_move_in(event, &snapshot, None);
                        self.sink.insert_record(&patch).await?;
                        info!(resident_id = %resident_id, "move-in record created");
                        Ok(Outcome::Applied { action: "insert" })
                    }
                }
            }

            EventKind::MoveOut => {
                let Some(row) = existing else {
                    warn!(
                        resident_id = %resident_id,
                        "move-out for a resident with no sink record, dropping"
                    );
                    return Ok(Outcome::skipped("no record to vacate"));
                };
                let Some(mapped) = mapper::map_move_out(event, &resident_id, &row) else {
                    warn!(
                        event_message_id = %event.event_message_id,
                        "move-out has no usable date, dropping"
                    );
                    return Ok(Outcome::skipped("no usable move-out date"));
                };
                let (occupancy, vacancy) = mapped;

                if !occupancy.is_empty() {
                    let Some(row_id) = row.row_id.as_deref() else {
                        warn!(resident_id = %resident_id, "matched record has no row id");
                        return Ok(Outcome::skipped("matched record has no row id"));
                    };
                    self.sink.update_record(row_id, &occupancy).await?;
                }
                // The vacancy row is inserted even when the occupancy dates
                // were already set by an earlier delivery.
                self.sink.insert_record(&vacancy).await?;
                info!(resident_id = %resident_id, "move-out applied, vacancy recorded");
                Ok(Outcome::Applied { action: "move-out" })
            }

            EventKind::LeaveStart | EventKind::LeaveEnd => {
                let Some(row) = existing else {
                    debug!(resident_id = %resident_id, "leave event for unknown resident, dropping");
                    return Ok(Outcome::skipped("no record to patch"));
                };

                let leave = match event.leave_id() {
                    Some(leave_id) => {
                        match self.fetcher.fetch_leave(creds, &resident_id, &leave_id).await {
                            Ok(record) => Some(record),
                            Err(err) => {
                                warn!(
                                    leave_id = %leave_id,
                                    error = %err,
                                    "leave record fetch failed, using event timestamp"
                                );
                                None
                            }
                        }
                    }
                    None => None,
                };

                let patch = match kind {
                    EventKind::LeaveStart => mapper::map_leave_start(event, leave.as_ref()),
                    _ => mapper::map_leave_end(event, leave.as_ref()),
                };
                let Some(patch) = patch else {
                    warn!(
                        event_message_id = %event.event_message_id,
                        "leave event has no usable date, dropping"
                    );
                    return Ok(Outcome::skipped("no usable leave date"));
                };

                let Some(row_id) = row.row_id.as_deref() else {
                    warn!(resident_id = %resident_id, "matched record has no row id");
                    return Ok(Outcome::skipped("matched record has no row id"));
                };
                self.sink.update_record(row_id, &patch).await?;
                info!(resident_id = %resident_id, "premises flags updated");
                Ok(Outcome::Applied { action: "leave" })
            }

            EventKind::GenericUpdate => {
                let Some(row) = existing else {
                    debug!(resident_id = %resident_id, "update for unknown resident, dropping");
                    return Ok(Outcome::skipped("no record to update"));
                };
                let snapshot = self
                    .fetcher
                    .fetch(creds, &resident_id, Some(community_id))
                    .await?;
                let patch = mapper::map_generic_update(event, &snapshot, &row);
                let Some(row_id) = row.row_id.as_deref() else {
                    warn!(resident_id = %resident_id, "matched record has no row id");
                    return Ok(Outcome::skipped("matched record has no row id"));
                };
                self.sink.update_record(row_id, &patch).await?;
                info!(resident_id = %resident_id, "profile update applied");
                Ok(Outcome::Applied { action: "update" })
            }
        }
    }
}
