//! Resident snapshot aggregation
//!
//! Fans out the per-resident source API calls and assembles a
//! [`ResidentSnapshot`]. The resident detail and basic-information fetches
//! are mandatory; every other sub-resource is captured as a `Result` so the
//! mapper can distinguish "fetched but empty" from "fetch failed" and leave
//! the affected sink fields untouched in the latter case.

use serde_json::Value as JsonValue;
use tracing::warn;

use crate::mapper::extract;
use crate::source::client::{SourceApiError, SourceClient, SourceCredentials};

/// A sub-resource fetch outcome retained in the snapshot.
pub type Fetched<T> = Result<T, FetchError>;

/// A non-fatal sub-resource fetch failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{resource} fetch failed: {message}")]
pub struct FetchError {
    pub resource: &'static str,
    pub message: String,
}

impl FetchError {
    fn from_api(resource: &'static str, err: SourceApiError) -> Self {
        Self {
            resource,
            message: err.to_string(),
        }
    }
}

/// Everything known about one resident at processing time.
#[derive(Debug)]
pub struct ResidentSnapshot {
    /// Full resident detail record.
    pub resident: JsonValue,
    /// Basic-information record.
    pub basic_info: JsonValue,
    /// Community id, from the event or recovered from the resident record.
    pub community_id: Option<String>,
    /// Community record, when a community id was available.
    pub community: Option<Fetched<JsonValue>>,
    pub insurance: Fetched<JsonValue>,
    pub rooms: Fetched<JsonValue>,
    pub diagnoses_summary: Fetched<JsonValue>,
    pub diagnoses: Fetched<JsonValue>,
    pub contacts: Fetched<JsonValue>,
}

/// Assembles resident snapshots from the source API.
#[derive(Clone)]
pub struct SnapshotFetcher {
    client: SourceClient,
}

impl SnapshotFetcher {
    pub fn new(client: SourceClient) -> Self {
        Self { client }
    }

    /// Fetch a full snapshot for one resident.
    ///
    /// Fails only when the resident detail or basic-information fetch
    /// fails; sub-resource failures are recorded in the snapshot.
    pub async fn fetch(
        &self,
        creds: &SourceCredentials,
        resident_id: &str,
        event_community_id: Option<&str>,
    ) -> Result<ResidentSnapshot, SourceApiError> {
        let (resident, basic_info) = tokio::try_join!(
            self.client.resident(creds, resident_id),
            self.client.basic_information(creds, resident_id),
        )?;

        let community_id = event_community_id
            .map(str::to_string)
            .or_else(|| resident_community_id(&resident));
        if event_community_id.is_none() {
            if let Some(recovered) = &community_id {
                warn!(
                    resident_id = %resident_id,
                    community_id = %recovered,
                    "community id missing from event, recovered from resident record"
                );
            }
        }

        let community_call = async {
            match community_id.as_deref() {
                Some(id) => Some(self.client.community(creds, id).await),
                None => None,
            }
        };

        let (insurance, rooms, diagnoses_summary, diagnoses, contacts, community) = tokio::join!(
            self.client.insurance_policies(creds, resident_id),
            self.client.room_assignments(creds, resident_id),
            self.client.diagnoses_summary(creds, resident_id),
            self.client.diagnoses(creds, resident_id),
            self.client.contacts(creds, resident_id),
            community_call,
        );
        let community =
            community.map(|result| result.map_err(|e| FetchError::from_api("community", e)));

        Ok(ResidentSnapshot {
            resident,
            basic_info,
            community_id,
            community,
            insurance: insurance.map_err(|e| FetchError::from_api("insurance", e)),
            rooms: rooms.map_err(|e| FetchError::from_api("rooms", e)),
            diagnoses_summary: diagnoses_summary
                .map_err(|e| FetchError::from_api("diagnoses_summary", e)),
            diagnoses: diagnoses.map_err(|e| FetchError::from_api("diagnoses", e)),
            contacts: contacts.map_err(|e| FetchError::from_api("contacts", e)),
        })
    }

    /// Fetch a single leave record. Used by the leave-event path only.
    pub async fn fetch_leave(
        &self,
        creds: &SourceCredentials,
        resident_id: &str,
        leave_id: &str,
    ) -> Result<JsonValue, SourceApiError> {
        self.client.leave(creds, resident_id, leave_id).await
    }
}

/// Community id as carried on a resident detail record.
pub fn resident_community_id(resident: &JsonValue) -> Option<String> {
    extract::first_string(
        resident,
        &["CommunityId", "communityId", "FacilityId", "facilityId"],
    )
}
