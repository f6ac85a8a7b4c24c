//! Lifecycle event to sink record mapping
//!
//! Pure functions from an event plus a [`ResidentSnapshot`] to the flat
//! column patches the sink client writes. No I/O happens here; every
//! fetch failure the aggregator recorded maps to "leave those columns
//! untouched" rather than writing empties over good data.

pub mod extract;

use serde_json::{Value as JsonValue, json};
use tracing::warn;

use crate::events::LifecycleEvent;
use crate::sink::client::{RecordPatch, SinkRow};
use crate::source::aggregator::ResidentSnapshot;

/// Sink column names.
pub mod fields {
    pub const ROW_ID: &str = "Row_ID";
    pub const RESIDENT_ID: &str = "Resident_ID";
    pub const COMMUNITY_ID: &str = "Community_ID";
    pub const COMMUNITY_NAME: &str = "Community_Name";
    pub const RESIDENT_NAME: &str = "Resident_Name";
    pub const DATE_OF_BIRTH: &str = "Date_Of_Birth";
    pub const ROOM_NUMBER: &str = "Room_Number";
    pub const MOVE_IN_DATE: &str = "Move_In_Date";
    pub const MOVE_OUT_DATE: &str = "Move_Out_Date";
    pub const SERVICE_TYPE: &str = "Service_Type";
    pub const SERVICE_START_DATE: &str = "Service_Start_Date";
    pub const SERVICE_END_DATE: &str = "Service_End_Date";
    pub const ON_PREMISES: &str = "On_Premises";
    pub const OFF_PREMISES: &str = "Off_Premises";
    pub const OFF_PREM_DATE: &str = "Off_Prem_Date";
    pub const INSURANCE_1: &str = "Insurance_1";
    pub const INSURANCE_2: &str = "Insurance_2";
    pub const DIAGNOSIS_1: &str = "Diagnosis_1";
    pub const DIAGNOSIS_2: &str = "Diagnosis_2";
    pub const CONTACT_1_NAME: &str = "Contact_1_Name";
    pub const CONTACT_1_PHONE: &str = "Contact_1_Phone";
    pub const CONTACT_1_ADDRESS: &str = "Contact_1_Address";
    pub const CONTACT_2_NAME: &str = "Contact_2_Name";
    pub const CONTACT_2_PHONE: &str = "Contact_2_Phone";
    pub const CONTACT_2_ADDRESS: &str = "Contact_2_Address";
    pub const HOSPICE: &str = "Hospice";
}

/// Service type written on vacancy records.
pub const VACANT_SERVICE_TYPE: &str = "Vacant";

/// Synthesized resident id for the vacancy record created on move-out.
pub fn vacancy_resident_id(resident_id: &str, event_message_id: &str) -> String {
    format!("{resident_id}-VACANT-{event_message_id}")
}

/// Build the patch for a move-in event.
///
/// When an existing record is supplied the move-in date and the service
/// start date are included only if the record does not already carry a
/// value, so re-deliveries and later updates never rewrite history.
pub fn map_move_in(
    event: &LifecycleEvent,
    snapshot: &ResidentSnapshot,
    existing: Option<&SinkRow>,
) -> RecordPatch {
    profile_patch(event, snapshot, existing, true)
}

/// Build the patch for a generic update event. Same as the move-in
/// mapping except the move-in date column is never touched.
pub fn map_generic_update(
    event: &LifecycleEvent,
    snapshot: &ResidentSnapshot,
    existing: &SinkRow,
) -> RecordPatch {
    profile_patch(event, snapshot, Some(existing), false)
}

/// Build the occupancy patch and the vacancy record for a move-out event.
///
/// Returns `None` when no usable move-out date can be derived from the
/// notification payload or the event timestamp.
pub fn map_move_out(
    event: &LifecycleEvent,
    resident_id: &str,
    existing: &SinkRow,
) -> Option<(RecordPatch, RecordPatch)> {
    let date = extract::first_date(
        &event.notification_data,
        &["MoveOutDate", "moveOutDate", "MoveOutDateTime", "moveOutDateTime"],
    )
    .or_else(|| {
        let fallback = extract::date_only(&event.event_message_date);
        if fallback.is_some() {
            warn!(
                event_message_id = %event.event_message_id,
                "move-out date missing from payload, using event timestamp"
            );
        }
        fallback
    })?;
    let date = extract::format_date(date);

    let mut occupancy = RecordPatch::new();
    if !existing.has_value(fields::MOVE_OUT_DATE) {
        occupancy.insert(fields::MOVE_OUT_DATE.to_string(), json!(date));
    }
    if !existing.has_value(fields::SERVICE_END_DATE) {
        occupancy.insert(fields::SERVICE_END_DATE.to_string(), json!(date));
    }

    let mut vacancy = RecordPatch::new();
    vacancy.insert(
        fields::RESIDENT_ID.to_string(),
        json!(vacancy_resident_id(resident_id, &event.event_message_id)),
    );
    let community_id = existing
        .value_str(fields::COMMUNITY_ID)
        .or_else(|| event.community_id.clone());
    if let Some(community_id) = community_id {
        vacancy.insert(fields::COMMUNITY_ID.to_string(), json!(community_id));
    }
    if let Some(room) = existing.value_str(fields::ROOM_NUMBER) {
        vacancy.insert(fields::ROOM_NUMBER.to_string(), json!(room));
    }
    vacancy.insert(fields::SERVICE_TYPE.to_string(), json!(VACANT_SERVICE_TYPE));
    vacancy.insert(fields::SERVICE_START_DATE.to_string(), json!(date));

    Some((occupancy, vacancy))
}

/// Build the premises patch for a leave-start event.
///
/// The leave record's start timestamp wins; when it is absent or
/// unparsable the event timestamp is used with a warning. Returns `None`
/// when neither yields a calendar date.
pub fn map_leave_start(event: &LifecycleEvent, leave: Option<&JsonValue>) -> Option<RecordPatch> {
    let date = leave_date(
        event,
        leave,
        &["StartDateTime", "startDateTime", "StartDate", "startDate"],
    )?;
    let mut patch = RecordPatch::new();
    patch.insert(fields::OFF_PREMISES.to_string(), json!(true));
    patch.insert(fields::ON_PREMISES.to_string(), json!(false));
    patch.insert(fields::OFF_PREM_DATE.to_string(), json!(date));
    Some(patch)
}

/// Build the premises patch for a leave-end event, symmetric to
/// [`map_leave_start`].
pub fn map_leave_end(event: &LifecycleEvent, leave: Option<&JsonValue>) -> Option<RecordPatch> {
    let date = leave_date(
        event,
        leave,
        &["EndDateTime", "endDateTime", "EndDate", "endDate"],
    )?;
    let mut patch = RecordPatch::new();
    patch.insert(fields::ON_PREMISES.to_string(), json!(true));
    patch.insert(fields::OFF_PREMISES.to_string(), json!(false));
    patch.insert(fields::OFF_PREM_DATE.to_string(), json!(date));
    Some(patch)
}

fn leave_date(
    event: &LifecycleEvent,
    leave: Option<&JsonValue>,
    keys: &[&str],
) -> Option<String> {
    let from_leave = leave.and_then(|record| extract::first_date(record, keys));
    let date = match from_leave {
        Some(date) => date,
        None => {
            let fallback = extract::date_only(&event.event_message_date);
            if fallback.is_some() {
                warn!(
                    event_message_id = %event.event_message_id,
                    "leave record has no usable date, using event timestamp"
                );
            }
            fallback?
        }
    };
    Some(extract::format_date(date))
}

/// Shared profile mapping for move-in and generic updates.
fn profile_patch(
    event: &LifecycleEvent,
    snapshot: &ResidentSnapshot,
    existing: Option<&SinkRow>,
    allow_move_in_date: bool,
) -> RecordPatch {
    let mut patch = RecordPatch::new();
    let resident = &snapshot.resident;
    let basic = &snapshot.basic_info;

    if let Some(resident_id) = event.resident_id() {
        patch.insert(fields::RESIDENT_ID.to_string(), json!(resident_id));
    }
    if let Some(community_id) = &snapshot.community_id {
        patch.insert(fields::COMMUNITY_ID.to_string(), json!(community_id));
    }
    if let Some(Ok(community)) = &snapshot.community {
        if let Some(name) =
            extract::first_string(community, &["Name", "name", "CommunityName", "communityName"])
        {
            patch.insert(fields::COMMUNITY_NAME.to_string(), json!(name));
        }
    }

    if let Some(name) = resident_name(resident, basic) {
        patch.insert(fields::RESIDENT_NAME.to_string(), json!(name));
    }

    let dob = extract::first_date(basic, &["DateOfBirth", "dateOfBirth", "BirthDate", "birthDate"])
        .or_else(|| {
            extract::first_date(resident, &["DateOfBirth", "dateOfBirth", "BirthDate", "birthDate"])
        });
    if let Some(dob) = dob {
        patch.insert(
            fields::DATE_OF_BIRTH.to_string(),
            json!(extract::format_date(dob)),
        );
    }

    let room = snapshot
        .rooms
        .as_ref()
        .ok()
        .and_then(|rooms| primary_room_number(rooms))
        .or_else(|| {
            // Room-assignment endpoint down or empty; the resident detail
            // record carries its own rooms list.
            extract::first_value(resident, &["Rooms", "rooms"]).and_then(primary_room_number)
        });
    if let Some(room) = room {
        patch.insert(fields::ROOM_NUMBER.to_string(), json!(room));
    }

    let move_in = extract::first_date(resident, &["PhysicalMoveInDate", "physicalMoveInDate"])
        .or_else(|| extract::first_date(resident, &["FinancialMoveInDate", "financialMoveInDate"]));
    if let Some(move_in) = move_in {
        let date = extract::format_date(move_in);
        let already_set = existing.is_some_and(|row| row.has_value(fields::MOVE_IN_DATE));
        if allow_move_in_date && !already_set {
            patch.insert(fields::MOVE_IN_DATE.to_string(), json!(date.clone()));
        }
        let start_set = existing.is_some_and(|row| row.has_value(fields::SERVICE_START_DATE));
        if !start_set {
            patch.insert(fields::SERVICE_START_DATE.to_string(), json!(date));
        }
    }

    let service_type = extract::first_string(resident, &["Classification", "classification"])
        .or_else(|| extract::first_string(resident, &["ProductType", "productType"]));
    if let Some(service_type) = service_type {
        patch.insert(fields::SERVICE_TYPE.to_string(), json!(service_type));
    }

    match extract::first_bool(resident, &["OnLeave", "onLeave", "IsOnLeave", "isOnLeave"]) {
        Some(true) => {
            patch.insert(fields::OFF_PREMISES.to_string(), json!(true));
            patch.insert(fields::ON_PREMISES.to_string(), json!(false));
            if let Some(date) =
                extract::first_date(resident, &["LeaveStartDate", "leaveStartDate"])
            {
                patch.insert(
                    fields::OFF_PREM_DATE.to_string(),
                    json!(extract::format_date(date)),
                );
            }
        }
        Some(false) => {
            patch.insert(fields::ON_PREMISES.to_string(), json!(true));
            patch.insert(fields::OFF_PREMISES.to_string(), json!(false));
        }
        None => {}
    }

    if let Ok(insurance) = &snapshot.insurance {
        let (first, second) = insurance_slots(insurance);
        if let Some(name) = first {
            patch.insert(fields::INSURANCE_1.to_string(), json!(name));
        }
        if let Some(name) = second {
            patch.insert(fields::INSURANCE_2.to_string(), json!(name));
        }
    }

    let diagnoses = diagnosis_slots(snapshot, basic);
    if let Some((first, second)) = diagnoses {
        if let Some(text) = first {
            patch.insert(fields::DIAGNOSIS_1.to_string(), json!(text));
        }
        if let Some(text) = second {
            patch.insert(fields::DIAGNOSIS_2.to_string(), json!(text));
        }
    }

    if let Ok(contacts) = &snapshot.contacts {
        apply_contacts(&mut patch, contacts);
    }

    patch
}

fn resident_name(resident: &JsonValue, basic: &JsonValue) -> Option<String> {
    for payload in [basic, resident] {
        let first = extract::first_string(payload, &["FirstName", "firstName"]);
        let last = extract::first_string(payload, &["LastName", "lastName"]);
        let joined = [first, last]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if !joined.is_empty() {
            return Some(joined);
        }
    }
    None
}

/// Room number of the primary assignment, falling back to the first
/// assignment when none is flagged primary.
fn primary_room_number(rooms: &JsonValue) -> Option<String> {
    let items = extract::unwrap_list(rooms)?;
    let primary = items.iter().find(|item| {
        extract::first_bool(item, &["IsPrimary", "isPrimary", "Primary", "primary"])
            .unwrap_or(false)
    });
    let chosen = primary.or_else(|| items.first())?;
    extract::first_string(chosen, &["RoomNumber", "roomNumber", "Room", "room"])
}

fn policy_text(policy: &JsonValue) -> Option<String> {
    extract::first_string(
        policy,
        &["Name", "name", "PlanName", "planName", "Provider", "provider"],
    )
}

fn policy_category(policy: &JsonValue) -> Option<String> {
    extract::first_string(policy, &["Type", "type", "Category", "category"])
}

fn mentions_medicare(policy: &JsonValue) -> bool {
    let name = policy_text(policy).unwrap_or_default().to_lowercase();
    let category = policy_category(policy).unwrap_or_default().to_lowercase();
    name.contains("medicare") || category.contains("medicare")
}

/// Up to two medical insurance policies. A policy qualifies when it has
/// no category at all or when its category or name mentions
/// medicare/medical; when exactly one of the two picked policies is a
/// Medicare policy it takes the first slot.
fn insurance_slots(insurance: &JsonValue) -> (Option<String>, Option<String>) {
    let Some(items) = extract::unwrap_list(insurance) else {
        return (None, None);
    };

    let qualifying: Vec<&JsonValue> = items
        .iter()
        .filter(|policy| match policy_category(policy) {
            None => true,
            Some(category) => {
                let category = category.to_lowercase();
                let name = policy_text(policy).unwrap_or_default().to_lowercase();
                category.contains("medicare")
                    || category.contains("medical")
                    || name.contains("medicare")
                    || name.contains("medical")
            }
        })
        .filter(|policy| policy_text(policy).is_some())
        .take(2)
        .collect();

    match qualifying.as_slice() {
        [] => (None, None),
        [only] => (policy_text(only), None),
        [first, second, ..] => {
            let promote = !mentions_medicare(first) && mentions_medicare(second);
            if promote {
                (policy_text(second), policy_text(first))
            } else {
                (policy_text(first), policy_text(second))
            }
        }
    }
}

/// Up to two diagnoses, preferring the summarized field over scanning the
/// full list. Returns `None` when both sources failed to fetch so the
/// diagnosis columns stay untouched.
fn diagnosis_slots(
    snapshot: &ResidentSnapshot,
    basic: &JsonValue,
) -> Option<(Option<String>, Option<String>)> {
    if let Ok(summary) = &snapshot.diagnoses_summary {
        let text = extract::first_string(
            summary,
            &["PrimarySecondaryDiagnoses", "primarySecondaryDiagnoses"],
        )
        .or_else(|| {
            extract::first_string(
                basic,
                &["PrimarySecondaryDiagnoses", "primarySecondaryDiagnoses"],
            )
        });
        if let Some(text) = text {
            let separator = if text.contains(';') { ';' } else { ',' };
            let mut parts = text
                .split(separator)
                .map(str::trim)
                .filter(|part| !part.is_empty());
            return Some((
                parts.next().map(str::to_string),
                parts.next().map(str::to_string),
            ));
        }
    }

    match &snapshot.diagnoses {
        Ok(list) => {
            let mut slots = extract::unwrap_list(list)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| {
                            extract::first_string(
                                item,
                                &["Description", "description", "Name", "name"],
                            )
                        })
                        .take(2)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
                .into_iter();
            Some((slots.next(), slots.next()))
        }
        Err(_) if snapshot.diagnoses_summary.is_err() => None,
        Err(_) => Some((None, None)),
    }
}

/// Fill the contact columns and the hospice flag from the contact list.
fn apply_contacts(patch: &mut RecordPatch, contacts: &JsonValue) {
    let items = extract::unwrap_list(contacts)
        .map(|items| items.as_slice())
        .unwrap_or_default();

    let slots: [(&str, &str, &str); 2] = [
        (
            fields::CONTACT_1_NAME,
            fields::CONTACT_1_PHONE,
            fields::CONTACT_1_ADDRESS,
        ),
        (
            fields::CONTACT_2_NAME,
            fields::CONTACT_2_PHONE,
            fields::CONTACT_2_ADDRESS,
        ),
    ];

    for (contact, (name_col, phone_col, address_col)) in items.iter().zip(slots) {
        if let Some(name) = contact_name(contact) {
            patch.insert(name_col.to_string(), json!(name));
        }
        if let Some(phone) = contact_phone(contact) {
            patch.insert(phone_col.to_string(), json!(phone));
        }
        if let Some(address) = contact_address(contact) {
            patch.insert(address_col.to_string(), json!(address));
        }
    }

    let hospice = items.iter().any(|contact| {
        extract::first_string(
            contact,
            &["Relationship", "relationship", "ContactType", "contactType"],
        )
        .unwrap_or_default()
        .to_lowercase()
        .contains("hospice")
    });
    patch.insert(fields::HOSPICE.to_string(), json!(hospice));
}

fn contact_name(contact: &JsonValue) -> Option<String> {
    let first = extract::first_string(contact, &["FirstName", "firstName"]);
    let last = extract::first_string(contact, &["LastName", "lastName"]);
    let joined = [first, last]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    if !joined.is_empty() {
        return Some(joined);
    }
    extract::first_string(contact, &["Name", "name"])
}

/// Home number wins, then mobile, then work.
fn contact_phone(contact: &JsonValue) -> Option<String> {
    extract::first_string(contact, &["HomePhone", "homePhone"])
        .or_else(|| {
            extract::first_string(contact, &["MobilePhone", "mobilePhone", "CellPhone", "cellPhone"])
        })
        .or_else(|| extract::first_string(contact, &["WorkPhone", "workPhone"]))
}

/// Street lines joined by spaces, then city, state and postal code joined
/// by commas. Empty pieces are dropped.
fn contact_address(contact: &JsonValue) -> Option<String> {
    let line1 = extract::first_string(contact, &["AddressLine1", "addressLine1", "Address1", "address1"]);
    let line2 = extract::first_string(contact, &["AddressLine2", "addressLine2", "Address2", "address2"]);
    let street = [line1, line2]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

    let mut pieces = Vec::new();
    if !street.is_empty() {
        pieces.push(street);
    }
    if let Some(city) = extract::first_string(contact, &["City", "city"]) {
        pieces.push(city);
    }
    if let Some(state) = extract::first_string(contact, &["State", "state"]) {
        pieces.push(state);
    }
    if let Some(zip) = extract::first_string(contact, &["ZipCode", "zipCode", "PostalCode", "postalCode"]) {
        pieces.push(zip);
    }

    if pieces.is_empty() {
        None
    } else {
        Some(pieces.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::aggregator::FetchError;
    use serde_json::json;

    fn event(event_type: &str, notification: JsonValue) -> LifecycleEvent {
        serde_json::from_value(json!({
            "tenantKey": "acme",
            "communityId": "C-100",
            "eventType": event_type,
            "eventMessageId": "evt-1",
            "eventMessageDate": "2025-01-08T14:00:00Z",
            "notificationData": notification,
        }))
        .expect("valid envelope")
    }

    fn fetch_err(resource: &'static str) -> FetchError {
        FetchError {
            resource,
            message: "boom".to_string(),
        }
    }

    fn snapshot() -> ResidentSnapshot {
        ResidentSnapshot {
            resident: json!({
                "FirstName": "Ada",
                "LastName": "Lovelace",
                "PhysicalMoveInDate": "2024-03-15T00:00:00Z",
                "FinancialMoveInDate": "2024-03-01T00:00:00Z",
                "Classification": "Assisted Living",
                "ProductType": "AL Suite",
                "OnLeave": false,
            }),
            basic_info: json!({
                "DateOfBirth": "1940-12-10T00:00:00",
                "PrimarySecondaryDiagnoses": "Hypertension; Diabetes; Arthritis",
            }),
            community_id: Some("C-100".to_string()),
            community: Some(Ok(json!({"Name": "Maple Grove"}))),
            insurance: Ok(json!([
                {"Name": "Kaiser", "Type": "Medical"},
                {"Name": "Medicare Advantage", "Type": "Medical"},
            ])),
            rooms: Ok(json!([
                {"RoomNumber": "104B", "IsPrimary": false},
                {"RoomNumber": "210A", "IsPrimary": true},
            ])),
            diagnoses_summary: Ok(json!({})),
            diagnoses: Ok(json!([
                {"Description": "Hypertension"},
                {"Description": "Diabetes"},
                {"Description": "Arthritis"},
            ])),
            contacts: Ok(json!([
                {
                    "FirstName": "Grace",
                    "LastName": "Hopper",
                    "MobilePhone": "555-0102",
                    "HomePhone": "555-0101",
                    "AddressLine1": "12 Elm St",
                    "AddressLine2": "Apt 4",
                    "City": "Springfield",
                    "State": "IL",
                    "ZipCode": "62701",
                    "Relationship": "Daughter",
                },
                {
                    "Name": "Mercy Hospice Care",
                    "WorkPhone": "555-0199",
                    "ContactType": "Hospice Provider",
                },
            ])),
        }
    }

    fn existing_row(values: JsonValue) -> SinkRow {
        SinkRow {
            row_id: Some("rec-1".to_string()),
            values,
        }
    }

    #[test]
    fn test_move_in_maps_full_profile() {
        let event = event("resident_move_in", json!({"ResidentId": "R-42"}));
        let patch = map_move_in(&event, &snapshot(), None);

        assert_eq!(patch[fields::RESIDENT_ID], json!("R-42"));
        assert_eq!(patch[fields::COMMUNITY_ID], json!("C-100"));
        assert_eq!(patch[fields::COMMUNITY_NAME], json!("Maple Grove"));
        assert_eq!(patch[fields::RESIDENT_NAME], json!("Ada Lovelace"));
        assert_eq!(patch[fields::DATE_OF_BIRTH], json!("1940-12-10"));
        assert_eq!(patch[fields::ROOM_NUMBER], json!("210A"));
        assert_eq!(patch[fields::MOVE_IN_DATE], json!("2024-03-15"));
        assert_eq!(patch[fields::SERVICE_START_DATE], json!("2024-03-15"));
        assert_eq!(patch[fields::SERVICE_TYPE], json!("Assisted Living"));
        assert_eq!(patch[fields::ON_PREMISES], json!(true));
        assert_eq!(patch[fields::OFF_PREMISES], json!(false));
        assert!(!patch.contains_key(fields::ROW_ID));
    }

    #[test]
    fn test_move_in_date_falls_back_to_financial() {
        let mut snap = snapshot();
        snap.resident["PhysicalMoveInDate"] = JsonValue::Null;
        let event = event("resident_move_in", json!({"ResidentId": "R-42"}));
        let patch = map_move_in(&event, &snap, None);
        assert_eq!(patch[fields::MOVE_IN_DATE], json!("2024-03-01"));
    }

    #[test]
    fn test_move_in_never_overwrites_existing_move_in_date() {
        let event = event("resident_move_in", json!({"ResidentId": "R-42"}));
        let row = existing_row(json!({
            "Move_In_Date": "2020-01-01",
            "Service_Start_Date": "2020-01-01",
        }));
        let patch = map_move_in(&event, &snapshot(), Some(&row));
        assert!(!patch.contains_key(fields::MOVE_IN_DATE));
        assert!(!patch.contains_key(fields::SERVICE_START_DATE));
    }

    #[test]
    fn test_generic_update_excludes_move_in_date() {
        let event = event("resident_update", json!({"ResidentId": "R-42"}));
        let row = existing_row(json!({}));
        let patch = map_generic_update(&event, &snapshot(), &row);
        assert!(!patch.contains_key(fields::MOVE_IN_DATE));
        assert_eq!(patch[fields::RESIDENT_NAME], json!("Ada Lovelace"));
        // service start is still set-once on an empty record
        assert_eq!(patch[fields::SERVICE_START_DATE], json!("2024-03-15"));
    }

    #[test]
    fn test_service_type_prefers_classification_over_product() {
        let mut snap = snapshot();
        snap.resident["Classification"] = JsonValue::Null;
        let event = event("resident_move_in", json!({"ResidentId": "R-42"}));
        let patch = map_move_in(&event, &snap, None);
        assert_eq!(patch[fields::SERVICE_TYPE], json!("AL Suite"));
    }

    #[test]
    fn test_room_number_falls_back_to_resident_rooms_list() {
        let mut snap = snapshot();
        snap.rooms = Err(fetch_err("rooms"));
        snap.resident["Rooms"] = json!([
            {"RoomNumber": "101A", "IsPrimary": false},
            {"RoomNumber": "305C", "IsPrimary": true},
        ]);
        let event = event("resident_move_in", json!({"ResidentId": "R-42"}));
        let patch = map_move_in(&event, &snap, None);
        assert_eq!(patch[fields::ROOM_NUMBER], json!("305C"));

        // Empty assignment list falls back the same way.
        snap.rooms = Ok(json!([]));
        let patch = map_move_in(&event, &snap, None);
        assert_eq!(patch[fields::ROOM_NUMBER], json!("305C"));
    }

    #[test]
    fn test_on_leave_resident_maps_off_premises() {
        let mut snap = snapshot();
        snap.resident["OnLeave"] = json!(true);
        snap.resident["LeaveStartDate"] = json!("2025-01-02T08:00:00Z");
        let event = event("resident_move_in", json!({"ResidentId": "R-42"}));
        let patch = map_move_in(&event, &snap, None);
        assert_eq!(patch[fields::OFF_PREMISES], json!(true));
        assert_eq!(patch[fields::ON_PREMISES], json!(false));
        assert_eq!(patch[fields::OFF_PREM_DATE], json!("2025-01-02"));
    }

    #[test]
    fn test_medicare_policy_promoted_to_first_slot() {
        let event = event("resident_move_in", json!({"ResidentId": "R-42"}));
        let patch = map_move_in(&event, &snapshot(), None);
        assert_eq!(patch[fields::INSURANCE_1], json!("Medicare Advantage"));
        assert_eq!(patch[fields::INSURANCE_2], json!("Kaiser"));
    }

    #[test]
    fn test_untyped_policies_kept_in_order() {
        let mut snap = snapshot();
        snap.insurance = Ok(json!([{"Name": "Aetna"}, {"Name": "BCBS"}]));
        let event = event("resident_move_in", json!({"ResidentId": "R-42"}));
        let patch = map_move_in(&event, &snap, None);
        assert_eq!(patch[fields::INSURANCE_1], json!("Aetna"));
        assert_eq!(patch[fields::INSURANCE_2], json!("BCBS"));
    }

    #[test]
    fn test_non_medical_policies_excluded() {
        let mut snap = snapshot();
        snap.insurance = Ok(json!([
            {"Name": "Delta Dental", "Type": "Dental"},
            {"Name": "Kaiser", "Type": "Medical"},
        ]));
        let event = event("resident_move_in", json!({"ResidentId": "R-42"}));
        let patch = map_move_in(&event, &snap, None);
        assert_eq!(patch[fields::INSURANCE_1], json!("Kaiser"));
        assert!(!patch.contains_key(fields::INSURANCE_2));
    }

    #[test]
    fn test_insurance_fetch_failure_leaves_columns_untouched() {
        let mut snap = snapshot();
        snap.insurance = Err(fetch_err("insurance"));
        let event = event("resident_move_in", json!({"ResidentId": "R-42"}));
        let patch = map_move_in(&event, &snap, None);
        assert!(!patch.contains_key(fields::INSURANCE_1));
        assert!(!patch.contains_key(fields::INSURANCE_2));
    }

    #[test]
    fn test_diagnoses_prefer_summary_field() {
        let event = event("resident_move_in", json!({"ResidentId": "R-42"}));
        let patch = map_move_in(&event, &snapshot(), None);
        // summary string on basic info wins over the full list
        assert_eq!(patch[fields::DIAGNOSIS_1], json!("Hypertension"));
        assert_eq!(patch[fields::DIAGNOSIS_2], json!("Diabetes"));
    }

    #[test]
    fn test_diagnoses_fall_back_to_full_list() {
        let mut snap = snapshot();
        snap.basic_info = json!({"DateOfBirth": "1940-12-10"});
        snap.diagnoses = Ok(json!([
            {"Description": "CHF"},
            {"Description": "COPD"},
            {"Description": "Arthritis"},
        ]));
        let event = event("resident_move_in", json!({"ResidentId": "R-42"}));
        let patch = map_move_in(&event, &snap, None);
        assert_eq!(patch[fields::DIAGNOSIS_1], json!("CHF"));
        assert_eq!(patch[fields::DIAGNOSIS_2], json!("COPD"));
    }

    #[test]
    fn test_contact_mapping_and_hospice_flag() {
        let event = event("resident_move_in", json!({"ResidentId": "R-42"}));
        let patch = map_move_in(&event, &snapshot(), None);

        assert_eq!(patch[fields::CONTACT_1_NAME], json!("Grace Hopper"));
        // home phone wins over mobile
        assert_eq!(patch[fields::CONTACT_1_PHONE], json!("555-0101"));
        assert_eq!(
            patch[fields::CONTACT_1_ADDRESS],
            json!("12 Elm St Apt 4, Springfield, IL, 62701")
        );
        assert_eq!(patch[fields::CONTACT_2_NAME], json!("Mercy Hospice Care"));
        assert_eq!(patch[fields::CONTACT_2_PHONE], json!("555-0199"));
        assert_eq!(patch[fields::HOSPICE], json!(true));
    }

    #[test]
    fn test_contacts_fetch_failure_omits_hospice_flag() {
        let mut snap = snapshot();
        snap.contacts = Err(fetch_err("contacts"));
        let event = event("resident_move_in", json!({"ResidentId": "R-42"}));
        let patch = map_move_in(&event, &snap, None);
        assert!(!patch.contains_key(fields::HOSPICE));
        assert!(!patch.contains_key(fields::CONTACT_1_NAME));
    }

    #[test]
    fn test_move_out_builds_occupancy_and_vacancy() {
        let event = event(
            "resident_move_out",
            json!({"ResidentId": "R-42", "MoveOutDate": "2025-01-05T09:00:00Z"}),
        );
        let row = existing_row(json!({
            "Community_ID": "C-100",
            "Room_Number": "210A",
        }));
        let (occupancy, vacancy) = map_move_out(&event, "R-42", &row).expect("mapped");

        assert_eq!(occupancy[fields::MOVE_OUT_DATE], json!("2025-01-05"));
        assert_eq!(occupancy[fields::SERVICE_END_DATE], json!("2025-01-05"));

        assert_eq!(vacancy[fields::RESIDENT_ID], json!("R-42-VACANT-evt-1"));
        assert_eq!(vacancy[fields::COMMUNITY_ID], json!("C-100"));
        assert_eq!(vacancy[fields::ROOM_NUMBER], json!("210A"));
        assert_eq!(vacancy[fields::SERVICE_TYPE], json!("Vacant"));
        assert_eq!(vacancy[fields::SERVICE_START_DATE], json!("2025-01-05"));
    }

    #[test]
    fn test_move_out_respects_existing_end_dates() {
        let event = event(
            "resident_move_out",
            json!({"ResidentId": "R-42", "MoveOutDate": "2025-01-05"}),
        );
        let row = existing_row(json!({
            "Move_Out_Date": "2024-12-31",
            "Service_End_Date": "2024-12-31",
        }));
        let (occupancy, _) = map_move_out(&event, "R-42", &row).expect("mapped");
        assert!(occupancy.is_empty());
    }

    #[test]
    fn test_move_out_falls_back_to_event_timestamp() {
        let event = event("resident_move_out", json!({"ResidentId": "R-42"}));
        let row = existing_row(json!({}));
        let (occupancy, _) = map_move_out(&event, "R-42", &row).expect("mapped");
        assert_eq!(occupancy[fields::MOVE_OUT_DATE], json!("2025-01-08"));
    }

    #[test]
    fn test_leave_start_uses_leave_record_date() {
        let event = event("leave_of_absence_start", json!({"ResidentId": "R-42"}));
        let leave = json!({"StartDateTime": "2025-01-03T12:00:00Z"});
        let patch = map_leave_start(&event, Some(&leave)).expect("mapped");
        assert_eq!(patch[fields::OFF_PREMISES], json!(true));
        assert_eq!(patch[fields::ON_PREMISES], json!(false));
        assert_eq!(patch[fields::OFF_PREM_DATE], json!("2025-01-03"));
    }

    #[test]
    fn test_leave_start_falls_back_to_event_timestamp() {
        let event = event("leave_of_absence_start", json!({"ResidentId": "R-42"}));
        let patch = map_leave_start(&event, None).expect("mapped");
        assert_eq!(patch[fields::OFF_PREM_DATE], json!("2025-01-08"));
    }

    #[test]
    fn test_leave_end_is_symmetric() {
        let event = event("leave_of_absence_end", json!({"ResidentId": "R-42"}));
        let leave = json!({"EndDateTime": "2025-01-06T12:00:00Z"});
        let patch = map_leave_end(&event, Some(&leave)).expect("mapped");
        assert_eq!(patch[fields::ON_PREMISES], json!(true));
        assert_eq!(patch[fields::OFF_PREMISES], json!(false));
        assert_eq!(patch[fields::OFF_PREM_DATE], json!("2025-01-06"));
    }

    #[test]
    fn test_leave_with_no_usable_date_maps_to_none() {
        let mut event = event("leave_of_absence_start", json!({"ResidentId": "R-42"}));
        event.event_message_date = "not a timestamp".to_string();
        assert!(map_leave_start(&event, None).is_none());
    }
}
