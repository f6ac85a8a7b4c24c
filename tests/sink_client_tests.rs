//! Sink client integration tests against a mocked sink API, covering the
//! token lifecycle and the retry policy.

use resident_sync::config::SinkConfig;
use resident_sync::mapper::fields;
use resident_sync::sink::client::{SinkClient, SinkError};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sink_config(server: &MockServer) -> SinkConfig {
    SinkConfig {
        api_base: server.uri(),
        token_url: format!("{}/oauth/token", server.uri()),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        table: "Residents".to_string(),
        max_attempts: 3,
    }
}

async fn mount_token(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .mount(server)
        .await;
}

fn composite_filter(community_id: &str, resident_id: &str) -> String {
    json!({
        fields::COMMUNITY_ID: community_id,
        fields::RESIDENT_ID: resident_id,
    })
    .to_string()
}

#[tokio::test]
async fn test_429_then_success_retries_once() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;

    Mock::given(method("GET"))
        .and(path("/tables/Residents/records"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tables/Residents/records"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"Row_ID": "rec-1", "Resident_ID": "R-1"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = SinkClient::new(&sink_config(&server)).unwrap();
    let row = client.find_record(Some("C-1"), "R-1").await.unwrap();
    assert_eq!(row.unwrap().row_id.as_deref(), Some("rec-1"));
}

#[tokio::test]
async fn test_401_invalidates_token_and_retries_exactly_once() {
    let server = MockServer::start().await;

    // First token is stale; the refresh after the 401 yields a good one.
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-stale",
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_token(&server, "tok-fresh").await;

    Mock::given(method("GET"))
        .and(path("/tables/Residents/records"))
        .and(header("authorization", "Bearer tok-stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tables/Residents/records"))
        .and(header("authorization", "Bearer tok-fresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"Row_ID": "rec-1", "Resident_ID": "R-1"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = SinkClient::new(&sink_config(&server)).unwrap();
    let row = client.find_record(Some("C-1"), "R-1").await.unwrap();
    assert!(row.is_some());
}

#[tokio::test]
async fn test_persistent_401_fails_without_looping() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;

    // Always 401: one token refresh is allowed, then the error surfaces.
    Mock::given(method("GET"))
        .and(path("/tables/Residents/records"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let client = SinkClient::new(&sink_config(&server)).unwrap();
    let err = client.find_record(Some("C-1"), "R-1").await.unwrap_err();
    assert!(matches!(
        err,
        SinkError::Status { status, .. } if status.as_u16() == 401
    ));
}

#[tokio::test]
async fn test_repeated_500s_stop_after_attempt_budget() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;

    Mock::given(method("GET"))
        .and(path("/tables/Residents/records"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let client = SinkClient::new(&sink_config(&server)).unwrap();
    let err = client.find_record(Some("C-1"), "R-1").await.unwrap_err();
    assert!(matches!(
        err,
        SinkError::RetriesExhausted { attempts: 3, .. }
    ));
}

#[tokio::test]
async fn test_duplicate_composite_rows_yield_one_usable_row() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;

    Mock::given(method("GET"))
        .and(path("/tables/Residents/records"))
        .and(query_param("filter", composite_filter("C-1", "R-1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"Row_ID": "rec-1", "Resident_ID": "R-1", "Community_ID": "C-1"},
            {"Row_ID": "rec-2", "Resident_ID": "R-1", "Community_ID": "C-1"},
        ])))
        .mount(&server)
        .await;

    let client = SinkClient::new(&sink_config(&server)).unwrap();
    let row = client.find_record(Some("C-1"), "R-1").await.unwrap().unwrap();
    assert_eq!(row.row_id.as_deref(), Some("rec-1"));
}

#[tokio::test]
async fn test_legacy_fallback_adopts_record_without_community() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;

    Mock::given(method("GET"))
        .and(path("/tables/Residents/records"))
        .and(query_param("filter", composite_filter("C-1", "R-1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tables/Residents/records"))
        .and(query_param(
            "filter",
            json!({fields::RESIDENT_ID: "R-1"}).to_string(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"Row_ID": "rec-legacy", "Resident_ID": "R-1"},
        ])))
        .mount(&server)
        .await;

    let client = SinkClient::new(&sink_config(&server)).unwrap();
    let row = client.find_record(Some("C-1"), "R-1").await.unwrap().unwrap();
    assert_eq!(row.row_id.as_deref(), Some("rec-legacy"));
}

#[tokio::test]
async fn test_legacy_fallback_never_adopts_contradicting_community() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;

    Mock::given(method("GET"))
        .and(path("/tables/Residents/records"))
        .and(query_param("filter", composite_filter("C-1", "R-1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tables/Residents/records"))
        .and(query_param(
            "filter",
            json!({fields::RESIDENT_ID: "R-1"}).to_string(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"Row_ID": "rec-other", "Resident_ID": "R-1", "Community_ID": "C-9"},
        ])))
        .mount(&server)
        .await;

    let client = SinkClient::new(&sink_config(&server)).unwrap();
    let row = client.find_record(Some("C-1"), "R-1").await.unwrap();
    assert!(row.is_none());
}

#[tokio::test]
async fn test_update_strips_row_id_from_body() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;

    Mock::given(method("PATCH"))
        .and(path("/tables/Residents/records/rec-1"))
        .and(wiremock::matchers::body_json(json!({
            "Move_Out_Date": "2025-01-05",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = SinkClient::new(&sink_config(&server)).unwrap();
    let mut patch = resident_sync::sink::client::RecordPatch::new();
    patch.insert(fields::ROW_ID.to_string(), json!("rec-1"));
    patch.insert(fields::MOVE_OUT_DATE.to_string(), json!("2025-01-05"));
    client.update_record("rec-1", &patch).await.unwrap();
}
