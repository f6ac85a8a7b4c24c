//! End-to-end pipeline tests: webhook intake over real HTTP against an
//! in-memory database, and orchestrator runs against mocked source and
//! sink APIs.

use std::sync::Arc;

use migration::MigratorTrait;
use resident_sync::config::{AppConfig, SinkConfig};
use resident_sync::events::LifecycleEvent;
use resident_sync::models::event_ledger::status as ledger_status;
use resident_sync::orchestrator::{EventOrchestrator, Outcome};
use resident_sync::repositories::{DispatchRepository, LedgerRepository};
use resident_sync::server::{AppState, create_app};
use resident_sync::sink::client::SinkClient;
use resident_sync::source::aggregator::SnapshotFetcher;
use resident_sync::source::client::{SourceClient, SourceCredentials};
use sea_orm::{Database, DatabaseConnection};
use serde_json::{Value as JsonValue, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db
}

async fn spawn_server(db: DatabaseConnection) -> String {
    let state = AppState {
        db,
        config: Arc::new(AppConfig::default()),
    };
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn event_body(event_type: &str, event_message_id: &str) -> JsonValue {
    json!({
        "tenantKey": "acme",
        "communityId": "C-1",
        "eventType": event_type,
        "eventMessageId": event_message_id,
        "eventMessageDate": "2025-01-08T14:00:00Z",
        "notificationData": {"ResidentId": "R-1"},
    })
}

#[tokio::test]
async fn test_intake_queues_then_acknowledges_duplicate() {
    let db = setup_test_db().await;
    let base = spawn_server(db.clone()).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("{base}/webhooks/events"))
        .json(&event_body("resident_move_in", "evt-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);
    let body: JsonValue = response.json().await.unwrap();
    assert_eq!(body["status"], json!("queued"));
    assert!(body["id"].is_string());

    // Ledger entry is queued and a dispatch job exists.
    let entry = LedgerRepository::new(&db)
        .find_by_event_message_id("evt-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, ledger_status::QUEUED);
    assert!(
        DispatchRepository::new(&db)
            .find_by_event_message_id("evt-1")
            .await
            .unwrap()
            .is_some()
    );

    // Re-delivery of the same event acknowledges without a second entry.
    let response = http
        .post(format!("{base}/webhooks/events"))
        .json(&event_body("resident_move_in", "evt-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: JsonValue = response.json().await.unwrap();
    assert_eq!(body["status"], json!("duplicate"));

    let entry_after = LedgerRepository::new(&db)
        .find_by_event_message_id("evt-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry_after.id, entry.id);
    assert_eq!(entry_after.status, ledger_status::QUEUED);
}

#[tokio::test]
async fn test_intake_ignores_unsupported_and_rejects_malformed() {
    let db = setup_test_db().await;
    let base = spawn_server(db.clone()).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("{base}/webhooks/events"))
        .json(&event_body("census_snapshot", "evt-2"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);
    let body: JsonValue = response.json().await.unwrap();
    assert_eq!(body["status"], json!("ignored"));

    let entry = LedgerRepository::new(&db)
        .find_by_event_message_id("evt-2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, ledger_status::IGNORED);
    assert!(
        DispatchRepository::new(&db)
            .find_by_event_message_id("evt-2")
            .await
            .unwrap()
            .is_none()
    );

    // Missing event-message id fails validation.
    let response = http
        .post(format!("{base}/webhooks/events"))
        .json(&json!({
            "tenantKey": "acme",
            "eventType": "resident_move_in",
            "eventMessageId": "",
            "eventMessageDate": "2025-01-08T14:00:00Z",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

async fn mount_source(server: &MockServer) {
    let routes: Vec<(&str, JsonValue)> = vec![
        (
            "/api/residents/R-1",
            json!({
                "FirstName": "Ada",
                "LastName": "Lovelace",
                "PhysicalMoveInDate": "2024-03-15T00:00:00Z",
                "Classification": "Assisted Living",
                "OnLeave": false,
            }),
        ),
        (
            "/api/residents/R-1/basic-information",
            json!({"DateOfBirth": "1940-12-10"}),
        ),
        (
            "/api/residents/R-1/insurance-policies",
            json!([{"Name": "Kaiser", "Type": "Medical"}]),
        ),
        (
            "/api/residents/R-1/room-assignments",
            json!([{"RoomNumber": "210A", "IsPrimary": true}]),
        ),
        ("/api/residents/R-1/diagnoses/summary", json!({})),
        (
            "/api/residents/R-1/diagnoses",
            json!([{"Description": "Hypertension"}]),
        ),
        ("/api/residents/R-1/contacts", json!([])),
        ("/api/communities/C-1", json!({"Name": "Maple Grove"})),
    ];
    for (route, body) in routes {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }
}

async fn mount_sink_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-1",
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .mount(server)
        .await;
}

fn orchestrator_for(source: &MockServer, sink: &MockServer) -> EventOrchestrator {
    let source_client = SourceClient::new(&source.uri()).unwrap();
    let sink_client = SinkClient::new(&SinkConfig {
        api_base: sink.uri(),
        token_url: format!("{}/oauth/token", sink.uri()),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        table: "Residents".to_string(),
        max_attempts: 3,
    })
    .unwrap();
    EventOrchestrator::new(SnapshotFetcher::new(source_client), sink_client)
}

fn creds() -> SourceCredentials {
    SourceCredentials {
        username: "svc".to_string(),
        password: "pass".to_string(),
    }
}

fn lifecycle_event(event_type: &str) -> LifecycleEvent {
    serde_json::from_value(event_body(event_type, "evt-9")).unwrap()
}

#[tokio::test]
async fn test_move_in_for_unknown_resident_inserts_record() {
    let source = MockServer::start().await;
    let sink = MockServer::start().await;
    mount_source(&source).await;
    mount_sink_token(&sink).await;

    Mock::given(method("GET"))
        .and(path("/tables/Residents/records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&sink)
        .await;
    Mock::given(method("POST"))
        .and(path("/tables/Residents/records"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"Row_ID": "rec-1"})))
        .expect(1)
        .mount(&sink)
        .await;

    let orchestrator = orchestrator_for(&source, &sink);
    let outcome = orchestrator
        .process(&lifecycle_event("resident_move_in"), &creds())
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Applied { action: "insert" }));

    // The inserted record carries the mapped profile.
    let requests = sink.received_requests().await.unwrap();
    let insert = requests
        .iter()
        .find(|r| r.method.to_string() == "POST" && r.url.path().ends_with("/records"))
        .expect("insert request sent");
    let body: JsonValue = serde_json::from_slice(&insert.body).unwrap();
    assert_eq!(body["Resident_ID"], json!("R-1"));
    assert_eq!(body["Move_In_Date"], json!("2024-03-15"));
    assert_eq!(body["Service_Type"], json!("Assisted Living"));
    assert_eq!(body["Community_Name"], json!("Maple Grove"));
    assert!(body.get("Row_ID").is_none());
}

#[tokio::test]
async fn test_move_out_without_prior_record_skips_with_zero_writes() {
    let source = MockServer::start().await;
    let sink = MockServer::start().await;
    mount_source(&source).await;
    mount_sink_token(&sink).await;

    Mock::given(method("GET"))
        .and(path("/tables/Residents/records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&sink)
        .await;
    Mock::given(method("POST"))
        .and(path("/tables/Residents/records"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(0)
        .mount(&sink)
        .await;

    let orchestrator = orchestrator_for(&source, &sink);
    let outcome = orchestrator
        .process(&lifecycle_event("resident_move_out"), &creds())
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Skipped { .. }));
}

#[tokio::test]
async fn test_move_out_with_record_patches_and_inserts_vacancy() {
    let source = MockServer::start().await;
    let sink = MockServer::start().await;
    mount_source(&source).await;
    mount_sink_token(&sink).await;

    Mock::given(method("GET"))
        .and(path("/tables/Residents/records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"Row_ID": "rec-1", "Resident_ID": "R-1", "Community_ID": "C-1", "Room_Number": "210A"},
        ])))
        .mount(&sink)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/tables/Residents/records/rec-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&sink)
        .await;
    Mock::given(method("POST"))
        .and(path("/tables/Residents/records"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&sink)
        .await;

    let orchestrator = orchestrator_for(&source, &sink);
    let outcome = orchestrator
        .process(&lifecycle_event("resident_move_out"), &creds())
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Applied { action: "move-out" }));

    let requests = sink.received_requests().await.unwrap();
    let vacancy = requests
        .iter()
        .find(|r| r.method.to_string() == "POST" && r.url.path().ends_with("/records"))
        .expect("vacancy insert sent");
    let body: JsonValue = serde_json::from_slice(&vacancy.body).unwrap();
    assert_eq!(body["Resident_ID"], json!("R-1-VACANT-evt-9"));
    assert_eq!(body["Service_Type"], json!("Vacant"));
}

#[tokio::test]
async fn test_event_without_community_id_is_dropped() {
    let source = MockServer::start().await;
    let sink = MockServer::start().await;

    let mut event = lifecycle_event("resident_move_in");
    event.community_id = None;

    let orchestrator = orchestrator_for(&source, &sink);
    let outcome = orchestrator.process(&event, &creds()).await.unwrap();
    assert!(matches!(outcome, Outcome::Skipped { .. }));

    // Nothing was fetched or written.
    assert!(source.received_requests().await.unwrap().is_empty());
    assert!(sink.received_requests().await.unwrap().is_empty());
}
