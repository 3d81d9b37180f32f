//! Integration tests for `HttpSheetClient` using wiremock.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use latchkey_network::{
    AuthorizationSource, HttpSheetClient, LogRow, LogSink, RemoteError, SheetClientConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, HttpSheetClient) {
    let server = MockServer::start().await;
    let client = HttpSheetClient::from_reqwest(&server.uri(), reqwest::Client::new()).unwrap();
    (server, client)
}

fn row() -> LogRow {
    LogRow {
        timestamp: "2025-03-14 09:26:53".into(),
        subject: "04a1b2c3".into(),
        status: "Granted".into(),
    }
}

// ── Badge list ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_authorized_badges() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/badges"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"badges": ["04A1B2C3", " deadbeef "]})),
        )
        .mount(&server)
        .await;

    let badges = client.fetch_authorized().await.unwrap();
    assert_eq!(badges, vec!["04A1B2C3", " deadbeef "]);
}

#[tokio::test]
async fn test_fetch_sends_bearer_token() {
    let server = MockServer::start().await;
    let config = SheetClientConfig::new(&format!("{}/door", server.uri()))
        .unwrap()
        .with_api_token("s3cret");
    let client = HttpSheetClient::new(&config).unwrap();

    Mock::given(method("GET"))
        .and(path("/door/badges"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"badges": []})))
        .expect(1)
        .mount(&server)
        .await;

    assert!(client.fetch_authorized().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fetch_server_error_is_status() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/badges"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    match client.fetch_authorized().await.unwrap_err() {
        RemoteError::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_fetch_malformed_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/badges"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    assert!(matches!(
        client.fetch_authorized().await.unwrap_err(),
        RemoteError::Malformed { .. }
    ));
}

#[tokio::test]
async fn test_fetch_times_out() {
    let server = MockServer::start().await;
    let config = SheetClientConfig::new(&server.uri())
        .unwrap()
        .with_timeout(Duration::from_millis(200));
    let client = HttpSheetClient::new(&config).unwrap();

    Mock::given(method("GET"))
        .and(path("/badges"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"badges": ["aa"]}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = client.fetch_authorized().await.unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {err}");
}

// ── Log append ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_append_row_posts_values() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/log"))
        .and(body_json(
            json!({"values": [["2025-03-14 09:26:53", "04a1b2c3", "Granted"]]}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"updated": 1})))
        .expect(1)
        .mount(&server)
        .await;

    client.append_row(&row()).await.unwrap();
}

#[tokio::test]
async fn test_append_row_rejected() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/log"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    assert!(matches!(
        client.append_row(&row()).await.unwrap_err(),
        RemoteError::Status { status: 403, .. }
    ));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Bind then drop a listener to get a port nobody is serving.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client =
        HttpSheetClient::from_reqwest(&format!("http://{addr}"), reqwest::Client::new()).unwrap();
    assert!(matches!(
        client.fetch_authorized().await.unwrap_err(),
        RemoteError::Transport(_)
    ));
}
