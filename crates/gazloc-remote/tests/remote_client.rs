//! Wiremock-backed integration tests for `RemoteDirectoryClient`.

use std::time::Duration;

use gazloc_core::{ChangeEvent, VendorId};
use gazloc_remote::{RemoteConfig, RemoteDirectory, RemoteDirectoryClient, RemoteError};
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WAIT: Duration = Duration::from_secs(5);

fn client_for(server: &MockServer) -> RemoteDirectoryClient {
    let mut config = RemoteConfig::new(server.uri(), "vendors");
    config.api_key = Some("test-key".to_owned());
    config.max_retries = 2;
    config.backoff_base_secs = 0;
    config.resubscribe_delay = Duration::from_millis(100);
    RemoteDirectoryClient::new(config).expect("client construction should not fail")
}

fn listing() -> serde_json::Value {
    json!([
        {
            "id": 1,
            "name": "Dépôt Akpakpa",
            "lieu": "Akpakpa",
            "latitude": "6.3703",
            "longitude": "2.3912",
            "brands": ["ORIX"],
            "bottleTypes": { "ORIX": { "large": true } },
            "prices": { "ORIX": { "large": 3500 } }
        },
        {
            "id": 2,
            "name": "Gaz Express",
            "latitude": 6.4969,
            "longitude": 2.6289,
            "brands": ["BENIN PETRO"],
            "bottleTypes": { "BENIN PETRO": ["small"] }
        }
    ])
}

const FEED: &str = concat!(
    r#"{"eventType":"INSERT","new":{"id":3,"name":"Nouveau"}}"#,
    "\n",
    ": heartbeat\n",
    "this is not json\n",
    r#"{"eventType":"UPDATE","new":{"id":1,"name":"Akpakpa Centre"}}"#,
    "\n",
    r#"{"eventType":"DELETE","old":{"id":2}}"#,
    "\n",
);

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for callback")
        .expect("channel closed")
}

#[tokio::test]
async fn fetch_all_parses_listing_with_auth_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/vendors"))
        .and(query_param("select", "*"))
        .and(header("apikey", "test-key"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing()))
        .expect(1)
        .mount(&server)
        .await;

    let vendors = client_for(&server).fetch_all().await.unwrap();
    assert_eq!(vendors.len(), 2);
    let first = vendors.get(&VendorId::Int(1)).unwrap();
    assert_eq!(first.latitude, Some(6.3703));
    assert!(first.offers("ORIX", "large"));
    assert!(vendors
        .get(&VendorId::Int(2))
        .unwrap()
        .offers("BENIN PETRO", "small"));
}

#[tokio::test]
async fn fetch_all_skips_rows_without_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/vendors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "name": "A", "latitude": "oops" },
            { "name": "orphan" }
        ])))
        .mount(&server)
        .await;

    let vendors = client_for(&server).fetch_all().await.unwrap();
    assert_eq!(vendors.len(), 1);
    assert!(vendors.get(&VendorId::Int(1)).unwrap().position().is_none());
}

#[tokio::test]
async fn fetch_all_retries_server_error_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/vendors"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/vendors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing()))
        .expect(1)
        .mount(&server)
        .await;

    let vendors = client_for(&server).fetch_all().await.unwrap();
    assert_eq!(vendors.len(), 2);
}

#[tokio::test]
async fn fetch_all_retries_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/vendors"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/vendors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let vendors = client_for(&server).fetch_all().await.unwrap();
    assert!(vendors.is_empty());
}

#[tokio::test]
async fn fetch_all_gives_up_after_retry_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/vendors"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = client_for(&server).fetch_all().await.unwrap_err();
    assert!(
        matches!(err, RemoteError::UnexpectedStatus { status: 500, .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn fetch_all_does_not_retry_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/vendors"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server).fetch_all().await.unwrap_err();
    assert!(matches!(err, RemoteError::UnexpectedStatus { status: 404, .. }));
}

#[tokio::test]
async fn fetch_all_reports_undecodable_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/vendors"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server).fetch_all().await.unwrap_err();
    assert!(matches!(err, RemoteError::Deserialize { .. }), "got {err:?}");
}

#[tokio::test]
async fn subscription_delivers_events_in_order_and_resubscribes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/realtime/v1/vendors/changes"))
        .and(header("apikey", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .mount(&server)
        .await;

    let (event_tx, mut events) = mpsc::unbounded_channel();
    let (error_tx, mut errors) = mpsc::unbounded_channel();
    let subscription = client_for(&server).subscribe(
        move |event| {
            let _ = event_tx.send(event);
        },
        move |err| {
            let _ = error_tx.send(err);
        },
    );

    match recv(&mut events).await {
        ChangeEvent::Inserted(r) => assert_eq!(r.id, VendorId::Int(3)),
        other => panic!("expected insert, got {other:?}"),
    }
    match recv(&mut events).await {
        ChangeEvent::Updated(r) => assert_eq!(r.name, "Akpakpa Centre"),
        other => panic!("expected update, got {other:?}"),
    }
    assert_eq!(recv(&mut events).await, ChangeEvent::Deleted(VendorId::Int(2)));

    let err = recv(&mut errors).await;
    assert!(matches!(err, RemoteError::StreamClosed { .. }), "got {err:?}");

    // After the resubscribe delay the feed is replayed from the start.
    match recv(&mut events).await {
        ChangeEvent::Inserted(r) => assert_eq!(r.id, VendorId::Int(3)),
        other => panic!("expected insert after resubscribe, got {other:?}"),
    }

    subscription.shutdown().await;
}

#[tokio::test]
async fn subscription_reports_connect_failures_and_keeps_trying() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/realtime/v1/vendors/changes"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (error_tx, mut errors) = mpsc::unbounded_channel();
    let subscription = client_for(&server).subscribe(
        |_event| {},
        move |err| {
            let _ = error_tx.send(err);
        },
    );

    for _ in 0..2 {
        let err = recv(&mut errors).await;
        assert!(
            matches!(err, RemoteError::UnexpectedStatus { status: 503, .. }),
            "got {err:?}"
        );
    }
    subscription.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_all_callbacks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/realtime/v1/vendors/changes"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .mount(&server)
        .await;

    let (event_tx, mut events) = mpsc::unbounded_channel();
    let subscription = client_for(&server).subscribe(
        move |event| {
            let _ = event_tx.send(event);
        },
        |_err| {},
    );
    recv(&mut events).await;

    subscription.shutdown().await;

    // The feed task owned the callbacks; once it is gone the channel closes
    // after whatever was already buffered.
    tokio::time::timeout(WAIT, async { while events.recv().await.is_some() {} })
        .await
        .expect("channel should close after shutdown");
}

#[tokio::test]
async fn subscribing_again_replaces_previous_feed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/realtime/v1/vendors/changes"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let first = client.subscribe(|_| {}, |_| {});
    let second = client.subscribe(|_| {}, |_| {});

    assert!(first.is_cancelled());
    assert!(!second.is_cancelled());
    second.shutdown().await;
}
