#![allow(clippy::unwrap_used)]
// Integration tests for `PortalClient` over `HttpTransport` using wiremock.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use evcnet_api::{
    Credentials, Error, HttpTransport, PortalAction, PortalClient, RetryPolicy, Session,
    SessionCookie, StartIdentifiers, TransportConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    }
}

async fn setup() -> (MockServer, PortalClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let transport = HttpTransport::new(base_url, &TransportConfig::default()).unwrap();
    (server, PortalClient::new(transport, fast_retry()))
}

fn session() -> Session {
    Session::from_cookies([SessionCookie::new("PHPSESSID", "sess-1")])
}

fn credentials(password: &str) -> Credentials {
    Credentials::new("owner@example.com", SecretString::from(password.to_string()))
}

// ── Login ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_success_returns_session_cookie() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/Login/Login"))
        .and(body_string_contains("emailField=owner%40example.com"))
        .and(body_string_contains("passwordField=hunter2"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "/Dashboard")
                .append_header("Set-Cookie", "PHPSESSID=fresh-session; path=/")
                .append_header("Set-Cookie", "SERVERID=node-3; path=/"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = client.login(&credentials("hunter2")).await.unwrap();
    assert_eq!(
        session.cookie_header(),
        "PHPSESSID=fresh-session; SERVERID=node-3"
    );
}

#[tokio::test]
async fn test_login_rejected_when_portal_shows_form_again() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/Login/Login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let result = client.login(&credentials("wrong")).await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_login_redirect_without_session_cookie_fails() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/Login/Login"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/Login"))
        .mount(&server)
        .await;

    let result = client.login(&credentials("hunter2")).await;
    assert!(matches!(result, Err(Error::Authentication { .. })));
}

// ── Ajax envelope ───────────────────────────────────────────────────

#[tokio::test]
async fn test_spot_overview_sends_cookie_and_browser_headers() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/ajax"))
        .and(header("Cookie", "PHPSESSID=sess-1"))
        .and(header("X-Requested-With", "XMLHttpRequest"))
        .and(header_exists("User-Agent"))
        .and(body_string_contains("requests="))
        .and(body_string_contains("overview"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([[{
            "STATUS": "0000000000010000",
            "NOTIFICATION": "Charging",
            "MOM_POWER_KW": "7,36",
            "TRANS_ENERGY_DELIVERED_KWH": "3,2",
            "TRANSACTION_TIME_H_M": "0:25",
            "CARDID": "ABC12DEF34",
            "CUSTOMERS_IDX": "9001",
            "CHANNEL": "1"
        }]])))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client.spot_overview(&session(), "1234").await.unwrap();
    assert_eq!(reply.data.len(), 1);
    assert_eq!(reply.data[0].notification.as_deref(), Some("Charging"));
}

#[tokio::test]
async fn test_html_body_is_session_expired() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/ajax"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/html")
                .set_body_string("<!DOCTYPE html><html><body>Login</body></html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = client.spot_overview(&session(), "1234").await;
    assert!(matches!(result, Err(Error::SessionExpired)));
}

#[tokio::test]
async fn test_server_error_is_retried_then_surfaced() {
    let (server, client) = setup().await;

    // 1 attempt + 2 retries
    Mock::given(method("POST"))
        .and(path("/api/ajax"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let result = client.network_overview(&session()).await;
    assert!(matches!(result, Err(Error::Unavailable { status: 503 })));
}

#[tokio::test]
async fn test_transient_failure_recovers_on_retry() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/ajax"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/ajax"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([[{
            "IDX": 1234,
            "NAME": "Driveway",
            "CHANNEL": "2",
            "SOFTWARE_VERSION": "4.1.0"
        }]])))
        .mount(&server)
        .await;

    let reply = client.network_overview(&session()).await.unwrap();
    assert_eq!(reply.data.len(), 1);
    assert_eq!(reply.data[0].name.as_deref(), Some("Driveway"));
}

#[tokio::test]
async fn test_total_usage_accepts_single_object() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/ajax"))
        .and(body_string_contains("totalUsage"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "number": "1.234,56", "unit": "kWh" }])),
        )
        .mount(&server)
        .await;

    let reply = client.total_usage(&session(), "1234").await.unwrap();
    let usage = reply.data.unwrap();
    assert_eq!(usage.unit.as_deref(), Some("kWh"));
}

#[tokio::test]
async fn test_sticky_cookie_is_returned_with_reply() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/ajax"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("Set-Cookie", "SERVERID=node-7; path=/")
                .set_body_json(json!([[]])),
        )
        .mount(&server)
        .await;

    let reply = client.spot_log(&session(), "1234", 1).await.unwrap();
    assert!(reply.data.is_empty());
    assert_eq!(reply.cookies.len(), 1);
    assert_eq!(reply.cookies[0].name, "SERVERID");
}

// ── Actions ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_start_transaction_carries_identifiers() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/ajax"))
        .and(body_string_contains("StartTransaction"))
        .and(body_string_contains("ABC12DEF34"))
        .and(body_string_contains("9001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "result": true }])))
        .expect(1)
        .mount(&server)
        .await;

    let ids = StartIdentifiers {
        card_id: "ABC12DEF34".into(),
        customer_id: "9001".into(),
    };
    client
        .action(&session(), "1234", 1, PortalAction::StartTransaction, Some(&ids))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_business_rejection_is_not_retried() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/ajax"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "error": "Connector busy" }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = client
        .action(&session(), "1234", 1, PortalAction::StopTransaction, None)
        .await;
    match result {
        Err(Error::Rejected { message }) => assert_eq!(message, "Connector busy"),
        other => panic!("expected rejection, got: {other:?}"),
    }
}
