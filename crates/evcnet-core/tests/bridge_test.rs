#![allow(clippy::unwrap_used)]
// Integration tests for `Bridge` over a scripted in-memory portal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use url::Url;

use evcnet_api::{Error, PortalRequest, PortalResponse, SessionCookie, Transport};
use evcnet_core::{
    Action, ActionOverrides, AuthState, Bridge, BridgeConfig, ChargerState, CoreError, Credentials,
    ErrorKind, IdentifierKind, KeyValueStore, MemoryStore, RetryPolicy, keys,
};

const CHARGING: &str = "0000000000010000";
const AVAILABLE: &str = "0000000000000000";

// ── Scripted portal ─────────────────────────────────────────────────

#[derive(Default)]
struct PortalState {
    /// Session id the portal currently accepts.
    live_session: Option<String>,
    reject_every_session: bool,
    /// Answer logins with the login page again, as for a wrong password.
    reject_logins: bool,
    logins: usize,
    /// Sticky backend cookie set on overview replies.
    server_id: Option<String>,
    last_cookie: Option<String>,
    calls: HashMap<String, usize>,
    login_delay: Duration,
    overview_delay: Duration,
    overview_failure: Option<u16>,
    channels: u8,
    status: String,
    card_id: Option<String>,
    customer_id: Option<String>,
    log_rows: Vec<Value>,
    refuse_commands: Option<String>,
    last_action: Option<Value>,
}

#[derive(Clone)]
struct FakePortal {
    state: Arc<Mutex<PortalState>>,
}

impl FakePortal {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PortalState {
                channels: 1,
                status: CHARGING.into(),
                ..PortalState::default()
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut PortalState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    fn logins(&self) -> usize {
        self.with(|s| s.logins)
    }

    fn calls(&self, method: &str) -> usize {
        self.with(|s| s.calls.get(method).copied().unwrap_or(0))
    }

    fn last_cookie(&self) -> Option<String> {
        self.with(|s| s.last_cookie.clone())
    }

    fn respond(&self, request: &PortalRequest) -> (PortalResponse, Duration) {
        let mut state = self.state.lock().unwrap();
        match request.path.as_str() {
            "/Login/Login" => {
                state.logins += 1;
                if state.reject_logins {
                    return (html_login_page(), state.login_delay);
                }
                let id = format!("sess-{}", state.logins);
                state.live_session = Some(id.clone());
                let resp = PortalResponse {
                    status: 302,
                    cookies: vec![SessionCookie::new("PHPSESSID", id)],
                    ..PortalResponse::default()
                };
                (resp, state.login_delay)
            }
            "/api/ajax" => {
                let cookie = request
                    .cookie
                    .as_ref()
                    .map(|c| c.expose_secret().to_string())
                    .unwrap_or_default();
                state.last_cookie = Some(cookie.clone());
                let accepted = !state.reject_every_session
                    && state
                        .live_session
                        .as_ref()
                        .is_some_and(|id| cookie.contains(&format!("PHPSESSID={id}")));
                if !accepted {
                    return (html_login_page(), Duration::ZERO);
                }

                let form = request
                    .form
                    .iter()
                    .find(|(name, _)| name == "requests")
                    .map(|(_, value)| value.clone())
                    .unwrap();
                let call: Value = serde_json::from_str(&form).unwrap();
                let method = call["0"]["method"].as_str().unwrap().to_string();
                let params = call["0"]["params"].clone();
                *state.calls.entry(method.clone()).or_default() += 1;
                state.answer(&method, params)
            }
            other => panic!("unexpected path {other}"),
        }
    }
}

impl PortalState {
    fn answer(&mut self, method: &str, params: Value) -> (PortalResponse, Duration) {
        let body = match method {
            "networkOverview" => json!([[{
                "IDX": 1234,
                "NAME": "Driveway",
                "CHANNEL": self.channels.to_string(),
            }]]),
            "overview" => {
                if let Some(status) = self.overview_failure {
                    return (
                        PortalResponse {
                            status,
                            ..PortalResponse::default()
                        },
                        Duration::ZERO,
                    );
                }
                let rows: Vec<Value> = (1..=self.channels)
                    .map(|channel| {
                        json!({
                            "CHANNEL": channel.to_string(),
                            "STATUS": self.status,
                            "MOM_POWER_KW": "7,4",
                            "TRANS_ENERGY_DELIVERED_KWH": "12,5",
                            "TRANSACTION_TIME_H_M": "1:30",
                            "CARDID": self.card_id,
                            "CUSTOMERS_IDX": self.customer_id,
                        })
                    })
                    .collect();
                let mut resp = json_response(json!([rows]));
                if let Some(id) = &self.server_id {
                    resp.cookies.push(SessionCookie::new("SERVERID", id.clone()));
                }
                return (resp, self.overview_delay);
            }
            "totalUsage" => json!([{ "number": "1.234,5", "unit": "kWh" }]),
            "log" => json!([self.log_rows]),
            "action" => {
                self.last_action = Some(params.clone());
                if let Some(reason) = &self.refuse_commands {
                    json!([{ "error": reason }])
                } else {
                    match params["action"].as_str() {
                        Some("StartTransaction") => self.status = CHARGING.into(),
                        Some("StopTransaction") => self.status = AVAILABLE.into(),
                        _ => {}
                    }
                    json!([{ "message": "OK" }])
                }
            }
            other => panic!("unexpected ajax method {other}"),
        };
        (json_response(body), Duration::ZERO)
    }
}

impl Transport for FakePortal {
    async fn execute(&self, request: PortalRequest) -> Result<PortalResponse, Error> {
        let (response, delay) = self.respond(&request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(response)
    }
}

fn json_response(body: Value) -> PortalResponse {
    PortalResponse {
        status: 200,
        content_type: Some("application/json".into()),
        cookies: Vec::new(),
        body: body.to_string(),
    }
}

fn html_login_page() -> PortalResponse {
    PortalResponse {
        status: 200,
        content_type: Some("text/html".into()),
        cookies: Vec::new(),
        body: "<!DOCTYPE html><html><form action=\"/Login/Login\"></form></html>".into(),
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn base_url() -> Url {
    Url::parse("https://portal.test").unwrap()
}

fn config() -> BridgeConfig {
    let mut config = BridgeConfig::new(
        base_url(),
        Credentials::new("owner@example.com", SecretString::from("hunter2".to_string())),
    );
    config.retry = RetryPolicy::none();
    config
}

fn bridge(portal: &FakePortal, config: BridgeConfig) -> (Bridge<FakePortal>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let bridge = Bridge::with_transport(config, portal.clone(), store.clone()).unwrap();
    (bridge, store)
}

// ── Polling ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_poll_normalizes_status() {
    let portal = FakePortal::new();
    let (bridge, _) = bridge(&portal, config());
    assert!(bridge.status(1).is_unknown());

    let polls = bridge.trigger_poll(None).await.unwrap();
    assert_eq!(polls.len(), 1);
    assert!(polls[0].is_ok());

    let status = bridge.status(1).known().cloned().unwrap();
    assert_eq!(status.state, ChargerState::Charging);
    assert_eq!(status.spot_id, "1234");
    assert_eq!(status.power_kw, Some(7.4));
    assert_eq!(status.session_energy_kwh, Some(12.5));
    assert_eq!(status.session_hours, Some(1.5));
    assert_eq!(status.total_energy_kwh, Some(1234.5));
    assert_eq!(bridge.spot().unwrap().name.as_deref(), Some("Driveway"));
    assert_eq!(bridge.auth_state(), AuthState::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_polls_share_one_fetch() {
    let portal = FakePortal::new();
    portal.with(|s| s.overview_delay = Duration::from_millis(200));
    let (bridge, _) = bridge(&portal, config());

    let (a, b) = tokio::join!(bridge.trigger_poll(Some(1)), bridge.trigger_poll(Some(1)));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(portal.calls("overview"), 1);
    assert_eq!(portal.calls("log"), 1);
    assert_eq!(portal.calls("networkOverview"), 1);
    assert_eq!(portal.logins(), 1);
    assert_eq!(
        a[0].status.as_ref().unwrap().fetched_at,
        b[0].status.as_ref().unwrap().fetched_at
    );

    // A later poll fetches again.
    bridge.trigger_poll(Some(1)).await.unwrap();
    assert_eq!(portal.calls("overview"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_polling_every_channel_logs_in_once() {
    let portal = FakePortal::new();
    portal.with(|s| {
        s.channels = 2;
        s.login_delay = Duration::from_millis(100);
    });
    let mut config = config();
    config.max_channels = 2;
    let (bridge, _) = bridge(&portal, config);

    let polls = bridge.trigger_poll(None).await.unwrap();
    assert_eq!(polls.len(), 2);
    assert!(polls.iter().all(|p| p.is_ok()));
    assert_eq!(portal.logins(), 1);
    assert!(bridge.status(2).known().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_failed_login_is_shared_by_waiting_refreshes() {
    let portal = FakePortal::new();
    portal.with(|s| {
        s.channels = 2;
        s.reject_logins = true;
        s.login_delay = Duration::from_millis(100);
    });
    let mut config = config();
    config.max_channels = 2;
    let (bridge, _) = bridge(&portal, config);

    let polls = bridge.trigger_poll(None).await.unwrap();
    assert_eq!(polls.len(), 2);
    for poll in &polls {
        assert_eq!(poll.status.as_ref().unwrap_err().kind(), ErrorKind::Auth);
        assert_eq!(poll.log.as_ref().unwrap_err().kind(), ErrorKind::Auth);
    }
    assert_eq!(portal.logins(), 1);
    assert_eq!(bridge.auth_state(), AuthState::Unauthenticated);

    // Two overlapping polls of one channel also cost a single login.
    let (a, b) = tokio::join!(bridge.trigger_poll(Some(1)), bridge.trigger_poll(Some(1)));
    assert!(!a.unwrap()[0].is_ok());
    assert!(!b.unwrap()[0].is_ok());
    assert_eq!(portal.logins(), 2);

    // Once the password is right again, the next poll logs in.
    portal.with(|s| s.reject_logins = false);
    let polls = bridge.trigger_poll(None).await.unwrap();
    assert!(polls.iter().all(|p| p.is_ok()));
    assert_eq!(portal.logins(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_poll_failure_keeps_last_good_status() {
    let portal = FakePortal::new();
    let (bridge, _) = bridge(&portal, config());
    bridge.trigger_poll(Some(1)).await.unwrap();
    let before = bridge.status(1).known().cloned().unwrap();

    portal.with(|s| s.overview_failure = Some(503));
    let polls = bridge.trigger_poll(Some(1)).await.unwrap();
    let err = polls[0].status.as_ref().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(err.is_retriable());

    assert_eq!(bridge.status(1).known().unwrap(), &before);
    assert_eq!(bridge.last_error(1).unwrap().kind(), ErrorKind::Transport);

    portal.with(|s| s.overview_failure = None);
    bridge.trigger_poll(Some(1)).await.unwrap();
    assert!(bridge.last_error(1).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_channel_is_rejected() {
    let portal = FakePortal::new();
    let (bridge, _) = bridge(&portal, config());

    let err = bridge.trigger_poll(Some(2)).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidChannel { channel: 2, max: 1 }));
    assert!(bridge.status(2).is_unknown());
    assert!(bridge.status(0).is_unknown());
    assert_eq!(portal.logins(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_log_summary_is_newest_first_and_limited() {
    let portal = FakePortal::new();
    portal.with(|s| {
        s.log_rows = (1..=7)
            .map(|day| {
                json!({
                    "START_DATE": format!("2024-03-0{day} 18:00:00"),
                    "END_DATE": format!("2024-03-0{day} 20:30:00"),
                    "ENERGY": format!("{day},5"),
                    "DURATION": "2:30",
                    "CARDID": "ABC12DEF34",
                })
            })
            .rev()
            .collect();
        s.log_rows.swap(0, 3);
    });
    let (bridge, _) = bridge(&portal, config());

    bridge.trigger_poll(Some(1)).await.unwrap();
    let log = bridge.log(1).unwrap();

    assert_eq!(log.entries.len(), 5);
    let starts: Vec<&str> = log.entries.iter().map(|e| e.started.as_str()).collect();
    assert_eq!(
        starts,
        vec![
            "2024-03-07 18:00:00",
            "2024-03-06 18:00:00",
            "2024-03-05 18:00:00",
            "2024-03-04 18:00:00",
            "2024-03-03 18:00:00",
        ]
    );
    assert_eq!(log.entries[0].energy_kwh, Some(7.5));
    assert_eq!(log.entries[0].duration_hours, Some(2.5));
    assert!(log.table.contains("Energy (kWh)"));
    assert!(log.table.contains("ABC12DEF34"));
}

// ── Session handling ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_expired_session_relogs_once() {
    let portal = FakePortal::new();
    let (bridge, store) = bridge(&portal, config());
    bridge.trigger_poll(Some(1)).await.unwrap();
    assert_eq!(portal.logins(), 1);

    // Portal drops the session server-side.
    portal.with(|s| s.live_session = None);
    let outcome = bridge.trigger_action(Action::RefreshStatus, 1, &ActionOverrides::default()).await;

    assert!(outcome.is_ok());
    assert_eq!(portal.logins(), 2);
    assert_eq!(
        store.get(keys::SESSION_COOKIE).unwrap().as_deref(),
        Some("PHPSESSID=sess-2")
    );
}

#[tokio::test(start_paused = true)]
async fn test_second_rejection_is_auth_error() {
    let portal = FakePortal::new();
    portal.with(|s| s.reject_every_session = true);
    let (bridge, _) = bridge(&portal, config());

    let err = bridge
        .trigger_action(Action::RefreshStatus, 1, &ActionOverrides::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Auth);
    assert_eq!(portal.logins(), 2);
    assert_eq!(bridge.auth_state(), AuthState::Unauthenticated);
    assert!(bridge.take_command_error(1).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_persisted_cookie_skips_login() {
    let portal = FakePortal::new();
    portal.with(|s| s.live_session = Some("persisted".into()));
    let store = Arc::new(MemoryStore::with_entries([
        (keys::SESSION_COOKIE, "PHPSESSID=persisted"),
        (keys::EMAIL, "Owner@Example.com"),
        (keys::BASE_URL, base_url().as_str()),
    ]));
    let bridge = Bridge::with_transport(config(), portal.clone(), store).unwrap();
    assert_eq!(bridge.auth_state(), AuthState::Authenticated);

    bridge.trigger_poll(Some(1)).await.unwrap();
    assert_eq!(portal.logins(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_persisted_cookie_of_other_account_is_ignored() {
    let portal = FakePortal::new();
    portal.with(|s| s.live_session = Some("persisted".into()));
    let store = Arc::new(MemoryStore::with_entries([
        (keys::SESSION_COOKIE, "PHPSESSID=persisted"),
        (keys::EMAIL, "someone-else@example.com"),
        (keys::BASE_URL, base_url().as_str()),
    ]));
    let bridge = Bridge::with_transport(config(), portal.clone(), store).unwrap();
    assert_eq!(bridge.auth_state(), AuthState::Unauthenticated);

    bridge.trigger_poll(Some(1)).await.unwrap();
    assert_eq!(portal.logins(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_server_cookie_is_persisted_and_reused() {
    let portal = FakePortal::new();
    portal.with(|s| s.server_id = Some("node-2".into()));
    let (bridge, store) = bridge(&portal, config());

    bridge.trigger_poll(Some(1)).await.unwrap();
    assert_eq!(
        store.get(keys::SESSION_COOKIE).unwrap().as_deref(),
        Some("PHPSESSID=sess-1; SERVERID=node-2")
    );

    bridge
        .trigger_action(Action::Block, 1, &ActionOverrides::default())
        .await
        .unwrap();
    assert_eq!(
        portal.last_cookie().as_deref(),
        Some("PHPSESSID=sess-1; SERVERID=node-2")
    );

    // A restarted bridge on the same store keeps the backend cookie.
    portal.with(|s| s.server_id = None);
    let restarted = Bridge::with_transport(config(), portal.clone(), store).unwrap();
    restarted.trigger_poll(Some(1)).await.unwrap();
    assert_eq!(portal.logins(), 1);
    assert_eq!(
        portal.last_cookie().as_deref(),
        Some("PHPSESSID=sess-1; SERVERID=node-2")
    );
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_start_needs_card_id_until_detected() {
    let portal = FakePortal::new();
    portal.with(|s| s.status = AVAILABLE.into());
    let (bridge, store) = bridge(&portal, config());

    let err = bridge
        .trigger_action(Action::Start, 1, &ActionOverrides::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::MissingIdentifier {
            identifier: IdentifierKind::Card
        }
    ));
    assert_eq!(portal.calls("action"), 0);

    portal.with(|s| {
        s.card_id = Some("ABC12DEF34".into());
        s.customer_id = Some("998877".into());
    });
    bridge.trigger_poll(Some(1)).await.unwrap();
    assert_eq!(
        store.get(keys::CARD_ID).unwrap().as_deref(),
        Some("ABC12DEF34")
    );

    let ack = bridge
        .trigger_action(Action::Start, 1, &ActionOverrides::default())
        .await
        .unwrap();
    assert_eq!(ack.message.as_deref(), Some("OK"));
    assert!(ack.status.unwrap().is_charging());

    let sent = portal.with(|s| s.last_action.clone()).unwrap();
    assert_eq!(sent["action"], "StartTransaction");
    assert_eq!(sent["card"], "ABC12DEF34");
    assert_eq!(sent["customer"], "998877");
    assert_eq!(sent["channel"], "1");
}

#[tokio::test(start_paused = true)]
async fn test_start_prefers_override_then_configured() {
    let portal = FakePortal::new();
    portal.with(|s| {
        s.card_id = Some("DETECTED".into());
        s.customer_id = Some("111".into());
    });
    let mut config = config();
    config.card_id = Some("CONFIGURED".into());
    let (bridge, _) = bridge(&portal, config);
    bridge.trigger_poll(Some(1)).await.unwrap();

    let overrides = ActionOverrides {
        card_id: None,
        customer_id: Some("222".into()),
    };
    bridge.trigger_action(Action::Start, 1, &overrides).await.unwrap();

    let sent = portal.with(|s| s.last_action.clone()).unwrap();
    assert_eq!(sent["card"], "CONFIGURED");
    assert_eq!(sent["customer"], "222");
}

#[tokio::test(start_paused = true)]
async fn test_restored_identifiers_are_used() {
    let portal = FakePortal::new();
    let store = Arc::new(MemoryStore::with_entries([
        (keys::CARD_ID, "ABC12DEF34"),
        (keys::CUSTOMER_ID, "998877"),
    ]));
    let bridge = Bridge::with_transport(config(), portal.clone(), store).unwrap();

    assert_eq!(
        bridge.resolved_identifier(IdentifierKind::Card).as_deref(),
        Some("ABC12DEF34")
    );
    bridge
        .trigger_action(Action::Start, 1, &ActionOverrides::default())
        .await
        .unwrap();
    assert_eq!(portal.calls("action"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_command_refreshes_status() {
    let portal = FakePortal::new();
    let (bridge, _) = bridge(&portal, config());
    bridge.trigger_poll(Some(1)).await.unwrap();
    assert!(bridge.status(1).known().unwrap().is_charging());

    portal.with(|s| {
        s.refuse_commands = Some("Connector busy".into());
        s.status = AVAILABLE.into();
    });
    let err = bridge
        .trigger_action(Action::Stop, 1, &ActionOverrides::default())
        .await
        .unwrap_err();

    match &err {
        CoreError::Command { action, reason } => {
            assert_eq!(action, "stop");
            assert_eq!(reason, "Connector busy");
        }
        other => panic!("expected a command error, got {other:?}"),
    }
    assert_eq!(portal.calls("action"), 1);
    assert_eq!(portal.calls("overview"), 2);
    assert_eq!(bridge.status(1).known().unwrap().state, ChargerState::Available);

    assert!(bridge.take_command_error(1).unwrap().contains("Connector busy"));
    assert!(bridge.take_command_error(1).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stop_waits_before_refreshing() {
    let portal = FakePortal::new();
    let (bridge, _) = bridge(&portal, config());
    bridge.trigger_poll(Some(1)).await.unwrap();

    let started = tokio::time::Instant::now();
    let ack = bridge
        .trigger_action(Action::Stop, 1, &ActionOverrides::default())
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_eq!(ack.status.unwrap().state, ChargerState::Available);
    let sent = portal.with(|s| s.last_action.clone()).unwrap();
    assert!(sent.get("card").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reset_does_not_wait() {
    let portal = FakePortal::new();
    let (bridge, _) = bridge(&portal, config());

    let started = tokio::time::Instant::now();
    bridge
        .trigger_action(Action::SoftReset, 1, &ActionOverrides::default())
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
    let sent = portal.with(|s| s.last_action.clone()).unwrap();
    assert_eq!(sent["action"], "SoftReset");
}

#[tokio::test(start_paused = true)]
async fn test_command_refresh_does_not_reuse_an_earlier_poll() {
    let portal = FakePortal::new();
    portal.with(|s| s.status = AVAILABLE.into());
    let mut config = config();
    config.settle_delay = Duration::ZERO;
    let (bridge, _) = bridge(&portal, config);
    bridge.trigger_poll(Some(1)).await.unwrap();

    // A poll whose overview was answered before the start, still in flight.
    portal.with(|s| s.overview_delay = Duration::from_millis(200));
    let overrides = ActionOverrides {
        card_id: Some("ABC12DEF34".into()),
        customer_id: Some("998877".into()),
    };
    let (poll, ack) = tokio::join!(bridge.trigger_poll(Some(1)), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        bridge.trigger_action(Action::Start, 1, &overrides).await
    });

    let polled = poll.unwrap()[0].status.clone().unwrap();
    assert_eq!(polled.state, ChargerState::Available);
    assert!(ack.unwrap().status.unwrap().is_charging());
    assert_eq!(portal.calls("overview"), 3);
    assert!(bridge.status(1).known().unwrap().is_charging());
}
