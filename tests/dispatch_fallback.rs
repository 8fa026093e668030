//! Dual-transport dispatch tests.
//!
//! A wiremock server stands in for the local REST backend and an in-test
//! scripted bridge stands in for the host shell. These tests verify:
//! - REST is preferred and its answers are final unless it soft-fails
//! - soft failures of idempotent operations fall back to the bridge
//! - non-idempotent operations never run twice
//! - the two send forms are chosen by transport

use async_trait::async_trait;
use autohomework::config::RestConfig;
use autohomework::dispatch::Dispatcher;
use autohomework::operation::{AttemptOutcome, TransportKind};
use autohomework::policy::ReadinessPolicy;
use autohomework::transport::channel::{BridgeSurface, bridge_channel};
use autohomework::transport::rest::RestTransport;
use autohomework::update::{UpdateStatus, check_for_update};
use autohomework::{
    BridgeError, BridgeMethod, FailureKind, HostBridge, Operation, TransportResolver,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Bridge that exposes every method and records what it was asked.
#[derive(Default)]
struct RecordingBridge {
    calls: Mutex<Vec<(BridgeMethod, Value)>>,
}

impl RecordingBridge {
    fn calls(&self) -> Vec<(BridgeMethod, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostBridge for RecordingBridge {
    fn exposes(&self, _method: BridgeMethod) -> bool {
        true
    }

    async fn invoke(&self, method: BridgeMethod, args: Value) -> Result<Value, BridgeError> {
        self.calls.lock().unwrap().push((method, args));
        Ok(match method {
            BridgeMethod::GetConfig => json!({"theme": "dark", "access_token": "from-bridge"}),
            _ => json!({"success": true}),
        })
    }
}

fn dispatcher(rest_base: Option<String>) -> Dispatcher {
    let resolver = TransportResolver::new(rest_base, ReadinessPolicy::default());
    Dispatcher::new(resolver, RestTransport::new(&RestConfig::default()).unwrap())
}

// ────────────────────────────────────────────────────────────────────────────
// Fallback decisions
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_config_soft_failure_falls_back_to_bridge() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
        .expect(1)
        .mount(&server)
        .await;

    let d = dispatcher(Some(server.uri()));
    let bridge = Arc::new(RecordingBridge::default());
    d.resolver().install_bridge(bridge.clone());

    let result = d.call(Operation::GetConfig, Value::Null).await;
    assert!(result.success, "unexpected failure: {result:?}");
    assert_eq!(result.str_field("theme"), Some("dark"));
    assert_eq!(d.fallback_count(), 1);
    assert_eq!(bridge.calls().len(), 1);
}

#[tokio::test]
async fn test_rest_rejection_is_final_and_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/config"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "error": "disk full"})),
        )
        .mount(&server)
        .await;

    let d = dispatcher(Some(server.uri()));
    let bridge = Arc::new(RecordingBridge::default());
    d.resolver().install_bridge(bridge.clone());

    let result = d.call(Operation::SaveConfig, json!({"theme": "light"})).await;
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("disk full"));
    assert_eq!(result.kind, Some(FailureKind::OperationRejected));
    assert!(bridge.calls().is_empty());
}

#[tokio::test]
async fn test_refused_connection_falls_back_and_is_traced() {
    let d = dispatcher(Some("http://127.0.0.1:9".to_owned()));
    d.resolver().install_bridge(Arc::new(RecordingBridge::default()));

    let (result, attempts) = d.call_with_trace(Operation::GetConfig, Value::Null).await;
    assert!(result.success);
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].transport, TransportKind::Rest);
    assert!(matches!(
        attempts[0].outcome,
        AttemptOutcome::TransportFailed {
            delivered: false,
            ..
        }
    ));
    assert_eq!(attempts[1].transport, TransportKind::Bridge);
    assert!(attempts[1].gated);
}

#[tokio::test]
async fn test_exit_falls_back_to_rest_without_bridge() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/exit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let d = dispatcher(Some(server.uri()));
    let started = Instant::now();
    let result = d.call(Operation::Exit, Value::Null).await;
    assert!(result.success);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_get_config_rejection_without_bridge_is_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "error": "settings file corrupt"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let policy = ReadinessPolicy {
        bridge_probe_window_ms: 100,
        ..ReadinessPolicy::default()
    };
    let resolver = TransportResolver::new(Some(server.uri()), policy);
    let d = Dispatcher::new(resolver, RestTransport::new(&RestConfig::default()).unwrap());

    let (result, attempts) = d.call_with_trace(Operation::GetConfig, Value::Null).await;
    assert_eq!(result.error.as_deref(), Some("settings file corrupt"));
    assert_eq!(result.kind, Some(FailureKind::OperationRejected));
    assert_eq!(attempts[0].outcome, AttemptOutcome::SoftFailure);
    assert_eq!(attempts[1].outcome, AttemptOutcome::Skipped);
}

#[tokio::test]
async fn test_get_config_rejection_without_token_still_asks_bridge() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "error": "settings not loaded"})),
        )
        .mount(&server)
        .await;

    let d = dispatcher(Some(server.uri()));
    d.resolver().install_bridge(Arc::new(RecordingBridge::default()));

    let result = d.call(Operation::GetConfig, Value::Null).await;
    assert!(result.success);
    assert_eq!(result.str_field("access_token"), Some("from-bridge"));
    assert_eq!(d.fallback_count(), 1);
}

// ────────────────────────────────────────────────────────────────────────────
// Window controls and autostart
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_window_minimize_goes_to_bridge_first() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/window/minimize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(0)
        .mount(&server)
        .await;

    let d = dispatcher(Some(server.uri()));
    let bridge = Arc::new(RecordingBridge::default());
    d.resolver().install_bridge(bridge.clone());

    let result = d.call(Operation::WindowMinimize, Value::Null).await;
    assert!(result.success);
    assert_eq!(bridge.calls(), vec![(BridgeMethod::Minimize, Value::Null)]);
}

#[tokio::test]
async fn test_window_close_uses_rest_without_bridge() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/window/close"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let d = dispatcher(Some(server.uri()));
    let started = Instant::now();
    let result = d.call(Operation::WindowClose, Value::Null).await;
    assert!(result.success);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_autostart_status_and_apply_over_rest() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/autostart/status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ui_autostart": true, "ui_path": "/opt/autohomework"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/autostart/apply"))
        .and(body_json(json!({"auto_start_ui": false})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true, "ui_autostart": true})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let d = dispatcher(Some(server.uri()));
    let status = d.call(Operation::AutostartStatus, Value::Null).await;
    assert!(status.success);
    assert_eq!(status.str_field("ui_path"), Some("/opt/autohomework"));

    let applied = d
        .call(Operation::AutostartApply, json!({"auto_start_ui": false}))
        .await;
    assert!(applied.success);
}

// ────────────────────────────────────────────────────────────────────────────
// Send forms
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_inline_send_failure_is_not_repeated_on_bridge() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/send_content"))
        .and(body_json(json!({"content": "# Week 3"})))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"error": "webhook rejected"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let d = dispatcher(Some(server.uri()));
    let bridge = Arc::new(RecordingBridge::default());
    d.resolver().install_bridge(bridge.clone());

    let result = d.send_content("# Week 3", Some("/d/week3.pptx")).await;
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("webhook rejected"));
    assert!(bridge.calls().is_empty());
}

#[tokio::test]
async fn test_missing_inline_route_sends_by_reference() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/send_homework"))
        .and(body_json(json!({"file_path": "/d/week3.pptx"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let d = dispatcher(Some(server.uri()));
    let result = d.send_content("# Week 3", Some("/d/week3.pptx")).await;
    assert!(result.success, "unexpected failure: {result:?}");
}

#[tokio::test]
async fn test_unreachable_rest_sends_path_over_bridge() {
    let d = dispatcher(Some("http://127.0.0.1:9".to_owned()));
    let bridge = Arc::new(RecordingBridge::default());
    d.resolver().install_bridge(bridge.clone());

    let result = d.send_content("# Week 3", Some("/d/week3.pptx")).await;
    assert!(result.success);
    assert_eq!(
        bridge.calls(),
        vec![(
            BridgeMethod::SendHomework,
            json!({"file_path": "/d/week3.pptx"})
        )]
    );
}

// ────────────────────────────────────────────────────────────────────────────
// Update check and channel bridge
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_forced_update_check_reports_newer_release() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/update/check"))
        .and(query_param("force", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "latest": "v1.2.0",
            "download": "https://example.com/releases",
            "mirrors": ["https://mirror.example.com/releases"],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let d = dispatcher(Some(server.uri()));
    let status = check_for_update(&d, "1.1.9", true).await.unwrap();
    assert_eq!(
        status,
        UpdateStatus::Available {
            latest: "1.2.0".into(),
            url: Some("https://mirror.example.com/releases".into()),
        }
    );
}

#[tokio::test]
async fn test_update_check_equal_version_is_up_to_date() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/update/check"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "latest": "1.1.9"})),
        )
        .mount(&server)
        .await;

    let d = dispatcher(Some(server.uri()));
    let status = check_for_update(&d, "1.1.9", false).await.unwrap();
    assert!(matches!(status, UpdateStatus::UpToDate { .. }));
}

#[tokio::test]
async fn test_channel_bridge_serves_method_exposed_late() {
    let surface = BridgeSurface::default();
    let (bridge, server) = bridge_channel(8, surface.clone(), |method: BridgeMethod, _args: &Value| {
        match method {
            BridgeMethod::GetConfig => Ok(json!({"theme": "dark"})),
            _ => Err("unsupported".to_owned()),
        }
    });
    tokio::spawn(server.run());

    let d = dispatcher(None);
    d.resolver().install_bridge(Arc::new(bridge));
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        surface.expose(BridgeMethod::GetConfig);
    });

    let started = Instant::now();
    let result = d.call(Operation::GetConfig, Value::Null).await;
    assert!(result.success, "unexpected failure: {result:?}");
    assert_eq!(result.data, Some(json!({"theme": "dark"})));
    assert!(started.elapsed() < Duration::from_secs(2));
}
