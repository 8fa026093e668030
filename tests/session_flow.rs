//! Client-level flow tests: select-and-preview exclusion, confirm-send,
//! settings round trip, and the scheduler monitor.

use async_trait::async_trait;
use autohomework::config::{ClientConfig, HomeworkSettings};
use autohomework::scheduler::CHECK_FAILED_LINE;
use autohomework::{
    BridgeError, BridgeMethod, Client, FlowOutcome, HostBridge, Preview, UiSink,
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// UI sink that records every event as a line of text.
#[derive(Default)]
struct RecordingUi {
    events: Mutex<Vec<String>>,
    statuses: Mutex<Vec<String>>,
}

impl RecordingUi {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }
}

impl UiSink for RecordingUi {
    fn show_error(&self, message: &str) {
        self.push(format!("error: {message}"));
    }

    fn show_success(&self, message: &str) {
        self.push(format!("success: {message}"));
    }

    fn show_preview(&self, preview: &Preview) {
        self.push(format!("preview: {}", preview.file_name));
    }

    fn update_status(&self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_owned());
    }

    fn update_scheduler(&self, line: &str) {
        self.push(format!("scheduler: {line}"));
    }
}

fn rest_client(server: &MockServer, ui: Arc<RecordingUi>) -> Client {
    let mut config = ClientConfig::default();
    config.rest.base_url = server.uri();
    Client::new(config, ui).unwrap()
}

fn bridge_only_client(ui: Arc<RecordingUi>) -> Client {
    let mut config = ClientConfig::default();
    config.rest.base_url = String::new();
    Client::new(config, ui).unwrap()
}

// ────────────────────────────────────────────────────────────────────────────
// Select and preview
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reentrant_select_and_preview_is_a_no_op() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "t", "ppt_file_path": "/d/week3.pptx"}))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/preview_homework"))
        .and(body_json(json!({"file_path": "/d/week3.pptx"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "content": "# Week 3",
            "file_name": "week3.pptx",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ui = Arc::new(RecordingUi::default());
    let client = rest_client(&server, Arc::clone(&ui));
    let session = client.session();

    let (first, second) = tokio::join!(session.select_and_preview(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.select_and_preview().await
    });

    assert!(matches!(first, FlowOutcome::Previewed(ref p) if p.content == "# Week 3"));
    assert_eq!(second, FlowOutcome::Skipped);
    assert!(!session.is_busy());
    assert_eq!(ui.events(), vec!["preview: week3.pptx".to_owned()]);
}

#[tokio::test]
async fn test_failed_saved_preview_falls_back_to_dialog() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "t", "ppt_file_path": "/d/gone.pptx"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/preview_homework"))
        .and(body_json(json!({"file_path": "/d/gone.pptx"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "error": "file not found"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/select_ppt_file"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true, "file_path": "/d/new.pptx"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/preview_homework"))
        .and(body_json(json!({"file_path": "/d/new.pptx"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "content": "# New"})),
        )
        .mount(&server)
        .await;

    let ui = Arc::new(RecordingUi::default());
    let client = rest_client(&server, Arc::clone(&ui));

    let FlowOutcome::Previewed(preview) = client.session().select_and_preview().await else {
        panic!("expected a preview");
    };
    assert_eq!(preview.file_name, "new.pptx");
    assert_eq!(
        ui.events(),
        vec![
            "error: Failed to parse slide deck: file not found".to_owned(),
            "preview: new.pptx".to_owned(),
        ]
    );
}

#[tokio::test]
async fn test_confirm_send_posts_inline_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "t", "ppt_file_path": "/d/week3.pptx"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/preview_homework"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "content": "# W3"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/send_content"))
        .and(body_json(json!({"content": "# W3"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let ui = Arc::new(RecordingUi::default());
    let client = rest_client(&server, Arc::clone(&ui));
    client.session().select_and_preview().await;

    let result = client.session().confirm_send().await;
    assert!(result.success);
    assert!(client.session().current_preview().is_none());
    assert!(ui.events().contains(&"success: Sent successfully".to_owned()));
}

#[tokio::test(start_paused = true)]
async fn test_no_transport_reports_not_ready() {
    let ui = Arc::new(RecordingUi::default());
    let client = bridge_only_client(Arc::clone(&ui));

    assert_eq!(client.session().select_and_preview().await, FlowOutcome::NotReady);
    assert_eq!(ui.events().len(), 1);
    assert!(ui.events()[0].starts_with("error: "));
}

// ────────────────────────────────────────────────────────────────────────────
// Settings
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_save_settings_strips_webhook_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/config"))
        .and(body_partial_json(json!({
            "access_token": "abc123",
            "weekday_send_time": "06:30",
            "auto_send_time": "06:30",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/autostart/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ui_autostart": true})))
        .expect(1)
        .mount(&server)
        .await;

    let ui = Arc::new(RecordingUi::default());
    let client = rest_client(&server, Arc::clone(&ui));
    let settings = HomeworkSettings {
        access_token: "https://oapi.dingtalk.com/robot/send?access_token=abc123".into(),
        weekday_send_time: Some("06:30".into()),
        ..HomeworkSettings::default()
    };

    assert!(client.session().save_settings(&settings).await.success);
    assert_eq!(ui.statuses(), vec!["Start at login: enabled".to_owned()]);
}

#[tokio::test]
async fn test_apply_autostart_reports_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/autostart/apply"))
        .and(body_json(json!({"auto_start_ui": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "error": "registry access denied"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let ui = Arc::new(RecordingUi::default());
    let client = rest_client(&server, Arc::clone(&ui));

    let result = client
        .session()
        .apply_autostart(&HomeworkSettings::default())
        .await;
    assert_eq!(result.error.as_deref(), Some("registry access denied"));
    assert_eq!(
        ui.events(),
        vec!["error: Failed to update start at login: registry access denied".to_owned()]
    );
}

// ────────────────────────────────────────────────────────────────────────────
// Scheduler monitor over the bridge
// ────────────────────────────────────────────────────────────────────────────

/// Bridge whose scheduler status fails on the first call only.
#[derive(Default)]
struct FlakySchedulerBridge {
    calls: AtomicUsize,
}

#[async_trait]
impl HostBridge for FlakySchedulerBridge {
    fn exposes(&self, method: BridgeMethod) -> bool {
        method == BridgeMethod::GetSchedulerStatus
    }

    async fn invoke(&self, _method: BridgeMethod, _args: Value) -> Result<Value, BridgeError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(BridgeError::Call("scheduler busy".into()));
        }
        Ok(json!({"auto_send_enabled": false, "scheduler_running": false}))
    }
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_monitor_retries_then_polls() {
    let ui = Arc::new(RecordingUi::default());
    let client = bridge_only_client(Arc::clone(&ui));
    let bridge = Arc::new(FlakySchedulerBridge::default());
    client.install_bridge(bridge.clone());

    let monitor = client.spawn_scheduler_monitor();

    // First check fails, retry after 2 s succeeds.
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(
        ui.events(),
        vec![
            format!("scheduler: {CHECK_FAILED_LINE}"),
            "scheduler: Auto-send disabled".to_owned(),
        ]
    );

    // Next regular check 30 s later.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(bridge.calls.load(Ordering::SeqCst), 3);

    monitor.stop().await;
}
