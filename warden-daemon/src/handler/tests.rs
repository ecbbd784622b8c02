use super::*;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use warden_protocol::protocol::{ProcessState, StatusInfo};

use crate::supervisor::{HostProcess, ProcessScanner, SupervisorConfig};

/// Host with no matching processes
struct EmptyHost;

impl ProcessScanner for EmptyHost {
    fn find_by_executable(&self, _executable: &str) -> Vec<HostProcess> {
        Vec::new()
    }

    fn inspect(&self, _pid: u32) -> Option<HostProcess> {
        None
    }
}

fn context(dir: &TempDir) -> Context {
    let mut config = SupervisorConfig::new(dir.path(), "zbproxy");
    config.launch_grace = Duration::from_millis(200);
    config.restart_settle = Duration::from_millis(10);
    Context::new(
        ConfigStore::new(dir.path().join("ZBProxy.json")),
        Supervisor::with_scanner(config, Arc::new(EmptyHost)),
        LogFiles::new(dir.path()),
    )
}

fn write_config(dir: &TempDir, document: Value) {
    std::fs::write(
        dir.path().join("ZBProxy.json"),
        serde_json::to_string_pretty(&document).unwrap(),
    )
    .unwrap();
}

async fn handle(ctx: &Context, request: Request) -> Response {
    let (tx, _rx) = mpsc::channel(1);
    handle_request(request, ctx, tx).await
}

fn error_kind(response: &Response) -> ErrorKind {
    match response {
        Response::Error { kind, .. } => *kind,
        other => panic!("Expected error, got {:?}", other),
    }
}

fn ok_data(response: Response) -> ResponseData {
    match response {
        Response::Ok { data: Some(data), .. } => data,
        other => panic!("Expected data, got {:?}", other),
    }
}

// ============================================================================
// Config requests
// ============================================================================

#[tokio::test]
async fn get_config_without_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    let response = handle(&ctx, Request::GetConfig).await;
    assert_eq!(error_kind(&response), ErrorKind::NotFound);
}

#[tokio::test]
async fn get_config_with_malformed_file_is_parse_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("ZBProxy.json"), "{\"Log\": ").unwrap();
    let ctx = context(&dir);

    let response = handle(&ctx, Request::GetConfig).await;
    assert_eq!(error_kind(&response), ErrorKind::ParseError);
}

#[tokio::test]
async fn set_then_get_value() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, json!({"Log": {"Level": "info"}, "Services": [{"Listen": 25565}]}));
    let ctx = context(&dir);

    let response = handle(
        &ctx,
        Request::SetValue {
            path: "Services.0.Listen".into(),
            value: json!(25566),
        },
    )
    .await;
    assert!(response.is_ok());

    let data = ok_data(
        handle(&ctx, Request::GetValue { path: "Services.0.Listen".into() }).await,
    );
    assert_eq!(data, ResponseData::Value(json!(25566)));

    let data = ok_data(handle(&ctx, Request::GetConfig).await);
    assert_eq!(
        data,
        ResponseData::Document(json!({"Log": {"Level": "info"}, "Services": [{"Listen": 25566}]}))
    );
}

#[tokio::test]
async fn path_errors_keep_their_kind() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, json!({"Services": [], "Log": "plain"}));
    let ctx = context(&dir);

    let missing = handle(&ctx, Request::GetValue { path: "Nope.Deeper".into() }).await;
    assert_eq!(error_kind(&missing), ErrorKind::PathNotFound);

    let index = handle(&ctx, Request::GetValue { path: "Services.0".into() }).await;
    assert_eq!(error_kind(&index), ErrorKind::InvalidIndex);

    let target = handle(
        &ctx,
        Request::SetValue {
            path: "Log.Level".into(),
            value: json!("debug"),
        },
    )
    .await;
    assert_eq!(error_kind(&target), ErrorKind::InvalidTarget);
}

#[tokio::test]
async fn replace_config_requires_an_object() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    let response = handle(&ctx, Request::ReplaceConfig { document: json!([1, 2]) }).await;
    assert_eq!(error_kind(&response), ErrorKind::InvalidRequest);
    assert!(!dir.path().join("ZBProxy.json").exists());

    let response = handle(&ctx, Request::ReplaceConfig { document: json!({"Log": {}}) }).await;
    assert!(response.is_ok());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("ZBProxy.json")).unwrap(),
        "{\n    \"Log\": {}\n}"
    );
}

#[tokio::test]
async fn service_and_outbound_requests() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, json!({}));
    let ctx = context(&dir);

    let add = Request::AddService { name: "lobby".into(), listen: 25565 };
    assert!(handle(&ctx, add.clone()).await.is_ok());
    assert_eq!(error_kind(&handle(&ctx, add).await), ErrorKind::DuplicateEntry);

    let add = Request::AddOutbound {
        name: "hypixel".into(),
        target_address: "mc.hypixel.net".into(),
        target_port: 25565,
    };
    assert!(handle(&ctx, add).await.is_ok());

    let data = ok_data(handle(&ctx, Request::GetValue { path: "Outbounds.0.Minecraft.OnlineCount.Max".into() }).await);
    assert_eq!(data, ResponseData::Value(json!(20)));

    assert!(handle(&ctx, Request::RemoveService { name: "lobby".into() }).await.is_ok());
    let gone = handle(&ctx, Request::RemoveService { name: "lobby".into() }).await;
    assert_eq!(error_kind(&gone), ErrorKind::NotFound);
    assert!(handle(&ctx, Request::RemoveOutbound { name: "hypixel".into() }).await.is_ok());
}

// ============================================================================
// Process requests
// ============================================================================

#[tokio::test]
async fn status_and_stop_when_idle() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    let data = ok_data(handle(&ctx, Request::Status).await);
    assert_eq!(data, ResponseData::Status(StatusInfo::stopped()));

    match handle(&ctx, Request::Stop).await {
        Response::Ok { message, data } => {
            assert_eq!(message.as_deref(), Some("Proxy was not running"));
            assert_eq!(data, Some(ResponseData::Stopped { pids: vec![] }));
        }
        other => panic!("Expected Ok, got {:?}", other),
    }
}

#[tokio::test]
async fn start_without_executable_is_not_found() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    let response = handle(&ctx, Request::Start).await;
    assert_eq!(error_kind(&response), ErrorKind::NotFound);
}

#[tokio::test]
async fn failed_restart_reports_stopped_pids() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    match handle(&ctx, Request::Restart).await {
        Response::Error { kind, data, .. } => {
            assert_eq!(kind, ErrorKind::NotFound);
            assert_eq!(data, Some(ResponseData::Stopped { pids: vec![] }));
        }
        other => panic!("Expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn start_status_stop_with_real_child() {
    let dir = TempDir::new().unwrap();
    let exe = dir.path().join("zbproxy");
    std::fs::write(&exe, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
    let ctx = context(&dir);

    let pid = match ok_data(handle(&ctx, Request::Start).await) {
        ResponseData::Started { pid } => pid,
        other => panic!("Expected Started, got {:?}", other),
    };

    match ok_data(handle(&ctx, Request::Status).await) {
        ResponseData::Status(status) => {
            assert_eq!(status.state, ProcessState::RunningOwned);
            assert_eq!(status.pid, Some(pid));
        }
        other => panic!("Expected Status, got {:?}", other),
    }

    let again = handle(&ctx, Request::Start).await;
    assert_eq!(error_kind(&again), ErrorKind::AlreadyRunning);

    let data = ok_data(handle(&ctx, Request::Stop).await);
    assert_eq!(data, ResponseData::Stopped { pids: vec![pid] });
}

#[tokio::test]
async fn fix_permissions_reports_modes() {
    let dir = TempDir::new().unwrap();
    let exe = dir.path().join("zbproxy");
    std::fs::write(&exe, "#!/bin/sh\n").unwrap();
    std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o644)).unwrap();
    let ctx = context(&dir);

    match ok_data(handle(&ctx, Request::FixPermissions).await) {
        ResponseData::Permissions(report) => {
            assert_eq!(report.old_mode, 0o644);
            assert_eq!(report.new_mode, 0o755);
        }
        other => panic!("Expected Permissions, got {:?}", other),
    }
}

#[tokio::test]
async fn shutdown_signals_the_server() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);
    let (tx, mut rx) = mpsc::channel(1);

    let response = handle_request(Request::Shutdown, &ctx, tx).await;
    assert!(response.is_ok());
    assert_eq!(rx.recv().await, Some(()));
}

// ============================================================================
// Log requests
// ============================================================================

#[tokio::test]
async fn log_requests() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("out.log"), "a\nb\nc\n").unwrap();
    let ctx = context(&dir);

    match ok_data(handle(&ctx, Request::TailLog { file: "out.log".into(), lines: Some(2) }).await) {
        ResponseData::Tail(tail) => assert_eq!(tail.lines, vec!["b", "c"]),
        other => panic!("Expected Tail, got {:?}", other),
    }

    let denied = handle(&ctx, Request::TailLog { file: "ZBProxy.json".into(), lines: None }).await;
    assert_eq!(error_kind(&denied), ErrorKind::NotAllowed);

    match ok_data(handle(&ctx, Request::Logs { lines: None }).await) {
        ResponseData::Logs(summaries) => {
            assert_eq!(summaries.len(), 4);
            assert_eq!(summaries[0].lines, vec!["a", "b", "c"]);
        }
        other => panic!("Expected Logs, got {:?}", other),
    }

    match ok_data(handle(&ctx, Request::ClearLogs).await) {
        ResponseData::Cleared(report) => assert_eq!(report.cleared, vec!["out.log"]),
        other => panic!("Expected Cleared, got {:?}", other),
    }
}
