//! CLI subprocess integration tests.
//!
//! These tests invoke the `cvsync` binary as a subprocess and verify exit
//! codes, stdout content, and JSON output against a scripted controller.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tiny_http::{Header, Response, Server, StatusCode};

fn cvsync_bin(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cvsync"));
    cmd.env("HOME", home)
        .env("CVSYNC_CONF", home.join("missing.json"))
        .env_remove("CVSYNC_LOG")
        .current_dir(home);
    cmd
}

/// Scripted controller serving a fixed JSON body per path.
struct FakeCvp {
    url: String,
    server: Arc<Server>,
    _handle: std::thread::JoinHandle<()>,
}

impl FakeCvp {
    fn start(routes: &[(&str, Value)]) -> Self {
        let mut table: HashMap<String, String> = routes
            .iter()
            .map(|(p, v)| ((*p).to_owned(), v.to_string()))
            .collect();
        table
            .entry("/cvpservice/login/authenticate.do".to_owned())
            .or_insert_with(|| json!({ "sessionId": "s1" }).to_string());

        let server = Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let srv = Arc::clone(&server);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                let full = request.url().to_owned();
                let path = full.split('?').next().unwrap_or_default();
                let response = match table.get(path) {
                    Some(body) => Response::from_string(body.clone()).with_header(
                        Header::from_bytes("Content-Type", "application/json")
                            .expect("valid header"),
                    ),
                    None => Response::from_string("not found").with_status_code(StatusCode(404)),
                };
                let _ = request.respond(response);
            }
        });
        Self {
            url: format!("http://127.0.0.1:{port}"),
            server,
            _handle: handle,
        }
    }

    fn write_config(&self, dir: &Path) -> PathBuf {
        let path = dir.join("cloudvision.json");
        let config = json!({
            "nodes": [self.url],
            "username": "cvpadmin",
            "password": "arista123",
            "request_timeout_secs": 5,
        });
        std::fs::write(&path, config.to_string()).unwrap();
        path
    }
}

impl Drop for FakeCvp {
    fn drop(&mut self) {
        self.server.unblock();
    }
}

fn e23_routes() -> Vec<(&'static str, Value)> {
    vec![
        (
            "/cvpservice/configlet/getConfigletByName.do",
            json!({ "key": "configlet_23", "name": "e23",
                    "config": "interface Eth23\n no shutdown\n", "netElementCount": 1 }),
        ),
        (
            "/cvpservice/configlet/getAppliedDevices.do",
            json!({ "data": [ { "hostName": "sw1" } ], "total": 1 }),
        ),
        (
            "/cvpservice/configlet/getConfiglets.do",
            json!({ "data": [
                { "key": "configlet_23", "name": "e23",
                  "config": "interface Eth23\n no shutdown\n", "netElementCount": 1 },
                { "key": "configlet_24", "name": "e24",
                  "config": "interface Eth24\n", "netElementCount": 0 }
            ], "total": 2 }),
        ),
    ]
}

fn write_manifest(dir: &Path, containers: &[&str]) -> PathBuf {
    let path = dir.join("configlet.toml");
    let list = containers
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");
    std::fs::write(
        &path,
        format!(
            r#"manifest_version = 1

[configlet]
name = "e23"
content = """interface Eth23
 no shutdown"""
containers = [{list}]
auto_run = true
timeout = 30
"#
        ),
    )
    .unwrap();
    path
}

fn stdout_json(output: &std::process::Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("stdout is not JSON ({e}): {stdout}"))
}

#[test]
fn cli_version_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let output = cvsync_bin(dir.path()).arg("--version").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("cvsync"), "version output: {stdout}");
}

#[test]
fn cli_help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    let output = cvsync_bin(dir.path()).arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for cmd in ["apply", "diff", "show", "list", "destroy", "completions"] {
        assert!(stdout.contains(cmd), "help should list '{cmd}'");
    }
}

#[test]
fn cli_completions_bash() {
    let dir = tempfile::tempdir().unwrap();
    let output = cvsync_bin(dir.path())
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(!output.stdout.is_empty());
}

#[test]
fn cli_bad_manifest_exits_with_manifest_code() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("configlet.toml");
    std::fs::write(&manifest, "manifest_version = 2\n[configlet]\nname = \"e23\"\n").unwrap();

    let output = cvsync_bin(dir.path())
        .arg("apply")
        .arg(&manifest)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("manifest error:"), "stderr: {stderr}");
}

#[test]
fn cli_missing_config_exits_with_controller_code() {
    let dir = tempfile::tempdir().unwrap();
    let output = cvsync_bin(dir.path()).arg("list").output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("error:"), "stderr: {stderr}");
}

#[test]
fn cli_unreachable_controller_exits_with_controller_code() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("cloudvision.json");
    std::fs::write(
        &config,
        r#"{"nodes":["http://127.0.0.1:1"],"username":"u","password":"p","request_timeout_secs":2}"#,
    )
    .unwrap();
    let output = cvsync_bin(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["show", "e23"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn cli_show_json() {
    let dir = tempfile::tempdir().unwrap();
    let cvp = FakeCvp::start(&e23_routes());
    let config = cvp.write_config(dir.path());

    let output = cvsync_bin(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["--json", "show", "e23"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let value = stdout_json(&output);
    assert_eq!(value["exists"], true);
    assert_eq!(value["key"], "configlet_23");
    assert_eq!(value["content"], "interface Eth23\n no shutdown");
    assert_eq!(value["containers"], json!(["sw1"]));
}

#[test]
fn cli_show_missing_configlet_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let cvp = FakeCvp::start(&[(
        "/cvpservice/configlet/getConfigletByName.do",
        json!({ "errorCode": "132801", "errorMessage": "Entity does not exist" }),
    )]);
    let config = cvp.write_config(dir.path());

    let output = cvsync_bin(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["show", "e99"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("does not exist"), "stdout: {stdout}");
}

#[test]
fn cli_list_json() {
    let dir = tempfile::tempdir().unwrap();
    let cvp = FakeCvp::start(&e23_routes());
    let config = cvp.write_config(dir.path());

    let output = cvsync_bin(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["list", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value = stdout_json(&output);
    let items = value.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["name"], "e23");
    assert_eq!(items[0]["containers"], json!(["sw1"]));
    assert_eq!(items[1]["containers"], json!([]));
}

#[test]
fn cli_diff_reports_attachment_drift() {
    let dir = tempfile::tempdir().unwrap();
    let cvp = FakeCvp::start(&e23_routes());
    let config = cvp.write_config(dir.path());
    let manifest = write_manifest(dir.path(), &["sw2"]);

    let output = cvsync_bin(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("--json")
        .arg("diff")
        .arg(&manifest)
        .output()
        .unwrap();
    assert!(output.status.success());
    let value = stdout_json(&output);
    assert_eq!(value["in_sync"], false);
    assert_eq!(value["attachments"]["to_add"], json!(["sw2"]));
    assert_eq!(value["attachments"]["to_remove"], json!(["sw1"]));
    assert_eq!(value["actions"][0]["action"], "update_attachments");
}

#[test]
fn cli_diff_in_sync_text() {
    let dir = tempfile::tempdir().unwrap();
    let cvp = FakeCvp::start(&e23_routes());
    let config = cvp.write_config(dir.path());
    let manifest = write_manifest(dir.path(), &["sw1"]);

    let output = cvsync_bin(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("diff")
        .arg(&manifest)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("no drift detected"), "stdout: {stdout}");
}

#[test]
fn cli_apply_dry_run_does_not_mutate() {
    let dir = tempfile::tempdir().unwrap();
    // No mutation routes: any write would hit a 404 and fail the command.
    let cvp = FakeCvp::start(&e23_routes());
    let config = cvp.write_config(dir.path());
    let manifest = write_manifest(dir.path(), &["sw2"]);

    let output = cvsync_bin(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("--json")
        .arg("apply")
        .arg(&manifest)
        .arg("--dry-run")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let value = stdout_json(&output);
    assert_eq!(value["applied"], false);
    assert_eq!(value["plan"]["actions"].as_array().unwrap().len(), 1);
    assert_eq!(value["tasks"], json!([]));
}

#[test]
fn cli_show_on_missing_endpoint_is_controller_error() {
    let dir = tempfile::tempdir().unwrap();
    // Only login is served: the configlet lookup answers with a bare 404.
    let cvp = FakeCvp::start(&[]);
    let config = cvp.write_config(dir.path());

    let output = cvsync_bin(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["show", "e23"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("does not exist"), "stdout: {stdout}");
}
