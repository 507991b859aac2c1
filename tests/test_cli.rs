//! Command-line tests: run the `lockwarden` binary against a temporary
//! state directory with the simulated platform.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use tempfile::TempDir;

const PIN: &str = "4821";

fn lockwarden(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("lockwarden").unwrap();
    cmd.env("LOCKWARDEN_HOME", home.path())
        .env("NO_COLOR", "1")
        .env_remove("LOCKWARDEN_PIN")
        .env_remove("RUST_LOG");
    cmd
}

/// A state directory holding the simulated-platform config.
fn home_with_server(status_url: &str) -> TempDir {
    let home = TempDir::new().unwrap();
    let yaml = include_str!("fixtures/simulated.yaml").replace("STATUS_URL", status_url);
    std::fs::write(home.path().join("config.yaml"), yaml).unwrap();
    home
}

/// A URL nothing listens on.
fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/status", port)
}

/// Answer each of `bodies` once, in order, with HTTP 200.
fn serve(bodies: Vec<&'static str>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/status", listener.local_addr().unwrap());

    thread::spawn(move || {
        for body in bodies {
            let (mut socket, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let content_length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            l.to_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).unwrap();
        }
    });

    url
}

fn status_json(home: &TempDir) -> Value {
    let output = lockwarden(home)
        .args(["status", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}

fn set_up(home: &TempDir) {
    lockwarden(home)
        .args(["setup", "--device-id", "dev-9"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Setup complete"));
}

#[test]
fn test_init_writes_config_once() {
    let home = TempDir::new().unwrap();

    lockwarden(&home)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    assert!(home.path().join("config.yaml").exists());

    lockwarden(&home)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));

    lockwarden(&home)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("default PIN"));
}

#[test]
fn test_check_rejects_invalid_pin() {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join("config.yaml"), "pin: \"12ab\"\n").unwrap();

    lockwarden(&home)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("'pin' must be"));
}

#[test]
fn test_fresh_device_is_setup_pending() {
    let home = TempDir::new().unwrap();
    let status = status_json(&home);
    assert_eq!(status["state"], "setup_pending");
    assert_eq!(status["record"]["protection_enabled"], false);
}

#[test]
fn test_setup_arms_protection() {
    let home = home_with_server(&dead_url());

    lockwarden(&home)
        .arg("setup")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No device id saved"));

    set_up(&home);
    let status = status_json(&home);
    assert_eq!(status["state"], "active");
    assert_eq!(status["record"]["device_id"], "dev-9");
    assert_eq!(status["record"]["protection_enabled"], true);

    lockwarden(&home)
        .arg("setup")
        .assert()
        .success()
        .stdout(predicate::str::contains("Already set up"));
}

#[test]
fn test_wrong_pin_is_refused_and_journaled() {
    let home = home_with_server(&dead_url());
    set_up(&home);

    lockwarden(&home)
        .args(["unlock", "--pin", "0000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Incorrect PIN"));
    assert_eq!(status_json(&home)["state"], "active");

    lockwarden(&home)
        .args(["log", "--kind", "pin"])
        .assert()
        .success()
        .stdout(predicate::str::contains("REJECTED"));

    lockwarden(&home)
        .args(["log", "--kind", "bogus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown entry kind"));
}

#[test]
fn test_sync_locks_and_break_releases() {
    let url = serve(vec![
        r#"{"is_freezed": 1, "is_protected": 1, "message": "Payment overdue"}"#,
    ]);
    let home = home_with_server(&url);
    set_up(&home);

    lockwarden(&home)
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("Status applied"));
    let status = status_json(&home);
    assert_eq!(status["state"], "locked");
    assert_eq!(status["notice"]["message"], "Payment overdue");

    lockwarden(&home)
        .arg("break")
        .env("LOCKWARDEN_PIN", PIN)
        .assert()
        .success()
        .stdout(predicate::str::contains("Break ends in"));
    let status = status_json(&home);
    assert_eq!(status["state"], "on_break");
    assert!(status["record"]["break_end_time"].is_string());
}

#[test]
fn test_sync_outage_keeps_state() {
    let home = home_with_server(&dead_url());
    set_up(&home);

    lockwarden(&home)
        .arg("sync")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Could not reach the server"));
    assert_eq!(status_json(&home)["state"], "active");
}

#[test]
fn test_remove_protection_then_reset() {
    let home = home_with_server(&dead_url());
    set_up(&home);

    lockwarden(&home)
        .args(["reset-setup"])
        .assert()
        .failure();

    lockwarden(&home)
        .args(["remove-protection", "--pin", PIN])
        .assert()
        .success()
        .stdout(predicate::str::contains("may now be removed"));
    let status = status_json(&home);
    assert_eq!(status["state"], "unprotected");
    assert_eq!(status["record"]["uninstall_allowed"], true);

    lockwarden(&home).arg("reset-setup").assert().success();
    assert_eq!(status_json(&home)["state"], "setup_pending");
}

#[test]
fn test_dial_only_answers_admin_code() {
    let home = home_with_server(&dead_url());
    set_up(&home);

    lockwarden(&home)
        .args(["dial", "*#4821#"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Administration"));

    lockwarden(&home)
        .args(["dial", "12345"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}
