//! End-to-end tests of the `tt` binary.
//!
//! Every test runs against its own database and config in a temp directory,
//! in UTC so printed clock times are stable.

use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};

use tempfile::TempDir;

fn tt(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tt"));
    cmd.env("HOME", home)
        .env("TZ", "UTC")
        .env("TT_DATABASE_PATH", home.join("tt.db"))
        .env_remove("XDG_CONFIG_HOME")
        .env_remove("XDG_DATA_HOME")
        .env_remove("RUST_LOG")
        .stdin(Stdio::null());
    cmd
}

fn run(home: &Path, args: &[&str]) -> Output {
    tt(home).args(args).output().expect("failed to run tt")
}

fn stdout_of(home: &Path, args: &[&str]) -> String {
    let output = run(home, args);
    assert!(
        output.status.success(),
        "tt {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn test_entry_lifecycle() {
    let temp = TempDir::new().unwrap();
    let home = temp.path();

    assert_eq!(
        stdout_of(home, &["in", "Write", "report", "--at", "2026-01-15T09:00:00Z"]),
        "Started #1 \"Write report\" 09:00 - now\n"
    );
    assert_eq!(
        stdout_of(home, &["in", "Review", "--at", "2026-01-15T10:30:00Z"]),
        "Stopped #1 \"Write report\" 09:00 - 10:30 (1h 30m)\n\
         Started #2 \"Review\" 10:30 - now\n"
    );
    assert_eq!(
        stdout_of(home, &["out", "--at", "2026-01-15T11:00:00Z"]),
        "Stopped #2 \"Review\" 10:30 - 11:00 (30m)\n"
    );
    assert_eq!(stdout_of(home, &["out"]), "No active entry.\n");

    stdout_of(home, &["edit", "1", "--name", "draft", "--append"]);
    assert_eq!(
        stdout_of(home, &["ls", "all"]),
        "Thu 2026-01-15\n  \
         #1 \"Write report draft\" 09:00 - 10:30 (1h 30m)\n  \
         #2 \"Review\" 10:30 - 11:00 (30m)\n\
         Total: 2h 00m\n"
    );

    stdout_of(home, &["rm", "#2"]);
    let json = stdout_of(home, &["ls", "all", "--json"]);
    let entries: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], "Write report draft");
    assert_eq!(stdout_of(home, &["status"]), "No active entry.\n");
}

#[test]
fn test_invalid_input_fails_without_changes() {
    let temp = TempDir::new().unwrap();
    let home = temp.path();

    let output = run(home, &["in", "Work", "--at", "someday"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid time: someday"));

    let output = run(home, &["rm", "7"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("entry #7 not found"));

    assert_eq!(stdout_of(home, &["ls", "all"]), "No entries.\n");
}

#[test]
fn test_afk_alerts_resolve_non_interactively() {
    let temp = TempDir::new().unwrap();
    let home = temp.path();

    stdout_of(home, &["in", "Work", "--at", "1 hour ago"]);
    let away = stdout_of(home, &["afk", "away"]);
    assert!(away.contains("[afk] away while #1 \"Work\" is active"), "{away}");
    let back = stdout_of(home, &["afk", "back"]);
    assert!(back.contains("[formerly_afk]"), "{back}");
    assert!(stdout_of(home, &["status"]).contains("1 pending alert."));

    // stdout is not a terminal, so the resolver leaves the entry as-is.
    let output = run(home, &["resolve"]);
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("non-interactive"));

    assert_eq!(stdout_of(home, &["alerts"]), "No alerts.\n");
    assert!(stdout_of(home, &["status"]).starts_with("Active: #1 \"Work\""));
}

struct Daemon(Child);

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn test_remote_commands_go_through_the_daemon() {
    let temp = TempDir::new().unwrap();
    let home = temp.path();
    let port = free_port().to_string();
    let remote = |args: &[&str]| {
        tt(home)
            .env("TT_DAEMON_HOST", "127.0.0.1")
            .env("TT_DAEMON_PORT", &port)
            .arg("--remote")
            .args(args)
            .output()
            .expect("failed to run tt")
    };

    let _daemon = Daemon(
        tt(home)
            .env("TT_DAEMON_HOST", "127.0.0.1")
            .env("TT_DAEMON_PORT", &port)
            .arg("serve")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to start daemon"),
    );

    let deadline = Instant::now() + Duration::from_secs(10);
    while !remote(&["status"]).status.success() {
        assert!(Instant::now() < deadline, "daemon did not start");
        std::thread::sleep(Duration::from_millis(50));
    }

    let output = remote(&["in", "Remote", "--at", "2026-01-15T09:00:00Z"]);
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        "Started #1 \"Remote\" 09:00 - now\n"
    );
    let output = remote(&["rm", "5"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not_found"));

    // The daemon wrote to the same database the local commands read.
    assert!(stdout_of(home, &["status"]).starts_with("Active: #1 \"Remote\" 09:00 - now"));
}
