use std::net::TcpListener;

use assert_cmd::Command;
use predicates::prelude::*;

// свободный порт, на котором никто не слушает
fn closed_port() -> u16 {
    let l = TcpListener::bind("127.0.0.1:0").unwrap();
    l.local_addr().unwrap().port()
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("iqfeed-client")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("health"))
        .stdout(predicate::str::contains("history"))
        .stdout(predicate::str::contains("watch"));
}

#[test]
fn health_fails_without_daemon() {
    let port = closed_port();
    Command::cargo_bin("iqfeed-client")
        .unwrap()
        .args(["--admin-port", &port.to_string(), "--timeout-secs", "1", "--skip-init", "health"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not healthy"));
}

#[test]
fn initialize_gives_up_on_closed_port() {
    let port = closed_port();
    Command::cargo_bin("iqfeed-client")
        .unwrap()
        .args(["--admin-port", &port.to_string(), "--retries", "1", "health"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not healthy"));
}

#[test]
fn conflicting_watch_flags_are_rejected() {
    Command::cargo_bin("iqfeed-client")
        .unwrap()
        .args(["watch", "AAPL", "--trades", "--interval", "60"])
        .assert()
        .failure();
}
