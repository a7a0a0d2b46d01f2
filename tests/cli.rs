//! Exit codes of the `grs-server` binary for rejected command lines.

use std::process::{Command, Output};

fn run(args: &[&str], envs: &[(&str, &str)]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_grs-server"))
        .env_clear()
        .envs(envs.iter().copied())
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn invalid_mode_flag_is_startup_failure() {
    let out = run(&["--server-socket-permissions-mode", "0999"], &[]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("0999"));
}

#[test]
fn invalid_mode_env_is_startup_failure() {
    let out = run(&[], &[("GRS_SERVER_SOCKET_PERMISSIONS_MODE", "abc")]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn non_numeric_port_is_startup_failure() {
    let out = run(&["--server-port", "notaport"], &[]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn no_transport_is_startup_failure() {
    let out = run(&["--server-address", ""], &[]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn version_still_exits_cleanly() {
    let out = run(&["--version"], &[]);
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).contains(env!("CARGO_PKG_VERSION")));
}
