//! End-to-end lifecycle tests: bind, serve, signal, drain, clean up.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use grs_server::error::{BindError, StartupError};
use grs_server::http::{DescriptorSetRegistry, NoServices};
use grs_server::lifecycle::{start, ProcessContext, ShutdownState, SignalEvent};
use grs_server::net::{LocalAddr, SocketFileGuard, SocketFileState};

mod common;

#[tokio::test]
async fn serves_on_tcp_and_unix_then_shuts_down_once() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("grs.sock");
    let descriptor = dir.path().join("descriptor_set.bin");
    std::fs::write(&descriptor, b"\x0a\x04test").unwrap();

    let server = start(
        ProcessContext::new(common::dual_config(&socket)),
        &DescriptorSetRegistry::new(&descriptor),
    )
    .await
    .unwrap();

    let tcp_addr = server.tcp_addr().unwrap();
    assert_eq!(server.local_addrs()[1], LocalAddr::Unix(socket.clone()));

    let (status, body) = common::unix_get(&socket, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "SERVING");

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let res = client
        .get(format!(
            "http://{}/grpc.reflection.v1alpha.ServerReflection/descriptor_set",
            tcp_addr
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(&res.bytes().await.unwrap()[..], b"\x0a\x04test");

    let state = server.state();
    let signals = server.signals();
    signals.publish(SignalEvent::named("SIGTERM"));
    signals.publish(SignalEvent::named("SIGTERM"));

    let outcome = server.run_until_shutdown().await.unwrap();
    assert_eq!(outcome.exit_code, 15);
    assert_eq!(outcome.signal.name, "SIGTERM");
    assert_eq!(outcome.duplicates_ignored, 1);
    assert!(outcome.drain_error.is_none());
    assert_eq!(outcome.report.unwrap().torn_down.len(), 2);
    assert_eq!(state.current(), ShutdownState::Exited);

    assert_eq!(
        SocketFileGuard::new(&socket).state().unwrap(),
        SocketFileState::Absent
    );
    assert!(tokio::net::TcpStream::connect(tcp_addr).await.is_err());
}

#[tokio::test]
async fn stale_socket_from_previous_instance_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("grs.sock");
    drop(std::os::unix::net::UnixListener::bind(&socket).unwrap());

    let mut config = common::dual_config(&socket);
    config.listener.address.clear();

    let server = start(ProcessContext::new(config), &NoServices).await.unwrap();
    let (status, _) = common::unix_get(&socket, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    server.signals().publish(SignalEvent::Code(2));
    let outcome = server.run_until_shutdown().await.unwrap();
    assert_eq!(outcome.exit_code, 2);
    assert!(!socket.exists());
}

#[tokio::test]
async fn regular_file_at_socket_path_blocks_startup() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("grs.sock");
    std::fs::write(&socket, b"someone else's data").unwrap();

    let err = start(ProcessContext::new(common::dual_config(&socket)), &NoServices)
        .await
        .err()
        .unwrap();

    match err {
        StartupError::Bind(e) => assert!(e.is_path_conflict()),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(std::fs::read(&socket).unwrap(), b"someone else's data");
}

#[tokio::test]
async fn occupied_tcp_port_leaves_nothing_bound() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("grs.sock");

    let mut config = common::dual_config(&socket);
    config.listener.port = Some(occupied.local_addr().unwrap().port());

    let err = start(ProcessContext::new(config), &NoServices).await.err().unwrap();
    assert!(matches!(err, StartupError::Bind(BindError::Listen { .. })));
    assert!(!socket.exists());
}

#[tokio::test]
async fn drain_timeout_still_cleans_up_and_keeps_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("grs.sock");

    let mut config = common::dual_config(&socket);
    config.shutdown.drain_timeout_ms = 200;

    let entered = Arc::new(tokio::sync::Notify::new());
    let server = start(
        ProcessContext::new(config),
        &common::SlowService {
            delay: Duration::from_secs(30),
            entered: entered.clone(),
        },
    )
    .await
    .unwrap();

    let tcp_addr = server.tcp_addr().unwrap();
    let in_flight = tokio::spawn(async move {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        client.get(format!("http://{}/slow", tcp_addr)).send().await
    });

    entered.notified().await;
    assert_eq!(server.sessions().active_count(), 1);

    server.signals().publish(SignalEvent::named("SIGUSR1"));
    let outcome = server.run_until_shutdown().await.unwrap();

    assert_eq!(outcome.exit_code, 30);
    assert!(outcome.drain_error.unwrap().contains("Drain did not complete"));
    assert!(outcome.report.is_none());
    assert!(outcome.cleanup_failures.is_empty());
    assert!(!socket.exists());

    // The force-closed request fails instead of hanging.
    assert!(in_flight.await.unwrap().is_err());
}

#[tokio::test]
async fn fault_shuts_down_with_distinct_code() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("grs.sock");

    let server = start(ProcessContext::new(common::dual_config(&socket)), &NoServices)
        .await
        .unwrap();

    server
        .signals()
        .publish(SignalEvent::Fault("handler exploded".into()));
    let outcome = server.run_until_shutdown().await.unwrap();

    assert_eq!(outcome.exit_code, 70);
    assert_eq!(outcome.signal.name, "FAULT");
    assert!(!socket.exists());
}
