//! Shared utilities for lifecycle integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Router;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tokio::sync::Notify;

use grs_server::config::ServerConfig;
use grs_server::error::RegistrationError;
use grs_server::http::ServiceRegistry;

/// Config listening on an ephemeral TCP port and the given socket.
pub fn dual_config(socket: &Path) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.port = Some(0);
    config.listener.socket = Some(format!("unix://{}", socket.display()));
    config
}

/// Issue a GET over a Unix socket and return status and body.
pub async fn unix_get(socket: &Path, uri: &str) -> (StatusCode, String) {
    let stream = UnixStream::connect(socket).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(conn);

    let request = Request::get(uri)
        .header("host", "localhost")
        .body(Body::empty())
        .unwrap();
    let response = sender.send_request(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(Body::new(response.into_body()), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&body).into_owned())
}

/// Registers a `/slow` route that holds the request open.
pub struct SlowService {
    pub delay: Duration,
    /// Notified once the handler is running.
    pub entered: Arc<Notify>,
}

impl ServiceRegistry for SlowService {
    fn name(&self) -> &str {
        "slow"
    }

    fn register(&self, router: Router) -> Result<Router, RegistrationError> {
        let delay = self.delay;
        let entered = self.entered.clone();
        Ok(router.route(
            "/slow",
            get(move || async move {
                entered.notify_one();
                tokio::time::sleep(delay).await;
                "done"
            }),
        ))
    }
}
