//! Hosted protocol server.
//!
//! # Responsibilities
//! - Create the Axum Router that every transport serves
//! - Register services before any transport is bound
//! - Wire up middleware (tracing)
//! - Expose a health endpoint

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::error::RegistrationError;
use crate::http::registry::ServiceRegistry;

pub const HEALTH_ROUTE: &str = "/healthz";

/// The protocol server hosted on every transport.
pub struct ProtocolServer {
    router: Router,
}

impl ProtocolServer {
    /// Build the server and register services from `registry`.
    pub fn new<R>(registry: &R) -> Result<Self, RegistrationError>
    where
        R: ServiceRegistry + ?Sized,
    {
        let base = Router::new().route(HEALTH_ROUTE, get(health_handler));
        let router = registry.register(base)?;
        tracing::debug!(registry = registry.name(), "Services registered");

        Ok(Self {
            router: router.layer(TraceLayer::new_for_http()),
        })
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "SERVING")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::registry::NoServices;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_reports_serving() {
        let router = ProtocolServer::new(&NoServices).unwrap().into_router();
        let response = router
            .oneshot(Request::get(HEALTH_ROUTE).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"SERVING");
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let router = ProtocolServer::new(&NoServices).unwrap().into_router();
        let response = router
            .oneshot(Request::get("/grpc.health.v1.Health/Check").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
