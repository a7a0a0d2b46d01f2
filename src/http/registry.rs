//! Service registration.
//!
//! Services are registered on the router before any transport is bound, so a
//! registration failure never leaves a socket behind.

use std::path::PathBuf;

use axum::body::Bytes;
use axum::http::header;
use axum::routing::get;
use axum::Router;

use crate::error::RegistrationError;

/// Route serving the raw descriptor set.
pub const DESCRIPTOR_SET_ROUTE: &str = "/grpc.reflection.v1alpha.ServerReflection/descriptor_set";

/// Something that adds services to the hosted router.
pub trait ServiceRegistry: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn register(&self, router: Router) -> Result<Router, RegistrationError>;
}

/// Registers the descriptor set loaded from disk.
#[derive(Debug, Clone)]
pub struct DescriptorSetRegistry {
    path: PathBuf,
}

impl DescriptorSetRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ServiceRegistry for DescriptorSetRegistry {
    fn name(&self) -> &str {
        "descriptor-set"
    }

    fn register(&self, router: Router) -> Result<Router, RegistrationError> {
        let bytes = std::fs::read(&self.path).map_err(|source| RegistrationError::DescriptorSet {
            path: self.path.clone(),
            source,
        })?;
        tracing::info!(
            path = %self.path.display(),
            bytes = bytes.len(),
            "Descriptor set loaded"
        );

        let bytes = Bytes::from(bytes);
        Ok(router.route(
            DESCRIPTOR_SET_ROUTE,
            get(move || {
                let bytes = bytes.clone();
                async move { ([(header::CONTENT_TYPE, "application/octet-stream")], bytes) }
            }),
        ))
    }
}

/// Registers nothing. Useful when the host only needs the health endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoServices;

impl ServiceRegistry for NoServices {
    fn name(&self) -> &str {
        "none"
    }

    fn register(&self, router: Router) -> Result<Router, RegistrationError> {
        Ok(router)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn serves_loaded_descriptor_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("descriptor_set.bin");
        std::fs::write(&path, [0x0a, 0x03, b'f', b'o', b'o']).unwrap();

        let router = DescriptorSetRegistry::new(&path).register(Router::new()).unwrap();
        let response = router
            .oneshot(Request::get(DESCRIPTOR_SET_ROUTE).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], &[0x0a, 0x03, b'f', b'o', b'o']);
    }

    #[test]
    fn missing_descriptor_set_fails() {
        let err = DescriptorSetRegistry::new("/nonexistent/descriptor_set.bin")
            .register(Router::new())
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/descriptor_set.bin"));
    }
}
