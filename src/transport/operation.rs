//! Adapter exposing [`RetryingTransport`] as a recovery [`Operation`].
//!
//! ```text
//! RecoveryOrchestrator::execute(primary, fallback, &FetchRequest)
//!     primary  = FetchOperation::primary(transport)           → request.url
//!     fallback = FetchOperation::mirror(transport, "https://…") → fixed mirror url
//! ```
//!
//! The transport already retries transient failures; orchestrator retries run
//! on top of that and see the final transport error.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;

use crate::error::OpError;
use crate::recovery::Operation;
use crate::transport::client::{FetchOptions, RetryingTransport};

/// Arguments of a [`FetchOperation`]; hashed for the fallback cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
        }
    }
}

/// Successful response body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FetchedBody {
    pub status: u16,
    pub body: String,
}

/// Fetches a URL through a shared transport.
pub struct FetchOperation {
    name: String,
    transport: Arc<RetryingTransport>,
    mirror: Option<String>,
}

impl FetchOperation {
    /// Fetches the URL carried by each [`FetchRequest`].
    pub fn primary(transport: Arc<RetryingTransport>) -> Self {
        Self {
            name: "fetch".to_string(),
            transport,
            mirror: None,
        }
    }

    /// Fetches `url` regardless of the request's own URL.
    pub fn mirror(transport: Arc<RetryingTransport>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: format!("mirror:{url}"),
            transport,
            mirror: Some(url),
        }
    }
}

#[async_trait]
impl Operation<FetchRequest, FetchedBody> for FetchOperation {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, req: &FetchRequest) -> Result<FetchedBody, OpError> {
        let url = self.mirror.as_deref().unwrap_or(&req.url);
        let (status, body) = self
            .transport
            .fetch_text(url, req.method.clone(), &FetchOptions::default())
            .await?;

        if !(200..300).contains(&status) {
            return Err(OpError::new(format!("HTTP {status} from {url}")).with_status(status));
        }
        Ok(FetchedBody { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PoolConfig, RecoveryConfig};
    use crate::policies::RetryPolicy;
    use crate::recovery::RecoveryOrchestrator;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_forever(status: u16, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = sock.read(&mut buf).await;
                    let reply = format!(
                        "HTTP/1.1 {status} X\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = sock.write_all(reply.as_bytes()).await;
                });
            }
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn mirror_serves_when_primary_keeps_failing() {
        let primary_url = serve_forever(503, "").await;
        let mirror_url = serve_forever(200, "mirrored").await;

        let transport = Arc::new(RetryingTransport::new(
            RetryPolicy {
                max_retries: 1,
                base_delay: Duration::from_millis(1),
                jitter: false,
                ..RetryPolicy::default()
            },
            PoolConfig::default(),
        ));
        let primary = FetchOperation::primary(Arc::clone(&transport));
        let mirror = FetchOperation::mirror(Arc::clone(&transport), mirror_url);

        let recovery = RecoveryOrchestrator::<FetchedBody>::named(
            "fetch",
            RecoveryConfig {
                max_retries: 1,
                base_delay: Duration::from_millis(1),
                ..RecoveryConfig::default()
            },
        );
        let out = recovery
            .execute(&primary, Some(&mirror), &FetchRequest::get(primary_url))
            .await
            .unwrap();
        assert_eq!(
            out,
            FetchedBody {
                status: 200,
                body: "mirrored".to_string()
            }
        );
        assert_eq!(recovery.cache().len(), 1);
    }

    #[tokio::test]
    async fn client_errors_are_not_transient() {
        let url = serve_forever(404, "nope").await;
        let transport = Arc::new(RetryingTransport::default());
        let err = FetchOperation::primary(transport)
            .call(&FetchRequest::get(url))
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(404));
        assert_eq!(
            crate::ErrorClassifier::classify(&err, 1).category,
            crate::ErrorCategory::Unknown
        );
    }
}
