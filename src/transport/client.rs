//! # RetryingTransport: HTTP requests with bounded retries.
//!
//! ```text
//! fetch(url, method, opts)
//!   loop attempt in 0..=max_retries:
//!     ├─ acquire pool permit (total → destination)
//!     ├─ send under the per-attempt deadline
//!     ├─ status not retryable          ─► return Ok(response)
//!     ├─ request error (not transient) ─► return Err immediately
//!     └─ retryable status / timeout / refused / reset
//!           ├─ last attempt ─► return Err(last failure)
//!           └─ delay (Retry-After or backoff), publish RetryScheduled, sleep
//! ```
//!
//! ## Rules
//! - A retryable status that survives the last attempt is reported as
//!   [`TransportError::Status`], never as `Ok`.
//! - No sleep follows the final attempt.
//! - A `Retry-After` header (in seconds) replaces the computed backoff,
//!   capped at `max_delay`.
//! - The body readers ([`fetch_text`](RetryingTransport::fetch_text) and the
//!   `get_*`/`post_*` helpers) keep the pool permit until the body is read and
//!   bound the read by the same deadline as the send. A body that stalls past
//!   it fails with [`TransportError::Timeout`] and is not retried.
//! - [`fetch`](RetryingTransport::fetch) hands the raw [`Response`] back and
//!   releases its permit on return.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Method, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::PoolConfig;
use crate::error::TransportError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::RetryPolicy;
use crate::transport::pool::{ConnectionPool, PoolPermit};

/// Extra request parts for [`RetryingTransport::fetch`].
#[derive(Clone, Debug, Default)]
pub struct FetchOptions {
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl FetchOptions {
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A response that still owns its pool slot and attempt deadline.
struct Held {
    resp: Response,
    permit: PoolPermit,
    deadline: Option<Instant>,
}

/// HTTP transport that retries transient failures.
///
/// Cheap to share behind an [`Arc`]; all methods take `&self`.
pub struct RetryingTransport {
    policy: RetryPolicy,
    pool: Arc<ConnectionPool>,
    bus: Bus,
}

impl RetryingTransport {
    pub fn new(policy: RetryPolicy, pool: PoolConfig) -> Self {
        Self::with_pool(policy, Arc::new(ConnectionPool::new(pool)))
    }

    /// Shares an existing pool between transports.
    pub fn with_pool(policy: RetryPolicy, pool: Arc<ConnectionPool>) -> Self {
        Self {
            policy,
            pool,
            bus: Bus::default(),
        }
    }

    #[must_use]
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Sends `method url` until it succeeds, fails definitively, or retries run out.
    ///
    /// Non-retryable statuses (including 4xx other than those configured) are
    /// returned as `Ok`; inspect [`Response::status`]. Reading the body of the
    /// returned response is not bounded by the attempt timeout.
    pub async fn fetch(
        &self,
        url: &str,
        method: Method,
        opts: &FetchOptions,
    ) -> Result<Response, TransportError> {
        self.send(url, method, opts).await.map(|held| held.resp)
    }

    /// Like [`fetch`](Self::fetch), but also reads the body as text within the
    /// attempt deadline. Returns the status with the body for any non-retryable status.
    pub async fn fetch_text(
        &self,
        url: &str,
        method: Method,
        opts: &FetchOptions,
    ) -> Result<(u16, String), TransportError> {
        let held = self.send(url, method, opts).await?;
        self.read_text(held).await
    }

    /// `GET url` and read the body as text.
    ///
    /// A non-success status that is not retryable is reported as
    /// [`TransportError::Status`] with no retry hint.
    pub async fn get_text(&self, url: &str) -> Result<String, TransportError> {
        let (status, body) = self
            .fetch_text(url, Method::GET, &FetchOptions::default())
            .await?;
        success(status)?;
        Ok(body)
    }

    /// `GET url` and decode the body as JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, TransportError> {
        let body = self.get_text(url).await?;
        decode(url, &body)
    }

    /// `POST url` with `payload` as a JSON body and decode the JSON reply.
    pub async fn post_json<B, T>(&self, url: &str, payload: &B) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_vec(payload).map_err(|e| TransportError::Request {
            message: format!("encoding body for {url}: {e}"),
        })?;
        let opts = FetchOptions::default()
            .header(CONTENT_TYPE.as_str(), "application/json")
            .body(body);
        let (status, reply) = self.fetch_text(url, Method::POST, &opts).await?;
        success(status)?;
        decode(url, &reply)
    }

    /// Releases pooled connections. The transport stays usable.
    pub fn close(&self) {
        self.pool.close();
    }

    async fn send(
        &self,
        url: &str,
        method: Method,
        opts: &FetchOptions,
    ) -> Result<Held, TransportError> {
        let parsed = Url::parse(url).map_err(|e| TransportError::Request {
            message: format!("invalid url {url}: {e}"),
        })?;
        let dest = destination(&parsed);
        let total = self.policy.total_attempts();
        let mut attempt: u32 = 0;

        loop {
            let failure = match self.attempt(&parsed, &dest, &method, opts).await {
                Ok(held) => {
                    let status = held.resp.status().as_u16();
                    if !self.policy.is_retryable_status(status) {
                        return Ok(held);
                    }
                    TransportError::Status {
                        status,
                        retry_after: retry_after(held.resp.headers()),
                    }
                }
                Err(e) if e.is_transient() => e,
                Err(e) => {
                    tracing::warn!(url, error = %e, "request failed, not retrying");
                    return Err(e);
                }
            };

            attempt += 1;
            if attempt >= total {
                tracing::error!(url, attempts = attempt, error = %failure, "request failed after all retries");
                return Err(failure);
            }

            let delay = self.delay_for(attempt - 1, &failure);
            tracing::warn!(
                url,
                attempt,
                max_attempts = total,
                error = %failure,
                delay_ms = delay.as_millis() as u64,
                "request failed, retrying"
            );
            let status = match &failure {
                TransportError::Status { status, .. } => Some(*status),
                _ => None,
            };
            self.bus.publish(
                Event::new(EventKind::RetryScheduled)
                    .with_name(url)
                    .with_attempt(attempt)
                    .with_delay(delay)
                    .with_category(failure.category())
                    .with_status(status)
                    .with_reason(failure.to_string()),
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Reads the body while the permit is held, bounded by the attempt deadline.
    async fn read_text(&self, held: Held) -> Result<(u16, String), TransportError> {
        let Held {
            resp,
            permit,
            deadline,
        } = held;
        let status = resp.status().as_u16();
        let limit = self.policy.timeout;

        let body = match deadline {
            Some(at) => tokio::time::timeout_at(at, resp.text())
                .await
                .map_err(|_elapsed| TransportError::Timeout { timeout: limit })?,
            None => resp.text().await,
        }
        .map_err(|e| map_reqwest(&e, limit))?;

        drop(permit);
        Ok((status, body))
    }

    fn delay_for(&self, retry_index: u32, failure: &TransportError) -> Duration {
        match failure {
            TransportError::Status {
                retry_after: Some(hint),
                ..
            } if !hint.is_zero() => (*hint).min(self.policy.max_delay),
            _ => self.policy.delay_for(retry_index),
        }
    }

    async fn attempt(
        &self,
        url: &Url,
        dest: &str,
        method: &Method,
        opts: &FetchOptions,
    ) -> Result<Held, TransportError> {
        let permit = self.pool.acquire(dest).await?;
        let deadline = self.policy.attempt_timeout().map(|limit| Instant::now() + limit);
        let client = self.pool.client()?;

        let mut req = client.request(method.clone(), url.clone());
        for (name, value) in &opts.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &opts.body {
            req = req.body(body.clone());
        }

        let limit = self.policy.timeout;
        let resp = match deadline {
            Some(at) => match tokio::time::timeout_at(at, req.send()).await {
                Ok(res) => res.map_err(|e| map_reqwest(&e, limit))?,
                Err(_elapsed) => return Err(TransportError::Timeout { timeout: limit }),
            },
            None => req.send().await.map_err(|e| map_reqwest(&e, limit))?,
        };
        Ok(Held {
            resp,
            permit,
            deadline,
        })
    }
}

impl Default for RetryingTransport {
    fn default() -> Self {
        RetryingTransport::new(RetryPolicy::default(), PoolConfig::default())
    }
}

fn success(status: u16) -> Result<(), TransportError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(TransportError::Status {
            status,
            retry_after: None,
        })
    }
}

fn decode<T: DeserializeOwned>(url: &str, body: &str) -> Result<T, TransportError> {
    serde_json::from_str(body).map_err(|e| TransportError::Request {
        message: format!("decoding body from {url}: {e}"),
    })
}

/// `scheme://host:port` used as the per-destination pool key.
fn destination(url: &Url) -> String {
    format!(
        "{}://{}:{}",
        url.scheme(),
        url.host_str().unwrap_or_default(),
        url.port_or_known_default().unwrap_or_default()
    )
}

/// `Retry-After` in delta-seconds; HTTP-date values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn map_reqwest(e: &reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        return TransportError::Timeout { timeout };
    }
    if is_reset(e) {
        return TransportError::Reset {
            message: e.to_string(),
        };
    }
    if e.is_connect() {
        return TransportError::Connect {
            message: e.to_string(),
        };
    }
    TransportError::Request {
        message: e.to_string(),
    }
}

fn is_reset(e: &reqwest::Error) -> bool {
    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ) {
                return true;
            }
        }
        source = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn response(status: u16, extra: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status} X\r\ncontent-length: {}\r\nconnection: close\r\n{extra}\r\n{body}",
            body.len()
        )
    }

    /// Serves `script[i]` for the i-th connection and the last entry afterwards.
    async fn serve(script: Vec<String>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    return;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let reply = script[n.min(script.len() - 1)].clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = sock.read(&mut buf).await;
                    let _ = sock.write_all(reply.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        (format!("http://{addr}/"), hits)
    }

    fn transport(max_retries: u32) -> RetryingTransport {
        RetryingTransport::new(
            RetryPolicy {
                max_retries,
                base_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(50),
                jitter: false,
                timeout: Duration::from_secs(5),
                ..RetryPolicy::default()
            },
            PoolConfig::default(),
        )
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let (url, hits) = serve(vec![
            response(503, "", ""),
            response(503, "", ""),
            response(200, "", "hello"),
        ])
        .await;
        let t = transport(3);
        let mut rx = t.bus().subscribe();

        let body = t.get_text(&url).await.unwrap();
        assert_eq!(body, "hello");
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        let mut scheduled = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::RetryScheduled {
                assert_eq!(ev.status, Some(503));
                scheduled += 1;
            }
        }
        assert_eq!(scheduled, 2);
    }

    #[tokio::test]
    async fn exhausted_retryable_status_is_an_error() {
        let (url, hits) = serve(vec![response(503, "retry-after: 0\r\n", "")]).await;
        let t = transport(2);

        let err = t
            .fetch(&url, Method::GET, &FetchOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Status {
                status: 503,
                retry_after: Some(Duration::ZERO)
            }
        );
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_status_returns_immediately() {
        let (url, hits) = serve(vec![response(404, "", "missing")]).await;
        let t = transport(3);

        let resp = t
            .fetch(&url, Method::GET, &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 404);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let err = t.get_text(&url).await.unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn zero_retries_makes_one_attempt() {
        let (url, hits) = serve(vec![response(500, "", "")]).await;
        let t = transport(0);
        let err = t.get_text(&url).await.unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 500, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refused_connections_are_retried_then_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let t = transport(1);
        let mut rx = t.bus().subscribe();
        let err = t.get_text(&format!("http://{addr}/")).await.unwrap_err();
        assert!(err.is_transient(), "{err:?}");
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::RetryScheduled);
    }

    #[tokio::test]
    async fn hanging_server_hits_attempt_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((sock, _)) = listener.accept().await {
                held.push(sock);
            }
        });

        let t = RetryingTransport::new(
            RetryPolicy {
                max_retries: 0,
                timeout: Duration::from_millis(100),
                ..RetryPolicy::default()
            },
            PoolConfig::default(),
        );
        let err = t.get_text(&format!("http://{addr}/")).await.unwrap_err();
        assert_eq!(
            err,
            TransportError::Timeout {
                timeout: Duration::from_millis(100)
            }
        );
    }

    #[tokio::test]
    async fn invalid_url_is_not_retried() {
        let t = transport(3);
        let err = t.get_text("not a url").await.unwrap_err();
        assert!(matches!(err, TransportError::Request { .. }));
    }

    #[tokio::test]
    async fn sends_headers_and_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<String>();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            while !raw.ends_with(b"payload") {
                let n = sock.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }
            let _ = tx.send(String::from_utf8_lossy(&raw).into_owned());
            let _ = sock.write_all(response(200, "", "ok").as_bytes()).await;
        });

        let t = transport(0);
        let opts = FetchOptions::default().header("x-trace", "abc").body("payload");
        let resp = t
            .fetch(&format!("http://{addr}/submit"), Method::POST, &opts)
            .await
            .unwrap();
        assert!(resp.status().is_success());

        let raw = rx.await.unwrap().to_lowercase();
        assert!(raw.starts_with("post /submit"));
        assert!(raw.contains("x-trace: abc"));
        assert!(raw.ends_with("payload"));
    }

    /// Accepts connections, sends headers promising more body than it writes,
    /// then holds the sockets open.
    async fn serve_stalled_body() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((mut sock, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = sock.read(&mut buf).await;
                let _ = sock
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\nhello")
                    .await;
                held.push(sock);
            }
        });
        format!("http://{addr}/")
    }

    fn short_timeout(timeout: Duration, pool: PoolConfig) -> RetryingTransport {
        RetryingTransport::new(
            RetryPolicy {
                max_retries: 0,
                timeout,
                ..RetryPolicy::default()
            },
            pool,
        )
    }

    #[tokio::test]
    async fn stalled_body_hits_attempt_timeout() {
        let url = serve_stalled_body().await;
        let t = short_timeout(Duration::from_millis(200), PoolConfig::default());

        let res = tokio::time::timeout(Duration::from_secs(3), t.get_text(&url))
            .await
            .expect("body read must be bounded by the attempt timeout");
        assert_eq!(
            res,
            Err(TransportError::Timeout {
                timeout: Duration::from_millis(200)
            })
        );
    }

    #[tokio::test]
    async fn permit_is_held_while_the_body_is_read() {
        let url = serve_stalled_body().await;
        let dest = destination(&Url::parse(&url).unwrap());
        let t = Arc::new(short_timeout(
            Duration::from_millis(500),
            PoolConfig {
                max_per_host: 1,
                ..PoolConfig::default()
            },
        ));

        let reader = Arc::clone(&t);
        let task = tokio::spawn(async move { reader.get_text(&url).await });
        tokio::time::sleep(Duration::from_millis(150)).await;

        let busy = tokio::time::timeout(Duration::from_millis(50), t.pool().acquire(&dest)).await;
        assert!(busy.is_err(), "slot must stay taken until the body is read");

        let res = task.await.unwrap();
        assert!(matches!(res, Err(TransportError::Timeout { .. })), "{res:?}");
        t.pool().acquire(&dest).await.unwrap();
    }

    #[tokio::test]
    async fn json_helpers_encode_and_decode() {
        let (url, _) = serve(vec![response(200, "", r#"{"price":41.5}"#)]).await;
        let t = transport(0);
        let quote: serde_json::Value = t.get_json(&url).await.unwrap();
        assert_eq!(quote["price"], 41.5);

        let (url, _) = serve(vec![response(200, "", "not json")]).await;
        let err = t.get_json::<serde_json::Value>(&url).await.unwrap_err();
        assert!(matches!(err, TransportError::Request { .. }), "{err:?}");
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn post_json_sends_a_json_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<String>();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            while !raw.ends_with(b"}") {
                let n = sock.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }
            let _ = tx.send(String::from_utf8_lossy(&raw).into_owned());
            let _ = sock
                .write_all(response(200, "", r#"{"accepted":true}"#).as_bytes())
                .await;
        });

        let t = transport(0);
        let reply: serde_json::Value = t
            .post_json(&format!("http://{addr}/orders"), &serde_json::json!({"qty": 3}))
            .await
            .unwrap();
        assert_eq!(reply["accepted"], true);

        let raw = rx.await.unwrap().to_lowercase();
        assert!(raw.starts_with("post /orders"));
        assert!(raw.contains("content-type: application/json"));
        assert!(raw.ends_with(r#"{"qty":3}"#));
    }

    #[test]
    fn retry_after_reads_delta_seconds_only() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn destination_includes_default_port() {
        let url = Url::parse("https://example.com/a").unwrap();
        assert_eq!(destination(&url), "https://example.com:443");
    }
}
