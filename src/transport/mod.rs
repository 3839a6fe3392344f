//! Retrying HTTP transport.
//!
//! - [`ConnectionPool`] shared `reqwest` client with total and per-destination limits
//! - [`RetryingTransport`] bounded retries with backoff for transient failures
//! - [`FetchOperation`] the transport as a recovery [`Operation`](crate::Operation)

mod client;
mod operation;
mod pool;

pub use client::{FetchOptions, RetryingTransport};
pub use operation::{FetchOperation, FetchRequest, FetchedBody};
pub use pool::{ConnectionPool, PoolPermit};

pub use reqwest::{Method, Response};
