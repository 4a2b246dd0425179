//! `smart-fetch` is an async HTTP request executor.
//!
//! [`FetchClient::request`] turns a path, method, body and query into a typed
//! response while handling:
//! - URL construction against an optional base address
//! - JSON encoding of structured bodies
//! - per-attempt timeouts enforced through cancellation
//! - bounded retries with exponential backoff for 5xx, 429, timeouts and
//!   network errors
//!
//! The network call itself goes through a [`Transport`], `reqwest` by
//! default.

mod backoff;
mod body;
mod client;
mod decode;
mod error;
mod options;
mod query;
mod transport;
mod types;

pub use backoff::Backoff;
pub use body::{Body, Multipart, WireBody};
pub use client::FetchClient;
pub use error::{ErrorKind, FetchError, TransportError};
pub use options::{ClientOptions, RequestOptions};
pub use query::{build_url, QueryValue};
pub use transport::{ReqwestTransport, Transport, TransportRequest};
pub use types::{FetchResponse, RawResponse, ResponseData};

pub use reqwest::{header, Method, StatusCode};
pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, FetchError>;
