use std::time::Duration;

use reqwest::Method;
use tokio_util::sync::CancellationToken;

use crate::{Backoff, Body, QueryValue};

/// Client-wide defaults for timeout and retry behavior.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// Deadline of a single attempt.
    pub timeout: Duration,
    /// Maximum number of retries after the initial attempt.
    pub retries: usize,
    pub backoff: Backoff,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
            retries: 2,
            backoff: Backoff::default(),
        }
    }
}

/// Per-call request description.
///
/// Unset overrides fall back to the client's [`ClientOptions`].
#[derive(Clone, Debug)]
pub struct RequestOptions {
    pub method: Method,
    /// Header names are matched case-insensitively; a later pair replaces an
    /// earlier one with the same name.
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, QueryValue)>,
    pub body: Body,
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
    pub backoff: Option<Backoff>,
    /// Decode JSON response bodies. Enabled by default.
    pub parse_json: bool,
    /// Aborts the whole call, including pending retries, when cancelled.
    pub cancel: Option<CancellationToken>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            query: Vec::new(),
            body: Body::Empty,
            timeout: None,
            retries: None,
            backoff: None,
            parse_json: true,
            cancel: None,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retries(mut self, retries: usize) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn parse_json(mut self, enabled: bool) -> Self {
        self.parse_json = enabled;
        self
    }

    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}
