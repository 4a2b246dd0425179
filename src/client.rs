use std::{fmt, sync::Arc, time::Duration};

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Method,
};
use tokio_util::sync::CancellationToken;

use crate::{
    body::{self, Encoded},
    decode::decode_body,
    error::is_retryable_status,
    query::build_url,
    transport::{invoke, AttemptResult},
    Backoff, Body, ClientOptions, FetchError, FetchResponse, RawResponse, ReqwestTransport,
    RequestOptions, ResponseData, Result, Transport, TransportError, TransportRequest,
};

#[derive(Clone)]
/// HTTP client that retries transient failures with backoff.
///
/// Cloning is cheap; clones share the transport and configuration.
pub struct FetchClient {
    transport: Arc<dyn Transport>,
    base_url: Option<String>,
    options: ClientOptions,
}

impl fmt::Debug for FetchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchClient")
            .field("base_url", &self.base_url)
            .field("transport", &"<dyn Transport>")
            .field("options", &self.options)
            .finish()
    }
}

impl Default for FetchClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchClient {
    /// Creates a client with the default `reqwest` transport and no base
    /// address.
    pub fn new() -> Self {
        Self {
            transport: Arc::new(ReqwestTransport::new()),
            base_url: None,
            options: ClientOptions::default(),
        }
    }

    /// Sets the address relative paths are resolved against.
    ///
    /// The value is parsed per request; a malformed base surfaces as
    /// [`FetchError::InvalidUrl`] from the first call.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Replaces the transport, e.g. with a test double.
    pub fn with_transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Applies client options such as timeout and retry behavior.
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Creates a client from environment variables.
    ///
    /// Reads, all optional:
    /// - `SMART_FETCH_BASE_URL` — base address for relative paths
    /// - `SMART_FETCH_TIMEOUT_MS` — per-attempt timeout in milliseconds
    /// - `SMART_FETCH_RETRIES` — retry budget
    ///
    /// Returns an error if a variable is set but empty or not a number.
    pub fn from_env() -> std::result::Result<Self, String> {
        let mut client = Self::new();
        let mut options = ClientOptions::default();

        if let Ok(base_url) = std::env::var("SMART_FETCH_BASE_URL") {
            if base_url.trim().is_empty() {
                return Err("SMART_FETCH_BASE_URL is set but empty".to_owned());
            }
            client = client.with_base_url(base_url.trim());
        }
        if let Ok(timeout) = std::env::var("SMART_FETCH_TIMEOUT_MS") {
            let timeout_ms = timeout
                .trim()
                .parse::<u64>()
                .map_err(|_| format!("SMART_FETCH_TIMEOUT_MS is not a number: '{timeout}'"))?;
            options.timeout = Duration::from_millis(timeout_ms);
        }
        if let Ok(retries) = std::env::var("SMART_FETCH_RETRIES") {
            options.retries = retries
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("SMART_FETCH_RETRIES is not a number: '{retries}'"))?;
        }

        Ok(client.with_options(options))
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Sends a GET request.
    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<FetchResponse> {
        self.request(path, options.method(Method::GET).body(Body::Empty))
            .await
    }

    /// Sends a POST request with `body`.
    pub async fn post(
        &self,
        path: &str,
        body: impl Into<Body>,
        options: RequestOptions,
    ) -> Result<FetchResponse> {
        self.request(path, options.method(Method::POST).body(body))
            .await
    }

    /// Sends a PUT request with `body`.
    pub async fn put(
        &self,
        path: &str,
        body: impl Into<Body>,
        options: RequestOptions,
    ) -> Result<FetchResponse> {
        self.request(path, options.method(Method::PUT).body(body))
            .await
    }

    /// Sends a PATCH request with `body`.
    pub async fn patch(
        &self,
        path: &str,
        body: impl Into<Body>,
        options: RequestOptions,
    ) -> Result<FetchResponse> {
        self.request(path, options.method(Method::PATCH).body(body))
            .await
    }

    /// Sends a DELETE request.
    pub async fn delete(&self, path: &str, options: RequestOptions) -> Result<FetchResponse> {
        self.request(path, options.method(Method::DELETE).body(Body::Empty))
            .await
    }

    /// Sends a request, retrying transient failures.
    ///
    /// 5xx, 429, timeouts and network errors are retried while the budget
    /// allows; every other non-2xx status fails immediately. At most
    /// `retries + 1` transport calls are made.
    pub async fn request(&self, path: &str, options: RequestOptions) -> Result<FetchResponse> {
        let RequestOptions {
            method,
            headers,
            query,
            body,
            timeout,
            retries,
            backoff,
            parse_json,
            cancel,
        } = options;

        let url = build_url(self.base_url.as_deref(), path, &query)?;
        let mut headers = build_headers(headers)?;
        let Encoded {
            wire,
            content_type_hint,
        } = body::encode(body)?;
        if let Some(hint) = content_type_hint {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(hint));
            }
        }

        let policy = RetryPolicy {
            timeout: timeout.unwrap_or(self.options.timeout),
            retries: retries.unwrap_or(self.options.retries),
            backoff: backoff.as_ref().unwrap_or(&self.options.backoff),
        };
        let cancel = cancel.unwrap_or_else(CancellationToken::new);
        let request = TransportRequest {
            method,
            url,
            headers,
            body: wire,
        };

        self.execute(request, &policy, parse_json, &cancel).await
    }

    async fn execute(
        &self,
        request: TransportRequest,
        policy: &RetryPolicy<'_>,
        parse_json: bool,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse> {
        let mut attempt = 0usize;
        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled { attempts: attempt });
            }
            attempt += 1;

            #[cfg(feature = "tracing")]
            tracing::debug!(
                attempt,
                method = %request.method,
                url = %request.url,
                "sending request"
            );

            let result = invoke(
                self.transport.as_ref(),
                request.clone(),
                policy.timeout,
                cancel,
            )
            .await;

            let delay = match classify(result, attempt, policy.retries, parse_json) {
                Outcome::Success(response) => return Ok(response),
                Outcome::Cancelled => return Err(FetchError::Cancelled { attempts: attempt }),
                Outcome::Terminal(failure) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempt, reason = ?failure.reason(), "request failed");
                    return Err(failure.into_error(policy.timeout, attempt));
                }
                Outcome::Retryable(_failure) => {
                    let delay = policy.backoff.delay(attempt);
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        attempt,
                        reason = ?_failure.reason(),
                        delay_ms = delay.as_millis() as u64,
                        "retrying request"
                    );
                    delay
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(FetchError::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Effective timeout and retry settings for one call.
struct RetryPolicy<'a> {
    timeout: Duration,
    retries: usize,
    backoff: &'a Backoff,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(not(feature = "tracing"), allow(dead_code))]
pub(crate) enum Reason {
    Http,
    Timeout,
    Network,
}

/// A failed attempt, with whatever detail the attempt produced.
#[derive(Debug)]
pub(crate) enum Failure {
    Http {
        response: RawResponse,
        data: ResponseData,
    },
    Timeout,
    Transport(TransportError),
}

impl Failure {
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    pub(crate) fn reason(&self) -> Reason {
        match self {
            Self::Http { .. } => Reason::Http,
            Self::Timeout => Reason::Timeout,
            Self::Transport(_) => Reason::Network,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::Http { response, .. } => is_retryable_status(response.status),
            Self::Timeout => true,
            Self::Transport(err) => !err.is_invalid(),
        }
    }

    fn into_error(self, timeout: Duration, attempts: usize) -> FetchError {
        match self {
            Self::Http { response, data } => FetchError::Http {
                status: response.status,
                data,
                response: Box::new(response),
                attempts,
            },
            Self::Timeout => FetchError::Timeout { timeout, attempts },
            Self::Transport(err) => FetchError::Transport(err),
        }
    }
}

#[derive(Debug)]
pub(crate) enum Outcome {
    Success(FetchResponse),
    Retryable(Failure),
    Terminal(Failure),
    Cancelled,
}

/// Decides what happens after attempt number `attempt` (1-based).
pub(crate) fn classify(
    result: AttemptResult,
    attempt: usize,
    retries: usize,
    parse_json: bool,
) -> Outcome {
    let failure = match result {
        AttemptResult::Cancelled => return Outcome::Cancelled,
        AttemptResult::Completed(response) => {
            let data = decode_body(&response, parse_json);
            if response.status.is_success() {
                return Outcome::Success(FetchResponse::new(response, data));
            }
            Failure::Http { response, data }
        }
        AttemptResult::TimedOut => Failure::Timeout,
        AttemptResult::Failed(err) => Failure::Transport(err),
    };

    if failure.is_retryable() && attempt <= retries {
        Outcome::Retryable(failure)
    } else {
        Outcome::Terminal(failure)
    }
}

fn build_headers(pairs: Vec<(String, String)>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| FetchError::InvalidHeader { name: name.clone() })?;
        let header_value =
            HeaderValue::from_str(&value).map_err(|_| FetchError::InvalidHeader { name })?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}
