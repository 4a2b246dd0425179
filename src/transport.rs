use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Method,
};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{RawResponse, TransportError, WireBody};

/// Everything needed to issue one network call.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<WireBody>,
}

/// Performs exactly one network call.
///
/// Implementations must stop work once `cancel` fires. The executor also
/// drops the returned future on timeout, so work tied to the future stops
/// either way.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(
        &self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> Result<RawResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn call(
        &self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        (**self).call(request, cancel).await
    }
}

/// Default transport backed by `reqwest`.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured `reqwest` client (proxies, TLS roots, ...).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn call(
        &self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        let TransportRequest {
            method,
            url,
            mut headers,
            body,
        } = request;

        let mut builder = self.http.request(method, url);
        if let Some(body) = body {
            if !headers.contains_key(CONTENT_TYPE) {
                if let Some(value) = body
                    .intrinsic_content_type()
                    .and_then(|value| HeaderValue::from_str(&value).ok())
                {
                    headers.insert(CONTENT_TYPE, value);
                }
            }
            builder = builder.body(body.to_bytes());
        }
        let builder = builder.headers(headers);

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let url = response.url().clone();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>(RawResponse::new(status, headers, body.to_vec()).with_url(url))
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::aborted("request aborted")),
            result = exchange => result.map_err(TransportError::from),
        }
    }
}

/// Result of one attempt, before retry classification.
#[derive(Debug)]
pub(crate) enum AttemptResult {
    Completed(RawResponse),
    TimedOut,
    Failed(TransportError),
    Cancelled,
}

/// Runs one transport call under `timeout`.
///
/// The attempt gets its own child of `cancel`. The child is cancelled when
/// this function returns, whichever branch won.
pub(crate) async fn invoke(
    transport: &dyn Transport,
    request: TransportRequest,
    timeout: Duration,
    cancel: &CancellationToken,
) -> AttemptResult {
    let attempt_token = cancel.child_token();
    let _release = attempt_token.clone().drop_guard();

    tokio::select! {
        biased;
        _ = cancel.cancelled() => AttemptResult::Cancelled,
        result = transport.call(request, attempt_token.clone()) => match result {
            Ok(response) => AttemptResult::Completed(response),
            Err(_) if cancel.is_cancelled() => AttemptResult::Cancelled,
            Err(err) if err.is_abort() => AttemptResult::TimedOut,
            Err(err) => AttemptResult::Failed(err),
        },
        _ = tokio::time::sleep(timeout) => AttemptResult::TimedOut,
    }
}
