use std::{fmt, time::Duration};

use reqwest::StatusCode;

use crate::{RawResponse, ResponseData};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Base address or path could not be parsed into a URL.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Header name or value is not valid HTTP.
    #[error("invalid header `{name}`")]
    InvalidHeader { name: String },
    /// Request body could not be serialized.
    #[error("body encode error: {0}")]
    Encode(serde_json::Error),
    /// Non-success HTTP status from the last attempt.
    #[error("http error {status}")]
    Http {
        status: StatusCode,
        /// Decoded error body.
        data: ResponseData,
        /// Raw response of the last attempt.
        response: Box<RawResponse>,
        attempts: usize,
    },
    /// Every permitted attempt ran past its deadline.
    #[error("request timed out after {timeout:?} ({attempts} attempt(s))")]
    Timeout { timeout: Duration, attempts: usize },
    /// The transport failed without producing a response.
    ///
    /// The original error is kept untouched inside [`TransportError`].
    #[error("transport error: {0}")]
    Transport(TransportError),
    /// The caller's cancellation token fired.
    #[error("request cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: usize },
    /// Decoded body could not be converted into the requested type.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Coarse classification of a [`FetchError`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// URL, header or body could not be built. Never retried.
    MalformedInput,
    Timeout,
    Network,
    /// Non-retryable status: 4xx other than 429, and anything else outside
    /// 2xx that is not a server error.
    HttpClient,
    /// 5xx or 429 after the retry budget ran out.
    HttpServer,
    Cancelled,
    Decode,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl(_) | Self::InvalidHeader { .. } | Self::Encode(_) => {
                ErrorKind::MalformedInput
            }
            Self::Http { status, .. } if is_retryable_status(*status) => ErrorKind::HttpServer,
            Self::Http { .. } => ErrorKind::HttpClient,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Transport(err) if err.is_invalid() => ErrorKind::MalformedInput,
            Self::Transport(_) => ErrorKind::Network,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Decode(_) => ErrorKind::Decode,
        }
    }

    /// HTTP status of the last attempt, if a response was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Decoded body of the last error response.
    pub fn data(&self) -> Option<&ResponseData> {
        match self {
            Self::Http { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Raw response of the last attempt.
    pub fn response(&self) -> Option<&RawResponse> {
        match self {
            Self::Http { response, .. } => Some(response),
            _ => None,
        }
    }

    /// Number of transport invocations made before the error was returned.
    ///
    /// Malformed input and decode errors never reach the transport and report
    /// `None`; transport errors do not carry a count either.
    pub fn attempts(&self) -> Option<usize> {
        match self {
            Self::Http { attempts, .. }
            | Self::Timeout { attempts, .. }
            | Self::Cancelled { attempts } => Some(*attempts),
            _ => None,
        }
    }

    /// Returns `true` when the server answered with a non-success status.
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// 5xx and 429 are the statuses worth another attempt.
pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TransportErrorKind {
    Aborted,
    Network,
    Invalid,
}

/// Failure reported by a [`Transport`](crate::Transport) implementation.
///
/// Wraps the implementation's own error so callers can downcast it.
pub struct TransportError {
    kind: TransportErrorKind,
    source: BoxError,
}

impl TransportError {
    /// The call was aborted before it settled. Treated like a timeout.
    pub fn aborted(source: impl Into<BoxError>) -> Self {
        Self::new(TransportErrorKind::Aborted, source)
    }

    /// Connection, DNS, TLS or I/O failure. Retried while budget remains.
    pub fn network(source: impl Into<BoxError>) -> Self {
        Self::new(TransportErrorKind::Network, source)
    }

    /// The request could not be constructed. Never retried.
    pub fn invalid(source: impl Into<BoxError>) -> Self {
        Self::new(TransportErrorKind::Invalid, source)
    }

    fn new(kind: TransportErrorKind, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    pub fn is_abort(&self) -> bool {
        self.kind == TransportErrorKind::Aborted
    }

    pub fn is_invalid(&self) -> bool {
        self.kind == TransportErrorKind::Invalid
    }

    pub fn get_ref(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.source.as_ref()
    }

    /// Returns the original error.
    pub fn into_inner(self) -> BoxError {
        self.source
    }

    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref::<E>()
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::aborted(err)
        } else if err.is_builder() {
            Self::invalid(err)
        } else {
            Self::network(err)
        }
    }
}

impl fmt::Debug for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportError")
            .field("kind", &self.kind)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.source, f)
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}
