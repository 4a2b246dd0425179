use reqwest::{
    header::{self, HeaderMap},
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

use crate::{FetchError, Result};

/// Fully buffered response as produced by a [`Transport`](crate::Transport).
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Final URL after redirects, when the transport knows it.
    pub url: Option<Url>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            url: None,
            body: body.into(),
        }
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Declared `Content-Type`, if present and valid UTF-8.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Body as text. Invalid UTF-8 sequences are replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body decoded as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Response body after content negotiation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    Json(serde_json::Value),
    Text(String),
}

impl ResponseData {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json(_))
    }

    /// Converts the decoded body into `T`.
    ///
    /// Text bodies are parsed as JSON first.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        let decoded = match self {
            Self::Json(value) => T::deserialize(value),
            Self::Text(text) => serde_json::from_str(text),
        };
        decoded.map_err(|err| FetchError::Decode(err.to_string()))
    }
}

/// Successful response returned by [`FetchClient`](crate::FetchClient).
#[derive(Clone, Debug)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub data: ResponseData,
    pub raw: RawResponse,
}

impl FetchResponse {
    pub(crate) fn new(raw: RawResponse, data: ResponseData) -> Self {
        Self {
            status: raw.status,
            headers: raw.headers.clone(),
            data,
            raw,
        }
    }

    /// Converts the decoded body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        self.data.deserialize()
    }
}
