use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;

use crate::{FetchError, Result};

pub(crate) const JSON_CONTENT_TYPE: &str = "application/json";

/// Request payload as supplied by the caller.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    /// Already-serialized text.
    Text(String),
    Bytes(Vec<u8>),
    /// `application/x-www-form-urlencoded` pairs.
    Form(Vec<(String, String)>),
    Multipart(Multipart),
    /// Structured data, serialized as JSON on the wire.
    Json(serde_json::Value),
}

impl Body {
    /// Builds a structured body from any serializable value.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(FetchError::Encode)
    }

    pub fn form<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Form(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl From<()> for Body {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<Multipart> for Body {
    fn from(value: Multipart) -> Self {
        Self::Multipart(value)
    }
}

/// Buffered `multipart/form-data` payload.
///
/// Kept in memory so the same body can be sent again on retry.
#[derive(Clone, Debug, PartialEq)]
pub struct Multipart {
    boundary: String,
    parts: Vec<Part>,
}

#[derive(Clone, Debug, PartialEq)]
struct Part {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

impl Multipart {
    pub fn new() -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();
        Self {
            boundary: format!("smart-fetch-{suffix}"),
            parts: Vec::new(),
        }
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part {
            name: name.into(),
            filename: None,
            content_type: None,
            data: value.into().into_bytes(),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        self.parts.push(Part {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
            data: data.into(),
        });
        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for part in &self.parts {
            out.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            let mut disposition = format!(
                "Content-Disposition: form-data; name=\"{}\"",
                escape_quoted(&part.name)
            );
            if let Some(filename) = &part.filename {
                disposition.push_str(&format!("; filename=\"{}\"", escape_quoted(filename)));
            }
            out.extend_from_slice(disposition.as_bytes());
            out.extend_from_slice(b"\r\n");
            if let Some(content_type) = &part.content_type {
                out.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
            }
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(&part.data);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        out
    }
}

impl Default for Multipart {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\r', '\n'], " ")
}

/// Body ready for the transport.
#[derive(Clone, Debug, PartialEq)]
pub enum WireBody {
    Text(String),
    Bytes(Vec<u8>),
    Form(Vec<(String, String)>),
    Multipart(Multipart),
}

impl WireBody {
    /// Content type a platform transport attaches when the caller set none.
    pub fn intrinsic_content_type(&self) -> Option<String> {
        match self {
            Self::Text(_) => Some("text/plain;charset=UTF-8".to_owned()),
            Self::Bytes(_) => None,
            Self::Form(_) => Some("application/x-www-form-urlencoded;charset=UTF-8".to_owned()),
            Self::Multipart(multipart) => Some(multipart.content_type()),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.clone().into_bytes(),
            Self::Bytes(bytes) => bytes.clone(),
            Self::Form(pairs) => url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish()
                .into_bytes(),
            Self::Multipart(multipart) => multipart.to_bytes(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Encoded {
    pub wire: Option<WireBody>,
    /// Applied only when the caller did not set `Content-Type`.
    pub content_type_hint: Option<&'static str>,
}

pub(crate) fn encode(body: Body) -> Result<Encoded> {
    let (wire, content_type_hint) = match body {
        Body::Empty => (None, None),
        Body::Text(text) => (Some(WireBody::Text(text)), None),
        Body::Bytes(bytes) => (Some(WireBody::Bytes(bytes)), None),
        Body::Form(pairs) => (Some(WireBody::Form(pairs)), None),
        Body::Multipart(multipart) => (Some(WireBody::Multipart(multipart)), None),
        Body::Json(value) => {
            let text = serde_json::to_string(&value).map_err(FetchError::Encode)?;
            (Some(WireBody::Text(text)), Some(JSON_CONTENT_TYPE))
        }
    };
    Ok(Encoded {
        wire,
        content_type_hint,
    })
}
