use url::Url;

use crate::Result;

/// Base used to resolve relative paths when the client has no base address.
const FALLBACK_BASE: &str = "http://localhost";

/// Single query-string value.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryValue {
    /// Omitted from the URL.
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl QueryValue {
    pub fn null() -> Self {
        Self::Null
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Literal text form, or `None` for [`QueryValue::Null`].
    pub fn to_query_string(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Text(value) => Some(value.clone()),
            Self::Integer(value) => Some(value.to_string()),
            Self::Float(value) => Some(value.to_string()),
            Self::Bool(value) => Some(value.to_string()),
        }
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Builds the absolute request URL.
///
/// `http://` and `https://` paths are used as-is, anything else is resolved
/// against `base`. Non-null query values replace every parameter of the same
/// key already present in `path`.
pub fn build_url(base: Option<&str>, path: &str, query: &[(String, QueryValue)]) -> Result<Url> {
    let mut url = if is_absolute(path) {
        Url::parse(path)?
    } else {
        Url::parse(base.unwrap_or(FALLBACK_BASE))?.join(path)?
    };

    let updates: Vec<(&str, String)> = query
        .iter()
        .filter_map(|(key, value)| Some((key.as_str(), value.to_query_string()?)))
        .collect();
    if updates.is_empty() {
        return Ok(url);
    }

    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    for (key, value) in updates {
        set_pair(&mut pairs, key, value);
    }
    url.query_pairs_mut().clear().extend_pairs(&pairs);
    Ok(url)
}

fn is_absolute(path: &str) -> bool {
    ["http://", "https://"].iter().any(|scheme| {
        path.get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

/// Replaces the first `key` in place and drops the rest, or appends.
fn set_pair(pairs: &mut Vec<(String, String)>, key: &str, value: String) {
    match pairs.iter().position(|(existing, _)| existing == key) {
        Some(index) => {
            pairs[index].1 = value;
            let mut seen = 0usize;
            pairs.retain(|(existing, _)| {
                if existing != key {
                    return true;
                }
                seen += 1;
                seen == 1
            });
        }
        None => pairs.push((key.to_owned(), value)),
    }
}
