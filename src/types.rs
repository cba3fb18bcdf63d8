use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::{RequestError, Result};

/// HTTP verbs the client issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Fully resolved request for a single attempt.
///
/// This is the value request interceptors receive and return. A retry builds
/// a fresh descriptor with `retry` decremented by one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Absolute target URL.
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout_ms: u64,
    /// Remaining retry budget for this logical call.
    pub retry: u32,
}

impl RequestDescriptor {
    /// Returns a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Inserts a header, replacing any existing entry with the same
    /// case-insensitive name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|key, _| !key.eq_ignore_ascii_case(&name));
        self.headers.insert(name, value.into());
    }
}

/// Response metadata handed to response interceptors next to the decoded body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseMeta {
    pub status: u16,
    pub status_text: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

impl ResponseMeta {
    pub(crate) fn from_response(response: &reqwest::Response) -> Self {
        let status = response.status();
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_owned(), value.to_owned());
            }
        }

        Self {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_owned(),
            url: response.url().to_string(),
            headers,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_json(&self) -> bool {
        self.content_type()
            .is_some_and(|value| value.to_ascii_lowercase().contains("application/json"))
    }
}

/// Decoded response body.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedBody {
    /// Body of a response whose content-type contains `application/json`.
    Json(JsonValue),
    /// Any other body, returned verbatim.
    Text(String),
}

impl ParsedBody {
    pub(crate) fn decode(meta: &ResponseMeta, text: String) -> Result<Self> {
        if !meta.is_json() {
            return Ok(Self::Text(text));
        }
        serde_json::from_str(&text).map(Self::Json).map_err(|err| {
            RequestError::Decode(format!("invalid JSON response body: {err}; body: {text}"))
        })
    }

    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            Self::Json(_) => None,
        }
    }

    /// Deserializes a JSON body into `T`.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Self::Json(value) => serde_json::from_value(value)
                .map_err(|err| RequestError::Decode(format!("unexpected response shape: {err}"))),
            Self::Text(text) => Err(RequestError::Decode(format!(
                "expected a JSON response body, got text: {text}"
            ))),
        }
    }
}

impl From<ParsedBody> for JsonValue {
    fn from(body: ParsedBody) -> Self {
        match body {
            ParsedBody::Json(value) => value,
            ParsedBody::Text(text) => JsonValue::String(text),
        }
    }
}
