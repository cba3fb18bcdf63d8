use std::collections::BTreeMap;

use crate::Method;

/// Client-wide defaults, read at the start of every request attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientConfig {
    /// Prefix applied to every non-absolute request path.
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Fixed delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
    /// Logs every request, response and error when set.
    pub debug: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_owned(),
            timeout_ms: 30_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
            debug: false,
        }
    }
}

impl ClientConfig {
    /// Creates a config with default timeout/retry values for `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Reads the config from environment variables.
    ///
    /// Reads:
    /// - `PORTAL_API_BASE_URL`: required
    /// - `PORTAL_API_TIMEOUT_MS`, `PORTAL_API_MAX_RETRIES`,
    ///   `PORTAL_API_RETRY_DELAY_MS`: optional integers
    /// - `PORTAL_API_DEBUG`: optional, `1` or `true` enables debug logging
    pub fn from_env() -> std::result::Result<Self, String> {
        let base_url = std::env::var("PORTAL_API_BASE_URL")
            .map_err(|_| "missing PORTAL_API_BASE_URL environment variable".to_owned())?;
        if base_url.trim().is_empty() {
            return Err("PORTAL_API_BASE_URL is set but empty".to_owned());
        }

        let mut config = Self::new(base_url.trim());
        if let Some(value) = env_number("PORTAL_API_TIMEOUT_MS")? {
            config.timeout_ms = value;
        }
        if let Some(value) = env_number("PORTAL_API_MAX_RETRIES")? {
            config.max_retries = value;
        }
        if let Some(value) = env_number("PORTAL_API_RETRY_DELAY_MS")? {
            config.retry_delay_ms = value;
        }
        if let Ok(value) = std::env::var("PORTAL_API_DEBUG") {
            config.debug = parse_flag(&value);
        }
        Ok(config)
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> std::result::Result<Option<T>, String> {
    match std::env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("{name} must be a non-negative integer, got '{raw}'")),
        Err(_) => Ok(None),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Per-call overrides merged over the [`ClientConfig`] defaults.
///
/// Unset fields fall back to the client default; headers merge per name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub method: Option<Method>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout_ms: Option<u64>,
    pub retry: Option<u32>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Sets the retry budget for this call, overriding `max_retries`.
    pub fn retry(mut self, retry: u32) -> Self {
        self.retry = Some(retry);
        self
    }
}
