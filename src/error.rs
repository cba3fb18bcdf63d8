/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The per-request timeout elapsed before the call completed.
    #[error("request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Non-success HTTP status code with raw response body.
    #[error("HTTP {status}: {status_text}")]
    Http {
        status: u16,
        status_text: String,
        body: String,
    },
    /// Response body could not be decoded per its content-type.
    #[error("decode error: {0}")]
    Decode(String),
    /// Cancelled through [`crate::RequestClient::cancel_all_requests`].
    #[error("request cancelled")]
    Cancelled,
    /// An interceptor rejected the request or response.
    #[error("interceptor '{name}' failed: {message}")]
    Interceptor { name: String, message: String },
    /// The request could not be built (bad URL, header or body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Failure category, fixed at the point the error is raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Timeout,
    HttpStatus(u16),
    Decode,
    Cancelled,
    /// Errors raised by the caller's own code or input.
    Caller,
}

impl RequestError {
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err)
        }
    }

    /// Builds an interceptor error with the interceptor's name attached.
    pub fn interceptor(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Interceptor {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Transport(_) => ErrorKind::Network,
            Self::Http { status, .. } => ErrorKind::HttpStatus(*status),
            Self::Decode(_) => ErrorKind::Decode,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Interceptor { .. } | Self::InvalidRequest(_) => ErrorKind::Caller,
        }
    }

    /// Network failures, timeouts and 5xx statuses are retried; nothing else is.
    pub fn is_retryable(&self) -> bool {
        match self.kind() {
            ErrorKind::Network | ErrorKind::Timeout => true,
            ErrorKind::HttpStatus(status) => (500..600).contains(&status),
            ErrorKind::Decode | ErrorKind::Cancelled | ErrorKind::Caller => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// HTTP status code for [`RequestError::Http`] errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, RequestError};

    fn http(status: u16, text: &str) -> RequestError {
        RequestError::Http {
            status,
            status_text: text.to_owned(),
            body: String::new(),
        }
    }

    #[test]
    fn server_errors_are_retryable() {
        assert!(http(500, "Internal Server Error").is_retryable());
        assert!(http(503, "Service Unavailable").is_retryable());
        assert!(http(599, "").is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        assert!(!http(400, "Bad Request").is_retryable());
        assert!(!http(404, "Not Found").is_retryable());
        assert!(!http(429, "Too Many Requests").is_retryable());
    }

    #[test]
    fn timeout_is_marked_and_retryable() {
        let err = RequestError::Timeout { timeout_ms: 250 };
        assert!(err.is_timeout());
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "request timeout after 250ms");
    }

    #[test]
    fn caller_side_failures_are_terminal() {
        assert!(!RequestError::Cancelled.is_retryable());
        assert!(!RequestError::Decode("bad".to_owned()).is_retryable());
        assert!(!RequestError::interceptor("auth", "no token").is_retryable());
        assert!(!RequestError::InvalidRequest("bad url".to_owned()).is_retryable());
    }

    #[test]
    fn http_message_carries_status_and_text() {
        let err = http(400, "Bad Request");
        assert_eq!(err.to_string(), "HTTP 400: Bad Request");
        assert_eq!(err.kind(), ErrorKind::HttpStatus(400));
        assert_eq!(err.status(), Some(400));
    }
}
