use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tokio::time::sleep;

use crate::{
    events::{ClientEvent, EventSink, NoopEventSink},
    interceptor::InterceptorChain,
    registry::{InFlightGuard, InFlightRegistry},
    ClientConfig, Method, ParsedBody, RequestDescriptor, RequestError, RequestInterceptor,
    RequestOptions, ResponseInterceptor, ResponseMeta, Result,
};

/// Result of a single attempt.
#[derive(Debug)]
enum RequestOutcome {
    Success(ParsedBody),
    /// Retryable error with budget left for another attempt.
    RetryableFailure(RequestError),
    TerminalFailure(RequestError),
}

/// HTTP client every portal controller talks to the backend through.
///
/// Clones share configuration, interceptors, the in-flight registry and the
/// event sink, so one client built at startup can be handed to every
/// collaborator.
#[derive(Clone)]
pub struct RequestClient {
    http: reqwest::Client,
    config: Arc<RwLock<ClientConfig>>,
    interceptors: Arc<InterceptorChain>,
    registry: Arc<InFlightRegistry>,
    events: Arc<dyn EventSink>,
}

impl fmt::Debug for RequestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestClient")
            .field("config", &*self.config.read())
            .field("request_interceptors", &self.interceptors.request_count())
            .field("response_interceptors", &self.interceptors.response_count())
            .field("in_flight", &self.registry.len())
            .finish()
    }
}

impl RequestClient {
    /// Creates a client that publishes no events.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config: Arc::new(RwLock::new(config)),
            interceptors: Arc::new(InterceptorChain::default()),
            registry: Arc::new(InFlightRegistry::default()),
            events: Arc::new(NoopEventSink),
        }
    }

    /// Creates a client from `PORTAL_API_*` environment variables.
    ///
    /// See [`ClientConfig::from_env`] for the variables read.
    pub fn from_env() -> std::result::Result<Self, String> {
        ClientConfig::from_env().map(Self::new)
    }

    /// Routes terminal-failure events to `sink`.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Returns a snapshot of the current client-wide defaults.
    pub fn config(&self) -> ClientConfig {
        self.config.read().clone()
    }

    pub fn set_debug(&self, debug: bool) {
        self.config.write().debug = debug;
    }

    pub fn set_base_url(&self, base_url: impl Into<String>) {
        self.config.write().base_url = base_url.into();
    }

    pub fn set_timeout_ms(&self, timeout_ms: u64) {
        self.config.write().timeout_ms = timeout_ms;
    }

    pub fn set_max_retries(&self, max_retries: u32) {
        self.config.write().max_retries = max_retries;
    }

    pub fn set_retry_delay_ms(&self, retry_delay_ms: u64) {
        self.config.write().retry_delay_ms = retry_delay_ms;
    }

    /// Appends a request interceptor. Interceptors run in the order added.
    pub fn add_request_interceptor(&self, interceptor: Arc<dyn RequestInterceptor>) {
        self.interceptors.push_request(interceptor);
    }

    /// Appends a response interceptor. Interceptors run in the order added.
    pub fn add_response_interceptor(&self, interceptor: Arc<dyn ResponseInterceptor>) {
        self.interceptors.push_response(interceptor);
    }

    /// Cancels every in-flight attempt and clears the registry.
    ///
    /// Each cancelled call settles with [`RequestError::Cancelled`]. Calls
    /// waiting out a retry delay are not registered and are unaffected.
    pub fn cancel_all_requests(&self) -> usize {
        let cancelled = self.registry.cancel_all();
        if cancelled > 0 {
            tracing::info!(cancelled, "cancelled in-flight requests");
        }
        cancelled
    }

    /// Number of attempts currently on the wire.
    pub fn in_flight_count(&self) -> usize {
        self.registry.len()
    }

    /// Sends a `GET` request.
    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<ParsedBody> {
        self.request(path, options.method(Method::Get)).await
    }

    /// Sends a `POST` request with `data` as the JSON body.
    ///
    /// Data serializing to `null` (`None`, `()`) sends no body.
    pub async fn post<B>(&self, path: &str, data: &B, options: RequestOptions) -> Result<ParsedBody>
    where
        B: Serialize + ?Sized,
    {
        let options = with_json_body(options.method(Method::Post), data)?;
        self.request(path, options).await
    }

    /// Sends a `PUT` request with `data` as the JSON body.
    pub async fn put<B>(&self, path: &str, data: &B, options: RequestOptions) -> Result<ParsedBody>
    where
        B: Serialize + ?Sized,
    {
        let options = with_json_body(options.method(Method::Put), data)?;
        self.request(path, options).await
    }

    /// Sends a `DELETE` request.
    pub async fn delete(&self, path: &str, options: RequestOptions) -> Result<ParsedBody> {
        self.request(path, options.method(Method::Delete)).await
    }

    /// Queries `/health`, converting any failure into a degraded status.
    ///
    /// Never returns an error: on failure the result is
    /// `{"healthy": false, "status": "error", "message": "Connection failed", "error": ..}`.
    pub async fn check_health(&self) -> JsonValue {
        match self.get("/health", RequestOptions::new()).await {
            Ok(body) => body.into(),
            Err(err) => json!({
                "healthy": false,
                "status": "error",
                "message": "Connection failed",
                "error": err.to_string(),
            }),
        }
    }

    /// Sends a request and returns the decoded body.
    ///
    /// `path` is appended to the configured base URL unless it is already an
    /// absolute URL. Network failures, timeouts and 5xx responses are retried
    /// after a fixed delay while the retry budget lasts. Terminal failures
    /// publish [`ClientEvent::DataError`] before being returned.
    pub async fn request(&self, path: &str, options: RequestOptions) -> Result<ParsedBody> {
        let mut retry = None;
        loop {
            let config = self.config();
            let descriptor = self.prepare(path, &options, retry, &config).await?;
            let method = descriptor.method;
            let remaining = descriptor.retry;

            match self.attempt(path, descriptor, &config).await {
                RequestOutcome::Success(body) => return Ok(body),
                RequestOutcome::RetryableFailure(err) => {
                    tracing::debug!(
                        endpoint = path,
                        method = %method,
                        remaining,
                        delay_ms = config.retry_delay_ms,
                        error = %err,
                        "retrying request"
                    );
                    sleep(Duration::from_millis(config.retry_delay_ms)).await;
                    retry = Some(remaining.saturating_sub(1));
                }
                RequestOutcome::TerminalFailure(err) => {
                    self.report_failure(path, method, &err);
                    return Err(err);
                }
            }
        }
    }

    /// Builds the descriptor for one attempt and runs request interceptors.
    async fn prepare(
        &self,
        path: &str,
        options: &RequestOptions,
        retry: Option<u32>,
        config: &ClientConfig,
    ) -> Result<RequestDescriptor> {
        let url = resolve_url(&config.base_url, path);
        let descriptor = build_descriptor(url.clone(), options, retry, config);
        self.interceptors.apply_request(&url, descriptor).await
    }

    async fn attempt(
        &self,
        path: &str,
        descriptor: RequestDescriptor,
        config: &ClientConfig,
    ) -> RequestOutcome {
        let retry = descriptor.retry;
        let guard = self.registry.register(descriptor.method, path);
        let result = self.execute(&guard, descriptor, config.debug).await;
        drop(guard);

        match result {
            Ok(body) => RequestOutcome::Success(body),
            Err(err) => {
                if config.debug {
                    tracing::info!(endpoint = path, error = %err, "api error");
                }
                if err.is_retryable() && retry > 0 {
                    RequestOutcome::RetryableFailure(err)
                } else {
                    RequestOutcome::TerminalFailure(err)
                }
            }
        }
    }

    async fn execute(
        &self,
        guard: &InFlightGuard,
        descriptor: RequestDescriptor,
        debug: bool,
    ) -> Result<ParsedBody> {
        if debug {
            tracing::info!(
                request_id = guard.id(),
                method = %descriptor.method,
                endpoint = %descriptor.url,
                body = descriptor.body.as_deref().unwrap_or_default(),
                "api request"
            );
        }

        let timeout_ms = descriptor.timeout_ms;
        let (meta, body) = tokio::select! {
            biased;
            _ = guard.token().cancelled() => return Err(RequestError::Cancelled),
            _ = sleep(Duration::from_millis(timeout_ms)) => return Err(RequestError::Timeout { timeout_ms }),
            result = self.send(descriptor) => result?,
        };

        if debug {
            tracing::info!(
                request_id = guard.id(),
                status = meta.status,
                endpoint = %meta.url,
                payload = ?body,
                "api response"
            );
        }

        tokio::select! {
            biased;
            _ = guard.token().cancelled() => Err(RequestError::Cancelled),
            result = self.interceptors.apply_response(body, &meta) => {
                if guard.token().is_cancelled() {
                    return Err(RequestError::Cancelled);
                }
                result
            }
        }
    }

    async fn send(&self, descriptor: RequestDescriptor) -> Result<(ResponseMeta, ParsedBody)> {
        let headers = to_header_map(&descriptor.headers)?;
        let mut builder = self
            .http
            .request(descriptor.method.into(), descriptor.url.as_str())
            .headers(headers);
        if let Some(body) = descriptor.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(RequestError::from_transport)?;
        let meta = ResponseMeta::from_response(&response);
        let text = response.text().await.map_err(RequestError::from_transport)?;

        if !(200..300).contains(&meta.status) {
            return Err(RequestError::Http {
                status: meta.status,
                status_text: meta.status_text.clone(),
                body: text,
            });
        }

        let body = ParsedBody::decode(&meta, text)?;
        Ok((meta, body))
    }

    fn report_failure(&self, path: &str, method: Method, err: &RequestError) {
        tracing::warn!(endpoint = path, method = %method, error = %err, "request failed");
        self.events.publish(ClientEvent::DataError {
            endpoint: path.to_owned(),
            error: err.to_string(),
            method: method.as_str().to_owned(),
        });
    }
}

/// Joins `path` onto `base_url` unless `path` is already an absolute URL.
fn resolve_url(base_url: &str, path: &str) -> String {
    let absolute = url::Url::parse(path).is_ok_and(|url| url.has_host());
    if absolute {
        path.to_owned()
    } else {
        format!("{base_url}{path}")
    }
}

/// Seeds a descriptor from config, then lays caller options over it.
///
/// `retry` is the decremented budget of a retry attempt and wins over the
/// caller's `options.retry`.
fn build_descriptor(
    url: String,
    options: &RequestOptions,
    retry: Option<u32>,
    config: &ClientConfig,
) -> RequestDescriptor {
    let mut descriptor = RequestDescriptor {
        method: options.method.unwrap_or(Method::Get),
        url,
        headers: BTreeMap::from([("Content-Type".to_owned(), "application/json".to_owned())]),
        body: options.body.clone(),
        timeout_ms: options.timeout_ms.unwrap_or(config.timeout_ms),
        retry: retry.or(options.retry).unwrap_or(config.max_retries),
    };
    for (name, value) in &options.headers {
        descriptor.set_header(name.clone(), value.clone());
    }
    descriptor
}

fn with_json_body<B>(mut options: RequestOptions, data: &B) -> Result<RequestOptions>
where
    B: Serialize + ?Sized,
{
    let value = serde_json::to_value(data)
        .map_err(|err| RequestError::InvalidRequest(format!("body is not serializable: {err}")))?;
    if !value.is_null() {
        options.body = Some(value.to_string());
    }
    Ok(options)
}

fn to_header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
            RequestError::InvalidRequest(format!("invalid header name '{name}': {err}"))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|err| {
            RequestError::InvalidRequest(format!("invalid value for header '{name}': {err}"))
        })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::{build_descriptor, resolve_url, to_header_map, with_json_body, RequestClient};
    use crate::{ClientConfig, Method, RequestError, RequestOptions};

    fn config() -> ClientConfig {
        ClientConfig {
            base_url: "http://api.local/api".to_owned(),
            timeout_ms: 1_500,
            max_retries: 2,
            retry_delay_ms: 10,
            debug: false,
        }
    }

    #[test]
    fn relative_paths_are_appended_to_base_url() {
        assert_eq!(
            resolve_url("http://api.local/api", "/test-suites"),
            "http://api.local/api/test-suites"
        );
    }

    #[test]
    fn absolute_urls_pass_through() {
        assert_eq!(
            resolve_url("http://api.local/api", "https://other.local/health"),
            "https://other.local/health"
        );
    }

    #[test]
    fn defaults_are_seeded_from_config() {
        let descriptor = build_descriptor(
            "http://api.local/api/x".to_owned(),
            &RequestOptions::new(),
            None,
            &config(),
        );

        assert_eq!(descriptor.method, Method::Get);
        assert_eq!(descriptor.header("content-type"), Some("application/json"));
        assert_eq!(descriptor.body, None);
        assert_eq!(descriptor.timeout_ms, 1_500);
        assert_eq!(descriptor.retry, 2);
    }

    #[test]
    fn caller_options_win_field_by_field() {
        let options = RequestOptions::new()
            .method(Method::Delete)
            .header("content-type", "text/plain")
            .header("X-Trace", "abc")
            .timeout_ms(5)
            .retry(0);
        let descriptor =
            build_descriptor("http://api.local/api/x".to_owned(), &options, None, &config());

        assert_eq!(descriptor.method, Method::Delete);
        assert_eq!(descriptor.headers.len(), 2);
        assert_eq!(descriptor.header("Content-Type"), Some("text/plain"));
        assert_eq!(descriptor.header("x-trace"), Some("abc"));
        assert_eq!(descriptor.timeout_ms, 5);
        assert_eq!(descriptor.retry, 0);
    }

    #[test]
    fn retry_attempts_carry_the_decremented_budget() {
        let options = RequestOptions::new().retry(3);
        let descriptor =
            build_descriptor("http://api.local/x".to_owned(), &options, Some(1), &config());
        assert_eq!(descriptor.retry, 1);
    }

    #[test]
    fn json_body_is_serialized_and_null_is_omitted() {
        let options = with_json_body(RequestOptions::new(), &json!({"x": 1})).expect("serializes");
        assert_eq!(options.body.as_deref(), Some(r#"{"x":1}"#));

        let options = with_json_body(RequestOptions::new(), &Option::<u8>::None).expect("serializes");
        assert_eq!(options.body, None);
    }

    #[test]
    fn invalid_header_name_is_a_caller_error() {
        let headers = BTreeMap::from([("bad header".to_owned(), "x".to_owned())]);
        let err = to_header_map(&headers).expect_err("must reject");
        assert!(matches!(err, RequestError::InvalidRequest(_)));
    }

    #[test]
    fn setters_are_shared_between_clones() {
        let client = RequestClient::new(config());
        let clone = client.clone();
        clone.set_debug(true);
        clone.set_retry_delay_ms(1);

        let seen = client.config();
        assert!(seen.debug);
        assert_eq!(seen.retry_delay_ms, 1);
    }

    #[test]
    fn debug_output_reports_counts() {
        let client = RequestClient::new(config());
        let debug = format!("{client:?}");
        assert!(debug.contains("in_flight: 0"));
        assert!(debug.contains("request_interceptors: 0"));
    }
}
