//! `portal-http` is the async request client the portal front ends use to
//! talk to their backend API.
//!
//! Every outbound call goes through [`RequestClient::request`], which adds:
//! - a per-call timeout and bulk cancellation ([`RequestClient::cancel_all_requests`])
//! - fixed-delay retries for network, timeout and 5xx failures
//! - ordered request/response interceptors
//! - a [`ClientEvent::DataError`] published on every terminal failure

mod client;
mod error;
mod events;
mod interceptor;
mod options;
mod registry;
mod types;

pub use client::RequestClient;
pub use error::{ErrorKind, RequestError};
pub use events::{BroadcastEventSink, ClientEvent, EventSink, NoopEventSink};
pub use interceptor::{RequestInterceptor, ResponseInterceptor, SetHeader};
pub use options::{ClientConfig, RequestOptions};
pub use types::{Method, ParsedBody, RequestDescriptor, ResponseMeta};

pub type Result<T> = std::result::Result<T, RequestError>;
