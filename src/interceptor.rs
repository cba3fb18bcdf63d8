use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{ParsedBody, RequestDescriptor, ResponseMeta, Result};

/// Transforms every outgoing request before it reaches the network.
///
/// Interceptors run in registration order; the descriptor returned by one is
/// the input of the next. Returning an error aborts the call without a retry.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    /// Name used in logs and in [`crate::RequestError::Interceptor`].
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn transform_request(
        &self,
        url: &str,
        descriptor: RequestDescriptor,
    ) -> Result<RequestDescriptor>;
}

/// Transforms every decoded response body before it is returned to the caller.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn transform_response(
        &self,
        body: ParsedBody,
        response: &ResponseMeta,
    ) -> Result<ParsedBody>;
}

/// Request interceptor that sets one header on every request.
#[derive(Clone, Debug)]
pub struct SetHeader {
    name: String,
    value: String,
}

impl SetHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl RequestInterceptor for SetHeader {
    fn name(&self) -> &str {
        "set-header"
    }

    async fn transform_request(
        &self,
        _url: &str,
        mut descriptor: RequestDescriptor,
    ) -> Result<RequestDescriptor> {
        descriptor.set_header(self.name.clone(), self.value.clone());
        Ok(descriptor)
    }
}

/// Append-only interceptor lists shared by every clone of a client.
#[derive(Default)]
pub(crate) struct InterceptorChain {
    request: RwLock<Vec<Arc<dyn RequestInterceptor>>>,
    response: RwLock<Vec<Arc<dyn ResponseInterceptor>>>,
}

impl InterceptorChain {
    pub(crate) fn push_request(&self, interceptor: Arc<dyn RequestInterceptor>) {
        self.request.write().push(interceptor);
    }

    pub(crate) fn push_response(&self, interceptor: Arc<dyn ResponseInterceptor>) {
        self.response.write().push(interceptor);
    }

    pub(crate) fn request_count(&self) -> usize {
        self.request.read().len()
    }

    pub(crate) fn response_count(&self) -> usize {
        self.response.read().len()
    }

    /// Folds the descriptor through every request interceptor, left to right.
    pub(crate) async fn apply_request(
        &self,
        url: &str,
        mut descriptor: RequestDescriptor,
    ) -> Result<RequestDescriptor> {
        // Snapshot so the lock is not held across awaits.
        let interceptors = self.request.read().clone();
        for interceptor in interceptors {
            tracing::trace!(interceptor = interceptor.name(), "applying request interceptor");
            descriptor = interceptor.transform_request(url, descriptor).await?;
        }
        Ok(descriptor)
    }

    pub(crate) async fn apply_response(
        &self,
        mut body: ParsedBody,
        response: &ResponseMeta,
    ) -> Result<ParsedBody> {
        let interceptors = self.response.read().clone();
        for interceptor in interceptors {
            tracing::trace!(interceptor = interceptor.name(), "applying response interceptor");
            body = interceptor.transform_response(body, response).await?;
        }
        Ok(body)
    }
}
