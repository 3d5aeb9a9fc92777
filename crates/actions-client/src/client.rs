//! `ResilientClient` and its error type.

use bytes::Bytes;
use http_body_util::Empty;
use hyper::{Method, Request, Response, Uri};

use std::{fmt, sync::Arc};

use crate::{
    retry::{ExponentialBackOff, RetryPolicy},
    transport::{HyperTransport, ResponseBody, Transport, TransportConfig, TransportError},
};

/// Terminal error returned by [`ResilientClient::execute()`].
#[derive(Debug, thiserror::Error)]
#[error("failed to request `{method} {uri}` (attempts: {attempts}): {source}")]
pub struct ClientError {
    method: Method,
    uri: Uri,
    attempts: u32,
    #[source]
    source: TransportError,
}

impl ClientError {
    /// Returns the total number of attempts made, including the initial one.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Checks whether the last transport error was temporary. Such an error is returned once
    /// the retry strategy declines to retry it, which for [`RetryPolicy::Never`] happens
    /// on the first attempt.
    pub fn is_temporary(&self) -> bool {
        self.source.is_temporary()
    }

    /// Returns the last transport error.
    pub fn transport_error(&self) -> &TransportError {
        &self.source
    }
}

/// HTTP client repeating requests that failed with a [temporary](TransportError::is_temporary())
/// transport error according to a [`RetryPolicy`].
///
/// Every call to [`Self::execute()`] gets its own retry strategy derived from the policy,
/// so concurrent requests never share attempt counters. Back-off sleeps only suspend
/// the calling task. HTTP responses are returned as-is, whatever their status code;
/// status-based policies are up to the caller.
pub struct ResilientClient<T = HyperTransport> {
    transport: Arc<T>,
    retry_policy: RetryPolicy,
}

impl<T> Clone for ResilientClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            retry_policy: self.retry_policy.clone(),
        }
    }
}

impl<T: Transport> fmt::Debug for ResilientClient<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ResilientClient")
            .field("transport", &self.transport)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

impl ResilientClient {
    /// Creates a client over the default HTTPS transport.
    pub fn from_config(transport: TransportConfig, retry_policy: RetryPolicy) -> Self {
        Self::new(HyperTransport::new(transport), retry_policy)
    }
}

impl Default for ResilientClient {
    /// Default transport with exponential back-off (10ms base, 3 retries, uniform jitter).
    fn default() -> Self {
        let retry_policy = ExponentialBackOff::new(std::time::Duration::from_millis(10), 3);
        Self::from_config(TransportConfig::default(), retry_policy.into())
    }
}

impl<T: Transport> ResilientClient<T> {
    /// Wraps the provided transport.
    pub fn new(transport: T, retry_policy: RetryPolicy) -> Self {
        Self {
            transport: Arc::new(transport),
            retry_policy,
        }
    }

    /// Returns a reference to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Executes the request described by `request`, retrying temporary failures.
    ///
    /// The request has no body, so it can be freely reissued; only its method, URI, version
    /// and headers are used.
    ///
    /// # Errors
    ///
    /// Returns an error if a non-temporary transport error occurs, or if the retry policy
    /// is exhausted.
    pub async fn execute(
        &self,
        request: &Request<()>,
    ) -> Result<Response<ResponseBody>, ClientError> {
        let mut strategy = self.retry_policy.strategy();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match self.transport.round_trip(reissue(request)).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            let delay = if err.is_temporary() {
                strategy.next_delay()
            } else {
                None
            };
            let Some(delay) = delay else {
                return Err(ClientError {
                    method: request.method().clone(),
                    uri: request.uri().clone(),
                    attempts,
                    source: err,
                });
            };

            tracing::debug!(
                %err,
                uri = %request.uri(),
                attempts,
                "Temporary failure requesting `{}`; retrying in {delay:?}",
                request.uri()
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn reissue(template: &Request<()>) -> Request<Empty<Bytes>> {
    let mut request = Request::new(Empty::new());
    *request.method_mut() = template.method().clone();
    *request.uri_mut() = template.uri().clone();
    *request.version_mut() = template.version();
    *request.headers_mut() = template.headers().clone();
    request
}
