//! Transport-level HTTP clients and classification of their failures.

use bytes::Bytes;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt as _, Empty, Full};
use hyper::{Request, Response};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use std::{error, fmt, future::Future, io, pin::Pin, time::Duration};

/// Boxed error type used for response bodies and opaque transport failures.
pub type BoxError = Box<dyn error::Error + Send + Sync>;

/// Boxed future returned by [`Transport`]s.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Response body produced by all transports.
pub type ResponseBody = UnsyncBoxBody<Bytes, BoxError>;

/// Failure to obtain an HTTP response.
///
/// Transports decide whether a failure is *temporary*, i.e. caused by a transient network
/// condition so that repeating the same request may succeed. Successfully received HTTP responses
/// are never errors on this level, whatever their status code.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct TransportError {
    temporary: bool,
    #[source]
    source: BoxError,
}

impl TransportError {
    /// Creates a temporary (retryable) error.
    pub fn temporary(source: impl Into<BoxError>) -> Self {
        Self {
            temporary: true,
            source: source.into(),
        }
    }

    /// Creates a permanent error.
    pub fn permanent(source: impl Into<BoxError>) -> Self {
        Self {
            temporary: false,
            source: source.into(),
        }
    }

    /// Classifies an arbitrary error by inspecting its source chain.
    pub fn classify(source: impl Into<BoxError>) -> Self {
        let source = source.into();
        let temporary = is_transient(source.as_ref());
        Self { temporary, source }
    }

    /// Checks whether this error is temporary.
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }
}

fn is_transient(err: &(dyn error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
            ) {
                return true;
            }
        }
        if err.is::<tokio::time::error::Elapsed>() {
            return true;
        }
        current = err.source();
    }
    false
}

/// Transport sending a single HTTP request without any retries.
pub trait Transport: fmt::Debug + Send + Sync + 'static {
    /// Sends `request` and resolves to the response. Transports enforcing a timeout must apply it
    /// to reading the response body as well, so that a stalled body cannot hang the caller.
    fn round_trip(
        &self,
        request: Request<Empty<Bytes>>,
    ) -> BoxFuture<'_, Result<Response<ResponseBody>, TransportError>>;
}

/// Settings for [`HyperTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Timeout for establishing TCP connections.
    pub connect_timeout: Duration,
    /// Timeout for the entire exchange: sending the request, receiving the response head
    /// and reading the whole body.
    pub request_timeout: Duration,
    /// TCP keep-alive interval.
    pub keep_alive: Duration,
    /// Timeout after which idle pooled connections are closed.
    pub idle_timeout: Duration,
    /// Maximum number of idle connections per host.
    pub max_idle_per_host: usize,
    /// Value of the `User-Agent` header added to requests that do not specify one.
    pub user_agent: &'static str,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(3),
            keep_alive: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(10),
            max_idle_per_host: 100,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Default [`Transport`] based on the `hyper` legacy client with TLS support.
///
/// Response bodies are buffered before the response is returned, under the same
/// [request timeout](TransportConfig::request_timeout) as the response head.
/// The underlying connection pool is shared by all clones of the transport.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpsConnector<HttpConnector>, Empty<Bytes>>,
    config: TransportConfig,
}

impl fmt::Debug for HyperTransport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HyperTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Creates a transport with the specified configuration. TLS connections are verified
    /// against the bundled Mozilla root certificates.
    pub fn new(config: TransportConfig) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(config.connect_timeout));
        http.set_keepalive(Some(config.keep_alive));

        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.idle_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build(https);
        Self { client, config }
    }
}

impl Transport for HyperTransport {
    fn round_trip(
        &self,
        mut request: Request<Empty<Bytes>>,
    ) -> BoxFuture<'_, Result<Response<ResponseBody>, TransportError>> {
        if !request.headers().contains_key(http::header::USER_AGENT) {
            request.headers_mut().insert(
                http::header::USER_AGENT,
                http::HeaderValue::from_static(self.config.user_agent),
            );
        }

        Box::pin(async move {
            let exchange = async {
                let response = self
                    .client
                    .request(request)
                    .await
                    .map_err(TransportError::classify)?;
                let (parts, body) = response.into_parts();
                let body = body
                    .collect()
                    .await
                    .map_err(TransportError::classify)?
                    .to_bytes();
                Ok::<_, TransportError>(Response::from_parts(parts, body))
            };
            let response = tokio::time::timeout(self.config.request_timeout, exchange)
                .await
                .map_err(TransportError::temporary)??;
            Ok(response.map(|body| {
                Full::new(body)
                    .map_err(|never| -> BoxError { match never {} })
                    .boxed_unsync()
            }))
        })
    }
}
