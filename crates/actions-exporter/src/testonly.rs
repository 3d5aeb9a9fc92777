//! Test doubles shared by unit tests.

use actions_client::{
    BoxFuture, ResilientClient, ResponseBody, RetryPolicy, Transport, TransportError,
};
use bytes::Bytes;
use http::{HeaderMap, Request, Response, StatusCode};
use http_body_util::{BodyExt as _, Empty, Full};

use std::{
    collections::HashMap,
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::github::ApiClient;

#[derive(Debug, Clone)]
pub(crate) enum MockReply {
    Json(StatusCode, String),
    Temporary,
}

#[derive(Debug)]
pub(crate) struct RecordedRequest {
    pub path_and_query: String,
    pub headers: HeaderMap,
}

#[derive(Debug, Default)]
struct MockApiInner {
    routes: Mutex<HashMap<String, MockReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
    latency: Mutex<Duration>,
}

/// In-memory GitHub API. Replies are keyed by the path and query of the request;
/// unknown routes are answered with 404.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockApi(Arc<MockApiInner>);

impl MockApi {
    pub fn set(&self, path_and_query: &str, reply: MockReply) {
        self.0
            .routes
            .lock()
            .unwrap()
            .insert(path_and_query.to_owned(), reply);
    }

    pub fn set_json(&self, path_and_query: &str, value: serde_json::Value) {
        self.set(path_and_query, MockReply::Json(StatusCode::OK, value.to_string()));
    }

    /// Delays every reply by `latency` (using Tokio time, so it works with paused time).
    pub fn set_latency(&self, latency: Duration) {
        *self.0.latency.lock().unwrap() = latency;
    }

    pub fn take_requests(&self) -> Vec<RecordedRequest> {
        std::mem::take(&mut *self.0.requests.lock().unwrap())
    }

    /// Creates a client for the `owner/repo` repository without retries.
    pub fn client(&self) -> ApiClient<Self> {
        let http = ResilientClient::new(self.clone(), RetryPolicy::Never);
        ApiClient::new(http, "http://api.test/", "owner/repo", "secret")
    }
}

impl Transport for MockApi {
    fn round_trip(
        &self,
        request: Request<Empty<Bytes>>,
    ) -> BoxFuture<'_, Result<Response<ResponseBody>, TransportError>> {
        let path_and_query = request
            .uri()
            .path_and_query()
            .map_or_else(String::new, ToString::to_string);
        let reply = self.0.routes.lock().unwrap().get(&path_and_query).cloned();
        self.0.requests.lock().unwrap().push(RecordedRequest {
            path_and_query,
            headers: request.headers().clone(),
        });

        let latency = *self.0.latency.lock().unwrap();

        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let (status, body) = match reply {
                Some(MockReply::Json(status, body)) => (status, body),
                Some(MockReply::Temporary) => {
                    let err = io::Error::from(io::ErrorKind::ConnectionReset);
                    return Err(TransportError::classify(err));
                }
                None => (StatusCode::NOT_FOUND, r#"{"message":"Not Found"}"#.to_owned()),
            };
            let body = Full::new(Bytes::from(body))
                .map_err(|never| match never {})
                .boxed_unsync();
            Ok(Response::builder().status(status).body(body).unwrap())
        })
    }
}
