//! Minimal GitHub REST API client for the Actions resources of a single repository.

use actions_client::{HyperTransport, ResilientClient, Transport};
use bytes::Bytes;
use http::HeaderValue;
use http_body_util::BodyExt as _;
use hyper::{header, Request, Uri};
use serde::{de::DeserializeOwned, Deserialize};

use std::{collections::HashMap, fmt, time::Duration};

use crate::error::{body_excerpt, FetchError};

/// Default base URL of the GitHub REST API.
pub const DEFAULT_API_URL: &str = "https://api.github.com";
/// Page size used for paginated list endpoints (the maximum allowed by GitHub).
pub const PER_PAGE: u64 = 100;

const ACCEPT: &str = "application/vnd.github+json";
const USER_AGENT: &str = concat!("github-actions-exporter/", env!("CARGO_PKG_VERSION"));

/// Self-hosted runner registered for a repository.
#[derive(Debug, Clone, Deserialize)]
pub struct Runner {
    /// Runner ID.
    pub id: u64,
    /// Runner name.
    #[serde(default)]
    pub name: String,
    /// Runner status, e.g. `online`.
    pub status: String,
}

/// Workflow defined in a repository.
#[derive(Debug, Clone, Deserialize)]
pub struct Workflow {
    /// Workflow ID.
    pub id: u64,
    /// Workflow name.
    pub name: String,
    /// Workflow state, e.g. `active`.
    pub state: String,
}

/// Billable time of a workflow in the current billing cycle.
#[derive(Debug, Default, Deserialize)]
pub struct WorkflowTiming {
    /// Billable time per runner OS (e.g., `UBUNTU`).
    #[serde(default)]
    pub billable: HashMap<String, BillableTime>,
}

impl WorkflowTiming {
    /// Returns the billable time summed across all runner OSes.
    pub fn total(&self) -> Duration {
        let total_ms = self
            .billable
            .values()
            .fold(0_u64, |acc, time| acc.saturating_add(time.total_ms));
        Duration::from_millis(total_ms)
    }
}

/// Billable time for a single runner OS.
#[derive(Debug, Default, Deserialize)]
pub struct BillableTime {
    /// Billable time in milliseconds.
    #[serde(default)]
    pub total_ms: u64,
}

/// Page of a paginated list endpoint.
trait Paged: DeserializeOwned {
    type Item;

    fn total_count(&self) -> Option<u64>;

    fn into_items(self) -> Vec<Self::Item>;
}

#[derive(Debug, Deserialize)]
struct RunnersPage {
    total_count: Option<u64>,
    #[serde(default)]
    runners: Vec<Runner>,
}

impl Paged for RunnersPage {
    type Item = Runner;

    fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    fn into_items(self) -> Vec<Runner> {
        self.runners
    }
}

#[derive(Debug, Deserialize)]
struct WorkflowsPage {
    total_count: Option<u64>,
    #[serde(default)]
    workflows: Vec<Workflow>,
}

impl Paged for WorkflowsPage {
    type Item = Workflow;

    fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    fn into_items(self) -> Vec<Workflow> {
        self.workflows
    }
}

/// Only the count is decoded; the runs themselves are ignored.
#[derive(Debug, Deserialize)]
struct CountResponse {
    total_count: Option<u64>,
}

/// Decoded JSON response together with its raw body.
#[derive(Debug)]
struct JsonResponse<R> {
    uri: Uri,
    body: Bytes,
    value: R,
}

impl<R> JsonResponse<R> {
    fn bad_response(&self) -> FetchError {
        FetchError::BadResponse {
            uri: self.uri.clone(),
            body: body_excerpt(&self.body),
        }
    }
}

/// GitHub API client bound to a single repository and credential.
///
/// All requests go through a [`ResilientClient`], so temporary network failures are retried
/// according to its policy. Responses with error status codes are never retried.
pub struct ApiClient<T = HyperTransport> {
    http: ResilientClient<T>,
    base_url: String,
    repository: String,
    token: String,
}

impl<T> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            repository: self.repository.clone(),
            token: self.token.clone(),
        }
    }
}

impl<T: Transport> fmt::Debug for ApiClient<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ApiClient")
            .field("http", &self.http)
            .field("base_url", &self.base_url)
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ApiClient<T> {
    /// Creates a client. `base_url` is the API root, such as [`DEFAULT_API_URL`]; `repository`
    /// has the `owner/name` form.
    pub fn new(
        http: ResilientClient<T>,
        base_url: &str,
        repository: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            repository: repository.into(),
            token: token.into(),
        }
    }

    /// Returns the repository this client is bound to.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Fetches all self-hosted runners of the repository.
    ///
    /// # Errors
    ///
    /// Returns an error if fetching any page fails.
    pub async fn runners(&self) -> Result<Vec<Runner>, FetchError> {
        self.fetch_all_pages::<RunnersPage>("runners").await
    }

    /// Fetches all workflows of the repository.
    ///
    /// # Errors
    ///
    /// Returns an error if fetching any page fails.
    pub async fn workflows(&self) -> Result<Vec<Workflow>, FetchError> {
        self.fetch_all_pages::<WorkflowsPage>("workflows").await
    }

    /// Fetches the number of workflow runs with the specified status.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response has no `total_count`.
    pub async fn runs_count(&self, status: &str) -> Result<u64, FetchError> {
        let path = format!(
            "/repos/{}/actions/runs?status={status}&per_page=1",
            self.repository
        );
        let response = self.get_json::<CountResponse>(&path).await?;
        response
            .value
            .total_count
            .ok_or_else(|| response.bad_response())
    }

    /// Fetches the billable time of the workflow with the specified ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn workflow_timing(&self, workflow_id: u64) -> Result<WorkflowTiming, FetchError> {
        let path = format!(
            "/repos/{}/actions/workflows/{workflow_id}/timing",
            self.repository
        );
        Ok(self.get_json(&path).await?.value)
    }

    /// Walks a paginated list endpoint until the advertised total count is covered.
    async fn fetch_all_pages<P: Paged>(&self, resource: &str) -> Result<Vec<P::Item>, FetchError> {
        let mut items = Vec::new();
        for page in 1_u64.. {
            let path = format!(
                "/repos/{}/actions/{resource}?per_page={PER_PAGE}&page={page}",
                self.repository
            );
            let response = self.get_json::<P>(&path).await?;
            let Some(total_count) = response.value.total_count() else {
                return Err(response.bad_response());
            };

            let page_items = response.value.into_items();
            let page_len = page_items.len();
            items.extend(page_items);
            tracing::debug!(
                resource,
                page,
                page_len,
                total_count,
                "Fetched page #{page} of `{resource}` ({page_len} items, {total_count} total)"
            );

            if page_len == 0 || total_count <= PER_PAGE.saturating_mul(page) {
                break;
            }
        }
        Ok(items)
    }

    async fn get_json<R: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<JsonResponse<R>, FetchError> {
        let url = format!("{}{path}", self.base_url);
        let request = self
            .build_request(&url)
            .map_err(|source| FetchError::RequestConstruction { url, source })?;
        let uri = request.uri().clone();

        let response = self.http.execute(&request).await?;
        let status = response.status();
        let body = match response.into_body().collect().await {
            Ok(body) => body.to_bytes(),
            Err(source) => return Err(FetchError::ReadBody { uri, source }),
        };

        if !status.is_success() {
            return Err(FetchError::Status {
                uri,
                status,
                body: body_excerpt(&body),
            });
        }
        match serde_json::from_slice(&body) {
            Ok(value) => Ok(JsonResponse { uri, body, value }),
            Err(source) => Err(FetchError::Decode { uri, source }),
        }
    }

    fn build_request(&self, url: &str) -> Result<Request<()>, http::Error> {
        let mut authorization = HeaderValue::try_from(format!("token {}", self.token))?;
        authorization.set_sensitive(true);
        Request::get(url)
            .header(header::AUTHORIZATION, authorization)
            .header(header::ACCEPT, ACCEPT)
            .header(header::USER_AGENT, USER_AGENT)
            .body(())
    }
}
