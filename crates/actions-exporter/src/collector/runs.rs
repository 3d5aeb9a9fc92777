//! Workflow runs by status.

use actions_client::{BoxFuture, HyperTransport, Transport};

use std::collections::BTreeMap;

use super::{known_values, repository_gauges, ResourceCollector, ScrapePolicy};
use crate::{
    error::FetchError,
    gauge::{GaugeDescriptor, GaugeFamily},
    github::ApiClient,
};

/// Run statuses queried on each scrape.
pub const RUN_STATUSES: &[&str] = &["queued", "in_progress", "completed"];

/// Collector of the `github_actions_runs` gauge family.
///
/// GitHub reports the number of runs with a given status directly, so a scrape takes
/// one request per status and the collector is scraped on each metrics read.
#[derive(Debug)]
pub struct RunsCollector<T: Transport = HyperTransport> {
    api: ApiClient<T>,
    statuses: Vec<String>,
    runs: GaugeFamily,
}

impl<T: Transport> RunsCollector<T> {
    /// Creates a collector using the provided API client.
    pub fn new(api: ApiClient<T>) -> Self {
        Self {
            api,
            statuses: known_values(RUN_STATUSES),
            runs: GaugeFamily::new(GaugeDescriptor {
                name: "github_actions_runs",
                help: "Number of workflow runs of the repository by status",
                unit: None,
                labels: &["repository", "status"],
            }),
        }
    }

    /// Overrides the queried statuses.
    #[must_use]
    pub fn with_statuses(mut self, statuses: &[&str]) -> Self {
        self.statuses = known_values(statuses);
        self
    }

    async fn scrape_runs(&self) -> Result<(), FetchError> {
        let mut counts = BTreeMap::new();
        for status in &self.statuses {
            let count = self.api.runs_count(status).await?;
            counts.insert(status.clone(), count);
        }
        tracing::debug!(
            repository = self.api.repository(),
            "Fetched runs count: {counts:?}"
        );
        self.runs
            .publish(repository_gauges(self.api.repository(), counts));
        Ok(())
    }
}

impl<T: Transport> ResourceCollector for RunsCollector<T> {
    fn name(&self) -> &'static str {
        "runs"
    }

    fn policy(&self) -> ScrapePolicy {
        ScrapePolicy::OnRead
    }

    fn families(&self) -> Vec<GaugeFamily> {
        vec![self.runs.clone()]
    }

    fn scrape(&self) -> BoxFuture<'_, Result<(), FetchError>> {
        Box::pin(self.scrape_runs())
    }
}
