//! Self-hosted runners by status.

use actions_client::{BoxFuture, HyperTransport, Transport};

use super::{count_by_label, known_values, repository_gauges, ResourceCollector, ScrapePolicy};
use crate::{
    error::FetchError,
    gauge::{GaugeDescriptor, GaugeFamily},
    github::ApiClient,
};

/// Runner statuses reported by GitHub.
pub const RUNNER_STATUSES: &[&str] = &["offline", "online"];

/// Collector of the `github_actions_runners` gauge family. Runners are paginated, so this
/// collector is scraped in background.
#[derive(Debug)]
pub struct RunnersCollector<T: Transport = HyperTransport> {
    api: ApiClient<T>,
    known_statuses: Vec<String>,
    runners: GaugeFamily,
}

impl<T: Transport> RunnersCollector<T> {
    /// Creates a collector using the provided API client.
    pub fn new(api: ApiClient<T>) -> Self {
        Self {
            api,
            known_statuses: known_values(RUNNER_STATUSES),
            runners: GaugeFamily::new(GaugeDescriptor {
                name: "github_actions_runners",
                help: "Number of self-hosted runners of the repository by status",
                unit: None,
                labels: &["repository", "status"],
            }),
        }
    }

    /// Overrides the statuses that are always reported, with zero count if absent.
    #[must_use]
    pub fn with_known_statuses(mut self, statuses: &[&str]) -> Self {
        self.known_statuses = known_values(statuses);
        self
    }

    async fn scrape_runners(&self) -> Result<(), FetchError> {
        let runners = self.api.runners().await?;
        let counts = count_by_label(
            self.name(),
            &self.known_statuses,
            runners.iter().map(|runner| runner.status.as_str()),
        );
        tracing::debug!(
            repository = self.api.repository(),
            runner_count = runners.len(),
            "Fetched runners: {counts:?}"
        );
        self.runners
            .publish(repository_gauges(self.api.repository(), counts));
        Ok(())
    }
}

impl<T: Transport> ResourceCollector for RunnersCollector<T> {
    fn name(&self) -> &'static str {
        "runners"
    }

    fn policy(&self) -> ScrapePolicy {
        ScrapePolicy::Background
    }

    fn families(&self) -> Vec<GaugeFamily> {
        vec![self.runners.clone()]
    }

    fn scrape(&self) -> BoxFuture<'_, Result<(), FetchError>> {
        Box::pin(self.scrape_runners())
    }
}
