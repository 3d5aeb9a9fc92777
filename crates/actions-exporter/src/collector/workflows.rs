//! Workflows by state and their billable time.

use actions_client::{BoxFuture, HyperTransport, Transport};
use prometheus_client::registry::Unit;

use std::{collections::BTreeMap, time::Duration};

use super::{count_by_label, known_values, repository_gauges, ResourceCollector, ScrapePolicy};
use crate::{
    error::FetchError,
    gauge::{GaugeDescriptor, GaugeFamily},
    github::ApiClient,
};

/// Workflow states reported by GitHub.
pub const WORKFLOW_STATES: &[&str] = &[
    "active",
    "deleted",
    "disabled_fork",
    "disabled_inactivity",
    "disabled_manually",
];

/// Collector of the `github_actions_workflows` and `github_actions_workflow_billable_time_seconds`
/// gauge families. Scraping requires paginating workflows and an extra request per workflow,
/// so this collector is scraped in background.
#[derive(Debug)]
pub struct WorkflowsCollector<T: Transport = HyperTransport> {
    api: ApiClient<T>,
    known_states: Vec<String>,
    workflows: GaugeFamily,
    billable_time: GaugeFamily,
}

impl<T: Transport> WorkflowsCollector<T> {
    /// Creates a collector using the provided API client.
    pub fn new(api: ApiClient<T>) -> Self {
        Self {
            api,
            known_states: known_values(WORKFLOW_STATES),
            workflows: GaugeFamily::new(GaugeDescriptor {
                name: "github_actions_workflows",
                help: "Number of workflows of the repository by state",
                unit: None,
                labels: &["repository", "state"],
            }),
            billable_time: GaugeFamily::new(GaugeDescriptor {
                name: "github_actions_workflow_billable_time",
                help: "Billable time of each workflow in the current billing cycle",
                unit: Some(Unit::Seconds),
                labels: &["repository", "name"],
            }),
        }
    }

    /// Overrides the states that are always reported, with zero count if absent.
    #[must_use]
    pub fn with_known_states(mut self, states: &[&str]) -> Self {
        self.known_states = known_values(states);
        self
    }

    async fn scrape_workflows(&self) -> Result<(), FetchError> {
        let repository = self.api.repository();
        let workflows = self.api.workflows().await?;
        let counts = count_by_label(
            self.name(),
            &self.known_states,
            workflows.iter().map(|workflow| workflow.state.as_str()),
        );

        let mut billable_time = BTreeMap::<_, Duration>::new();
        for workflow in &workflows {
            let timing = match self.api.workflow_timing(workflow.id).await {
                Ok(timing) => timing,
                Err(err) => {
                    tracing::error!(
                        %err,
                        repository,
                        workflow_id = workflow.id,
                        "Failed to fetch billable time for workflow `{}`",
                        workflow.name
                    );
                    continue;
                }
            };
            // Workflow names are not unique; time of same-named workflows is summed.
            *billable_time.entry(workflow.name.clone()).or_default() += timing.total();
        }

        tracing::debug!(
            repository,
            workflow_count = workflows.len(),
            "Fetched workflows: {counts:?}"
        );
        self.workflows.publish(repository_gauges(repository, counts));
        self.billable_time.publish(
            billable_time
                .into_iter()
                .map(|(name, time)| (vec![repository.to_owned(), name], time.as_secs_f64()))
                .collect(),
        );
        Ok(())
    }
}

impl<T: Transport> ResourceCollector for WorkflowsCollector<T> {
    fn name(&self) -> &'static str {
        "workflows"
    }

    fn policy(&self) -> ScrapePolicy {
        ScrapePolicy::Background
    }

    fn families(&self) -> Vec<GaugeFamily> {
        vec![self.workflows.clone(), self.billable_time.clone()]
    }

    fn scrape(&self) -> BoxFuture<'_, Result<(), FetchError>> {
        Box::pin(self.scrape_workflows())
    }
}
