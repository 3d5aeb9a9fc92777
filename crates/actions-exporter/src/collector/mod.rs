//! Collectors of GitHub Actions resources.
//!
//! A collector fetches a resource kind from the GitHub API, aggregates it into categorical counts
//! and publishes them as [`GaugeFamily`] snapshots. Each collector has a [`ScrapePolicy`]:
//! cheap resources are scraped synchronously on each metrics read, while paginated ones are
//! scraped by a background loop and reads return the latest snapshot.

use actions_client::BoxFuture;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

pub use self::{
    runners::{RunnersCollector, RUNNER_STATUSES},
    runs::{RunsCollector, RUN_STATUSES},
    workflows::{WorkflowsCollector, WORKFLOW_STATES},
};
use crate::{
    error::FetchError,
    gauge::{GaugeDescriptor, GaugeFamily, LabelValues},
    instance::wait_for_stop,
    metrics::ScrapeMetrics,
};

mod runners;
mod runs;
mod workflows;


/// Metrics namespace shared by all collectors.
pub const NAMESPACE: &str = "github_actions";

/// When a collector is scraped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapePolicy {
    /// By a background loop started with [`Collector::start_loop()`].
    Background,
    /// Before each read of the metrics.
    OnRead,
}

/// Resource-specific part of a collector: fetching and aggregation.
pub trait ResourceCollector: fmt::Debug + Send + Sync + 'static {
    /// Returns the collector name used in logs and internal metrics.
    fn name(&self) -> &'static str;

    /// Returns the scrape policy for this resource kind.
    fn policy(&self) -> ScrapePolicy;

    /// Returns gauge families owned by this collector.
    fn families(&self) -> Vec<GaugeFamily>;

    /// Fetches the resource and publishes aggregated snapshots into the owned families.
    /// On error, nothing must be published.
    fn scrape(&self) -> BoxFuture<'_, Result<(), FetchError>>;
}

/// Single observation yielded by [`Collector::collect()`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Exported family name, including the unit suffix.
    pub family: String,
    /// Label values, in the order of the family labels.
    pub labels: LabelValues,
    /// Gauge value.
    pub value: f64,
}

/// Handle for a registered [`ResourceCollector`].
#[derive(Debug, Clone)]
pub struct Collector {
    resource: Arc<dyn ResourceCollector>,
    families: Vec<GaugeFamily>,
    metrics: ScrapeMetrics,
    scrape_lock: Arc<Mutex<()>>,
}

impl Collector {
    pub(crate) fn new(resource: Arc<dyn ResourceCollector>, metrics: ScrapeMetrics) -> Self {
        let families = resource.families();
        Self {
            resource,
            families,
            metrics,
            scrape_lock: Arc::default(),
        }
    }

    /// Returns the collector name.
    pub fn name(&self) -> &'static str {
        self.resource.name()
    }

    /// Returns the scrape policy of this collector.
    pub fn policy(&self) -> ScrapePolicy {
        self.resource.policy()
    }

    pub(crate) fn families(&self) -> &[GaugeFamily] {
        &self.families
    }

    /// Yields static metadata of all families. Never touches the network.
    ///
    /// Descriptor names exclude unit suffixes; use [`GaugeDescriptor::exported_name()`]
    /// to get names as they appear in the exported metrics.
    pub fn describe(&self) -> impl Iterator<Item = &GaugeDescriptor> + '_ {
        self.families.iter().map(GaugeFamily::descriptor)
    }

    /// Yields the current snapshot of all families. For [`ScrapePolicy::OnRead`] collectors,
    /// performs a scrape first; if it fails, the previous snapshot is returned.
    pub async fn collect(&self) -> Vec<Sample> {
        if self.policy() == ScrapePolicy::OnRead {
            self.scrape().await.ok();
        }

        let mut samples = vec![];
        for family in &self.families {
            let name = family.descriptor().exported_name();
            samples.extend(family.snapshot().into_iter().map(|(labels, value)| Sample {
                family: name.clone(),
                labels,
                value,
            }));
        }
        samples
    }

    /// Performs a single scrape. Scrapes of the same collector never run concurrently.
    ///
    /// Errors are logged and recorded in the internal metrics before being returned.
    ///
    /// # Errors
    ///
    /// Proxies the scrape error.
    pub async fn scrape(&self) -> Result<(), FetchError> {
        let _guard = self.scrape_lock.lock().await;
        let name = self.name();
        let started_at = Instant::now();
        let result = self.resource.scrape().await;
        let latency = started_at.elapsed();
        self.metrics.observe_duration(name, latency);

        match &result {
            Ok(()) => {
                tracing::debug!(
                    collector = name,
                    latency_sec = latency.as_secs_f64(),
                    "Scraped collector `{name}` in {latency:?}"
                );
            }
            Err(err) => {
                self.metrics.record_error(name);
                tracing::error!(%err, collector = name, "Failed scraping collector `{name}`");
            }
        }
        result
    }

    /// Spawns a loop scraping this collector immediately and then every `interval`, until
    /// `stop` is set to `true` or its sender is dropped.
    ///
    /// Ticks missed because of a slow scrape are skipped rather than queued. A scrape in progress
    /// when stop is signalled runs to completion; no new scrape is started after that.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn start_loop(&self, interval: Duration, stop: watch::Receiver<bool>) -> JoinHandle<()> {
        assert!(!interval.is_zero(), "collector loop interval must be positive");
        let this = self.clone();
        tokio::spawn(async move { this.run_loop(interval, stop).await })
    }

    async fn run_loop(self, interval: Duration, mut stop: watch::Receiver<bool>) {
        let name = self.name();
        tracing::info!(
            collector = name,
            "Starting `{name}` collector loop with interval {interval:?}"
        );

        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                () = wait_for_stop(&mut stop) => break,
                _ = timer.tick() => {
                    self.scrape().await.ok();
                }
            }
        }
        tracing::info!(collector = name, "Stopped `{name}` collector loop");
    }
}

/// Counts `values`. Each of `known` values is present in the output, with a zero count
/// if it wasn't encountered. Unknown values are counted as well and logged.
pub(crate) fn count_by_label<'a>(
    collector: &'static str,
    known: &[String],
    values: impl IntoIterator<Item = &'a str>,
) -> BTreeMap<String, u64> {
    let mut counts: BTreeMap<_, _> = known.iter().map(|value| (value.clone(), 0_u64)).collect();
    for value in values {
        if let Some(count) = counts.get_mut(value) {
            *count += 1;
        } else {
            counts.insert(value.to_owned(), 1);
        }
    }

    for (value, count) in &counts {
        if !known.contains(value) {
            tracing::warn!(
                collector,
                value = value.as_str(),
                count,
                "Collector `{collector}` encountered unknown label value `{value}`"
            );
        }
    }
    counts
}

pub(crate) fn repository_gauges(
    repository: &str,
    counts: BTreeMap<String, u64>,
) -> BTreeMap<LabelValues, f64> {
    counts
        .into_iter()
        .map(|(label, count)| {
            #[allow(clippy::cast_precision_loss)] // counts are far below 2^52
            let value = count as f64;
            (vec![repository.to_owned(), label], value)
        })
        .collect()
}

fn known_values(values: &[&str]) -> Vec<String> {
    values.iter().map(|&value| value.to_owned()).collect()
}
