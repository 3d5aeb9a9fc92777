//! Wrapper around metrics registry.

use prometheus_client::{encoding::text, registry::Registry as RegistryInner};

use std::{fmt, sync::Arc};

use crate::{
    collector::{Collector, ResourceCollector, ScrapePolicy},
    gauge::GaugeDescriptor,
    metrics::ScrapeMetrics,
};

/// Metrics registry holding collectors and the exporter self-metrics.
pub struct Registry {
    inner: RegistryInner,
    collectors: Vec<Collector>,
    scrape_metrics: ScrapeMetrics,
}

impl fmt::Debug for Registry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let collector_names: Vec<_> = self.collectors.iter().map(Collector::name).collect();
        formatter
            .debug_struct("Registry")
            .field("collectors", &collector_names)
            .finish_non_exhaustive()
    }
}

impl Default for Registry {
    fn default() -> Self {
        let mut inner = RegistryInner::default();
        let scrape_metrics = ScrapeMetrics::default();
        scrape_metrics.register(&mut inner);
        Self {
            inner,
            collectors: vec![],
            scrape_metrics,
        }
    }
}

impl Registry {
    /// Registers a collector and returns a handle for it.
    pub fn register(&mut self, resource: impl ResourceCollector) -> Collector {
        let collector = Collector::new(Arc::new(resource), self.scrape_metrics.clone());
        for family in collector.families() {
            self.inner.register_collector(Box::new(family.clone()));
        }
        tracing::debug!(
            collector = collector.name(),
            policy = ?collector.policy(),
            "Registered collector `{}`",
            collector.name()
        );
        self.collectors.push(collector.clone());
        collector
    }

    /// Returns all registered collectors.
    pub fn collectors(&self) -> &[Collector] {
        &self.collectors
    }

    /// Returns exporter self-metrics.
    pub fn scrape_metrics(&self) -> &ScrapeMetrics {
        &self.scrape_metrics
    }

    /// Returns descriptors of all gauge families of registered collectors.
    pub fn descriptors(&self) -> impl Iterator<Item = &GaugeDescriptor> + '_ {
        self.collectors.iter().flat_map(Collector::describe)
    }

    /// Encodes all metrics using the OpenMetrics text format. Collectors with
    /// the [`ScrapePolicy::OnRead`] policy are scraped first; if a scrape fails,
    /// the previous snapshot of its metrics is encoded.
    ///
    /// # Errors
    ///
    /// Proxies formatting errors of the provided `writer`.
    pub async fn encode<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        for collector in &self.collectors {
            if collector.policy() == ScrapePolicy::OnRead {
                collector.scrape().await.ok();
            }
        }
        text::encode(writer, &self.inner)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        collector::{RunnersCollector, RunsCollector},
        testonly::MockApi,
    };

    #[tokio::test]
    async fn encoding_registry() {
        let api = MockApi::default();
        for (status, count) in [("queued", 1), ("in_progress", 2), ("completed", 3)] {
            api.set_json(
                &format!("/repos/owner/repo/actions/runs?status={status}&per_page=1"),
                json!({ "total_count": count }),
            );
        }
        let mut registry = Registry::default();
        registry.register(RunnersCollector::new(api.client()));
        registry.register(RunsCollector::new(api.client()));

        let descriptor_names: Vec<_> = registry
            .descriptors()
            .map(|descriptor| descriptor.name)
            .collect();
        assert_eq!(descriptor_names, ["github_actions_runners", "github_actions_runs"]);

        let mut buffer = String::new();
        registry.encode(&mut buffer).await.unwrap();
        let lines: Vec<_> = buffer.lines().collect();

        // Background collector hasn't been scraped, so only its metadata is present.
        assert!(lines.contains(&"# TYPE github_actions_runners gauge"), "{lines:#?}");
        assert!(!buffer.contains("github_actions_runners{"), "{buffer}");
        let runs_line = r#"github_actions_runs{repository="owner/repo",status="completed"} 3.0"#;
        assert!(lines.contains(&runs_line), "{lines:#?}");
        let duration_line =
            r#"github_actions_exporter_scrape_duration_seconds_count{collector="runs"} 1"#;
        assert!(lines.contains(&duration_line), "{lines:#?}");
        assert_eq!(lines.last(), Some(&"# EOF"));

        // Only the on-read collector is scraped.
        assert_eq!(api.take_requests().len(), 3);
    }

    #[tokio::test]
    async fn scrape_errors_are_exported() {
        let api = MockApi::default();
        let mut registry = Registry::default();
        let collector = registry.register(RunnersCollector::new(api.client()));
        collector.scrape().await.unwrap_err();
        assert_eq!(registry.scrape_metrics().error_count("runners"), 1);

        let mut buffer = String::new();
        registry.encode(&mut buffer).await.unwrap();
        let errors_line = r#"github_actions_exporter_scrape_errors_total{collector="runners"} 1"#;
        assert!(buffer.contains(errors_line), "{buffer}");
    }
}
