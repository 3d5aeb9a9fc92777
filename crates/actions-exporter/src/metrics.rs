//! Internal metrics for the exporter itself.

use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{
        counter::Counter,
        family::Family,
        histogram::{exponential_buckets, Histogram},
    },
    registry::{Registry, Unit},
};

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash, EncodeLabelSet)]
struct CollectorLabels {
    collector: &'static str,
}

fn latency_histogram() -> Histogram {
    // 1ms .. ~16s
    Histogram::new(exponential_buckets(0.001, 4.0, 8))
}

/// Scrape metrics labelled by the collector name.
#[derive(Debug, Clone)]
pub struct ScrapeMetrics {
    duration: Family<CollectorLabels, Histogram>,
    errors: Family<CollectorLabels, Counter>,
}

impl Default for ScrapeMetrics {
    fn default() -> Self {
        Self {
            duration: Family::new_with_constructor(latency_histogram),
            errors: Family::default(),
        }
    }
}

impl ScrapeMetrics {
    pub(crate) fn register(&self, registry: &mut Registry) {
        registry.register_with_unit(
            "github_actions_exporter_scrape_duration",
            "Duration of scrapes performed by the exporter collectors",
            Unit::Seconds,
            self.duration.clone(),
        );
        registry.register(
            "github_actions_exporter_scrape_errors",
            "Number of failed scrapes",
            self.errors.clone(),
        );
    }

    pub(crate) fn observe_duration(&self, collector: &'static str, latency: Duration) {
        self.duration
            .get_or_create(&CollectorLabels { collector })
            .observe(latency.as_secs_f64());
    }

    pub(crate) fn record_error(&self, collector: &'static str) {
        self.errors.get_or_create(&CollectorLabels { collector }).inc();
    }

    /// Returns the number of failed scrapes of the specified collector.
    pub fn error_count(&self, collector: &'static str) -> u64 {
        self.errors.get_or_create(&CollectorLabels { collector }).get()
    }
}
