//! Prometheus exporter for GitHub Actions.
//!
//! The exporter polls the GitHub REST API for the runners, workflow runs and workflows
//! of a single repository, aggregates them into categorical counts and exposes the counts
//! as gauges in the OpenMetrics text format.
//!
//! # Overview
//!
//! - [`ApiClient`] performs authorized requests on top of a
//!   [`ResilientClient`](actions_client::ResilientClient) and walks paginated endpoints.
//! - Each [`ResourceCollector`] fetches a single resource kind and publishes aggregated
//!   [`GaugeFamily`] snapshots. Snapshots are replaced as a whole, so a failed scrape leaves
//!   previously published values intact.
//! - A [`Registry`] holds [`Collector`]s. Collectors with the [`ScrapePolicy::OnRead`] policy
//!   are scraped on each metrics read; other collectors are scraped by background loops.
//! - An [`Instance`] runs [`Processor`]s (the metrics and health listeners) and shuts them down
//!   within a grace period.
//!
//! # Metrics
//!
//! | Name | Labels |
//! |------|--------|
//! | `github_actions_runners` | `repository`, `status` |
//! | `github_actions_runs` | `repository`, `status` |
//! | `github_actions_workflows` | `repository`, `state` |
//! | `github_actions_workflow_billable_time_seconds` | `repository`, `name` |
//! | `github_actions_exporter_scrape_duration_seconds` | `collector` |
//! | `github_actions_exporter_scrape_errors_total` | `collector` |

// Linter settings.
#![warn(missing_debug_implementations, missing_docs, bare_trait_objects)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

pub use crate::{
    collector::{
        Collector, ResourceCollector, RunnersCollector, RunsCollector, Sample, ScrapePolicy,
        WorkflowsCollector, NAMESPACE, RUNNER_STATUSES, RUN_STATUSES, WORKFLOW_STATES,
    },
    config::{Cli, Command, ConfigError, ExporterConfig, ServerArgs},
    error::FetchError,
    exporter::Exporter,
    gauge::{GaugeDescriptor, GaugeFamily, LabelValues, Snapshot},
    github::{ApiClient, BillableTime, Runner, Workflow, WorkflowTiming, DEFAULT_API_URL, PER_PAGE},
    instance::{Instance, Processor, GRACE_PERIOD},
    metrics::ScrapeMetrics,
    processor::{ApiProcessor, MonitorProcessor, OPEN_METRICS_CONTENT_TYPE},
    registry::Registry,
};

mod collector;
mod config;
mod error;
mod exporter;
mod gauge;
mod github;
mod instance;
mod metrics;
mod processor;
mod registry;
#[cfg(test)]
mod testonly;
