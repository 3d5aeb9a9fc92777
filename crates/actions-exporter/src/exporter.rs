//! Wiring of the exporter from its configuration.

use actions_client::{HyperTransport, ResilientClient, Transport};

use std::{net::SocketAddr, sync::Arc};

use crate::{
    collector::{RunnersCollector, RunsCollector, WorkflowsCollector},
    config::ExporterConfig,
    github::ApiClient,
    instance::Instance,
    processor::{ApiProcessor, MonitorProcessor},
    registry::Registry,
};

/// Exporter with bound listeners.
#[derive(Debug)]
pub struct Exporter {
    instance: Instance,
    api_address: SocketAddr,
    monitor_address: SocketAddr,
}

impl Exporter {
    /// Builds the exporter using the default HTTPS transport and binds its listeners.
    ///
    /// # Errors
    ///
    /// Returns an error if binding any of the listeners fails.
    pub async fn bind(config: &ExporterConfig) -> anyhow::Result<Self> {
        let transport = HyperTransport::new(config.transport.clone());
        Self::bind_with_transport(config, transport).await
    }

    /// Builds the exporter using a custom transport for GitHub API requests.
    ///
    /// # Errors
    ///
    /// Returns an error if binding any of the listeners fails.
    pub async fn bind_with_transport<T: Transport>(
        config: &ExporterConfig,
        transport: T,
    ) -> anyhow::Result<Self> {
        let http = ResilientClient::new(transport, config.retry_policy.clone());
        let api = ApiClient::new(
            http,
            &config.api_url,
            config.repository.clone(),
            config.token.clone(),
        );

        let mut registry = Registry::default();
        registry.register(RunnersCollector::new(api.clone()));
        registry.register(RunsCollector::new(api.clone()));
        registry.register(WorkflowsCollector::new(api));

        let api_processor = ApiProcessor::bind(config.api_address).await?;
        let monitor = MonitorProcessor::bind(
            config.monitor_address,
            Arc::new(registry),
            config.collector_loop_interval,
        )
        .await?;
        let api_address = api_processor.local_addr();
        let monitor_address = monitor.local_addr();

        let mut instance = Instance::default();
        instance.add_processor(api_processor);
        instance.add_processor(monitor);
        Ok(Self {
            instance,
            api_address,
            monitor_address,
        })
    }

    /// Returns the local address of the health check listener.
    pub fn api_address(&self) -> SocketAddr {
        self.api_address
    }

    /// Returns the local address of the metrics listener.
    pub fn monitor_address(&self) -> SocketAddr {
        self.monitor_address
    }

    /// Starts serving requests and scraping collectors in background.
    pub fn start(&mut self) {
        tracing::info!(
            api_address = %self.api_address,
            monitor_address = %self.monitor_address,
            "Starting exporter"
        );
        self.instance.start();
    }

    /// Gracefully shuts down the exporter.
    pub async fn shutdown(&mut self) {
        self.instance.shutdown().await;
    }
}
