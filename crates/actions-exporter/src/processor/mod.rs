//! Processors run by the exporter [`Instance`](crate::Instance): the metrics (monitor)
//! listener owning collector loops, and the health (API) listener.

use actions_client::BoxFuture;
use anyhow::Context as _;
use hyper::{body::Incoming, header, Method, Request, Response, StatusCode};
use tokio::{sync::watch, task::JoinHandle};

use std::{
    mem,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use self::server::{Handler, HttpListener};
use crate::{collector::ScrapePolicy, instance::Processor, registry::Registry};

mod server;
#[cfg(test)]
mod tests;

/// Content type of the OpenMetrics text format.
pub const OPEN_METRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

fn plain_response(status: StatusCode, body: &str) -> Response<String> {
    let mut response = Response::new(body.to_owned());
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[derive(Debug)]
struct MetricsHandler {
    registry: Arc<Registry>,
}

impl MetricsHandler {
    async fn render(&self) -> Response<String> {
        let started_at = Instant::now();
        let mut buffer = String::with_capacity(1_024);
        if let Err(err) = self.registry.encode(&mut buffer).await {
            tracing::error!(%err, "Failed encoding metrics");
            return plain_response(StatusCode::INTERNAL_SERVER_ERROR, "failed encoding metrics");
        }

        let latency = started_at.elapsed();
        let scraped_size = buffer.len();
        tracing::debug!(
            latency_sec = latency.as_secs_f64(),
            scraped_size,
            "Rendered metrics in {latency:?} (size: {scraped_size}B)"
        );

        let mut response = Response::new(buffer);
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static(OPEN_METRICS_CONTENT_TYPE),
        );
        response
    }
}

impl Handler for MetricsHandler {
    fn handle(&self, request: Request<Incoming>) -> BoxFuture<'_, Response<String>> {
        Box::pin(async move {
            match (request.method(), request.uri().path()) {
                (&Method::GET, "/metrics") => self.render().await,
                (_, "/metrics") => {
                    plain_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
                }
                _ => plain_response(StatusCode::NOT_FOUND, "not found"),
            }
        })
    }
}

/// Processor serving metrics on `GET /metrics` and running background collector loops.
#[derive(Debug)]
pub struct MonitorProcessor {
    listener: HttpListener<MetricsHandler>,
    collector_loop_interval: Duration,
    stop_loops: watch::Sender<bool>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl MonitorProcessor {
    /// Binds the metrics listener to `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn bind(
        address: SocketAddr,
        registry: Arc<Registry>,
        collector_loop_interval: Duration,
    ) -> anyhow::Result<Self> {
        let handler = MetricsHandler { registry };
        let listener = HttpListener::bind("monitor", address, handler)
            .await
            .with_context(|| format!("failed binding monitor listener to {address}"))?;
        Ok(Self {
            listener,
            collector_loop_interval,
            stop_loops: watch::channel(false).0,
            loops: Mutex::default(),
        })
    }

    /// Returns the local address of the metrics listener.
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    fn start_loops(&self) {
        let registry = &self.listener.handler().registry;
        let mut loops = self.loops.lock().unwrap_or_else(PoisonError::into_inner);
        for collector in registry.collectors() {
            if collector.policy() == ScrapePolicy::Background {
                let stop = self.stop_loops.subscribe();
                loops.push(collector.start_loop(self.collector_loop_interval, stop));
            }
        }
    }
}

impl Processor for MonitorProcessor {
    fn name(&self) -> &'static str {
        "monitor"
    }

    fn run(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.start_loops();
            self.listener.serve().await?;
            Ok(())
        })
    }

    fn stop(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        self.listener.stop();
        self.stop_loops.send_replace(true);
        let loops = mem::take(&mut *self.loops.lock().unwrap_or_else(PoisonError::into_inner));

        Box::pin(async move {
            for handle in loops {
                handle.await.context("collector loop panicked")?;
            }
            Ok(())
        })
    }
}

#[derive(Debug)]
struct HealthHandler;

impl Handler for HealthHandler {
    fn handle(&self, request: Request<Incoming>) -> BoxFuture<'_, Response<String>> {
        let response = match (request.method(), request.uri().path()) {
            (&Method::GET, "/healthz") => plain_response(StatusCode::OK, "ok"),
            _ => plain_response(StatusCode::NOT_FOUND, "not found"),
        };
        Box::pin(async { response })
    }
}

/// Processor serving the health check on `GET /healthz`.
#[derive(Debug)]
pub struct ApiProcessor {
    listener: HttpListener<HealthHandler>,
}

impl ApiProcessor {
    /// Binds the health listener to `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn bind(address: SocketAddr) -> anyhow::Result<Self> {
        let listener = HttpListener::bind("api", address, HealthHandler)
            .await
            .with_context(|| format!("failed binding API listener to {address}"))?;
        Ok(Self { listener })
    }

    /// Returns the local address of the health listener.
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }
}

impl Processor for ApiProcessor {
    fn name(&self) -> &'static str {
        "api"
    }

    fn run(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.listener.serve().await?;
            Ok(())
        })
    }

    fn stop(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        self.listener.stop();
        Box::pin(async { Ok(()) })
    }
}
