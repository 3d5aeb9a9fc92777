//! Exporter instance: a set of concurrently running processors with coordinated shutdown.

use actions_client::BoxFuture;
use tokio::{sync::watch, task::JoinHandle, time::Instant};

use std::{any::Any, fmt, sync::Arc, time::Duration};

/// Default grace period for [`Instance::shutdown()`].
pub const GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Long-running component of an [`Instance`], e.g. an HTTP listener.
pub trait Processor: fmt::Debug + Send + Sync + 'static {
    /// Returns the processor name used in logs.
    fn name(&self) -> &'static str;

    /// Runs the processor. The returned future resolves after the processor is stopped.
    fn run(&self) -> BoxFuture<'_, anyhow::Result<()>>;

    /// Requests the processor to stop; resolves once the request is acknowledged.
    /// [`Self::run()`] may complete later.
    fn stop(&self) -> BoxFuture<'_, anyhow::Result<()>>;
}

/// Resolves once `stop` is set to `true` or its sender is dropped.
pub(crate) async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    stop.wait_for(|&stopped| stopped).await.ok();
}

/// Set of [`Processor`]s that are started and shut down together.
#[derive(Debug)]
pub struct Instance {
    processors: Vec<Arc<dyn Processor>>,
    tasks: Vec<JoinHandle<()>>,
    grace_period: Duration,
}

impl Default for Instance {
    fn default() -> Self {
        Self {
            processors: vec![],
            tasks: vec![],
            grace_period: GRACE_PERIOD,
        }
    }
}

impl Instance {
    /// Sets the grace period for [`Self::shutdown()`].
    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Adds a processor. Processors are started and stopped in the order of addition.
    pub fn add_processor(&mut self, processor: impl Processor) {
        self.processors.push(Arc::new(processor));
    }

    /// Spawns all processors. A processor failing or panicking is logged and doesn't affect
    /// other processors.
    pub fn start(&mut self) {
        for processor in &self.processors {
            let name = processor.name();
            let processor = Arc::clone(processor);
            let task = tokio::spawn(async move { processor.run().await });
            let supervisor = tokio::spawn(async move {
                match task.await {
                    Ok(Ok(())) => {
                        tracing::info!(processor = name, "Processor `{name}` has stopped");
                    }
                    Ok(Err(err)) => {
                        tracing::error!(processor = name, "Processor `{name}` failed: {err:#}");
                    }
                    Err(err) if err.is_panic() => {
                        let message = panic_message(err.into_panic());
                        tracing::error!(processor = name, "Processor `{name}` panicked: {message}");
                    }
                    Err(err) => {
                        tracing::warn!(%err, processor = name, "Processor `{name}` was cancelled");
                    }
                }
            });
            self.tasks.push(supervisor);
        }
        tracing::info!("Started {} processors", self.processors.len());
    }

    /// Stops all processors and waits for them to finish within the grace period.
    /// Shutdown is best-effort: a processor failing to stop doesn't prevent stopping other ones.
    pub async fn shutdown(&mut self) {
        let deadline = Instant::now() + self.grace_period;
        let mut timed_out = false;

        for processor in &self.processors {
            let name = processor.name();
            match tokio::time::timeout_at(deadline, processor.stop()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::error!(
                        processor = name,
                        "Failed to shut down processor `{name}`: {err:#}"
                    );
                }
                Err(_) => timed_out = true,
            }
        }
        for task in self.tasks.drain(..) {
            if tokio::time::timeout_at(deadline, task).await.is_err() {
                timed_out = true;
            }
        }

        if timed_out {
            tracing::info!(
                "Instance shutdown timed out in {} seconds",
                self.grace_period.as_secs()
            );
        }
        tracing::info!("Instance has been shutdown");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "(non-string panic payload)".to_owned()
    }
}
