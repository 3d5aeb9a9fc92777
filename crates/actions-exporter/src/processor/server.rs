//! Minimal HTTP server with graceful shutdown.

use actions_client::BoxFuture;
use hyper::{body::Incoming, server::conn::http1, service::service_fn, Request, Response};
use hyper_util::rt::TokioIo;
use tokio::{io, net::TcpListener, sync::watch};

use std::{
    convert::Infallible,
    fmt,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
};

use crate::instance::wait_for_stop;

/// Request handler for [`HttpListener`].
pub(crate) trait Handler: Send + Sync + 'static {
    fn handle(&self, request: Request<Incoming>) -> BoxFuture<'_, Response<String>>;
}

/// HTTP/1 listener bound eagerly to an address and served until stopped.
pub(crate) struct HttpListener<H> {
    name: &'static str,
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    handler: Arc<H>,
    stop_sender: watch::Sender<bool>,
}

impl<H> fmt::Debug for HttpListener<H> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HttpListener")
            .field("name", &self.name)
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

impl<H: Handler> HttpListener<H> {
    pub async fn bind(name: &'static str, address: SocketAddr, handler: H) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(listener = name, "Bound {name} listener to {local_addr}");
        Ok(Self {
            name,
            listener: Mutex::new(Some(listener)),
            local_addr,
            handler: Arc::new(handler),
            stop_sender: watch::channel(false).0,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Serves connections until [`Self::stop()`] is called; then waits until all open
    /// connections are closed.
    pub async fn serve(&self) -> io::Result<()> {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(listener) = listener else {
            return Err(io::Error::other(format!("{} listener is already served", self.name)));
        };
        let name = self.name;
        let mut stop = self.stop_sender.subscribe();
        tracing::info!(listener = name, "Starting {name} listener on {}", self.local_addr);

        let (started_shutdown_sender, started_shutdown) = watch::channel(());
        loop {
            let stream = tokio::select! {
                res = listener.accept() => res?.0,
                () = wait_for_stop(&mut stop) => break,
            };

            let io = TokioIo::new(stream);
            let handler = Arc::clone(&self.handler);
            let mut started_shutdown = started_shutdown.clone();
            tokio::spawn(async move {
                let service = service_fn(|request| {
                    let handler = Arc::clone(&handler);
                    async move { Ok::<_, Infallible>(handler.handle(request).await) }
                });
                let conn = http1::Builder::new().serve_connection(io, service);
                tokio::pin!(conn);

                let res = tokio::select! {
                    _ = started_shutdown.changed() => {
                        conn.as_mut().graceful_shutdown();
                        conn.await
                    }
                    res = conn.as_mut() => res,
                };
                if let Err(err) = res {
                    tracing::warn!(%err, listener = name, "Error serving connection");
                }
            });
        }

        tracing::info!(listener = name, "Stop signal received, {name} listener is shutting down");
        // Send the graceful shutdown signal to all alive connections.
        drop(started_shutdown);
        started_shutdown_sender.send_replace(());
        // Wait until all connections are dropped.
        started_shutdown_sender.closed().await;
        Ok(())
    }

    pub fn stop(&self) {
        self.stop_sender.send_replace(true);
    }
}
