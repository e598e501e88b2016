use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, ToSocketAddrs};

use super::{serve, shutdown};
use crate::app::App;
use crate::error::Error;

/// The default value of the maximum number of concurrent connections.
const DEFAULT_MAX_CONNECTIONS: usize = 256;

/// The default value of the shutdown timeout in seconds.
const DEFAULT_SHUTDOWN_TIMEOUT: u64 = 30;

/// Serves an [`App`] with tokio and hyper.
///
/// Request bodies are read into memory up to the application's
/// `max_request_size` before the request is dispatched on tokio's blocking
/// thread pool.
///
pub struct Server {
    app: Arc<App>,
    max_connections: Option<usize>,
    shutdown_timeout: Option<u64>,
}

impl Server {
    pub fn new(app: App) -> Self {
        Self {
            app: Arc::new(app),
            max_connections: None,
            shutdown_timeout: None,
        }
    }

    /// Sets the maximum number of concurrent connections that the server can
    /// accept. The default value is 256.
    ///
    pub fn max_connections(mut self, n: usize) -> Self {
        self.max_connections = Some(n);
        self
    }

    /// Sets the amount of time in seconds that the server waits for inflight
    /// connections to complete before shutting down. The default value is 30
    /// seconds.
    ///
    pub fn shutdown_timeout(mut self, timeout: u64) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// Binds to `address` and serves until the process receives "Ctrl-C".
    ///
    pub async fn listen<A>(self, address: A) -> Result<(), Error>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(address).await?;

        if let Ok(address) = listener.local_addr() {
            tracing::info!("listening on http://{}", address);
        }

        self.serve_with_shutdown(listener, shutdown::ctrl_c()).await
    }

    /// Serves connections accepted by `listener` until `signal` resolves.
    /// Inflight connections are then closed gracefully.
    ///
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, signal: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send,
    {
        let max_connections = self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let shutdown_timeout = Duration::from_secs(
            self.shutdown_timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT),
        );

        serve::serve(
            self.app,
            listener,
            max_connections,
            shutdown_timeout,
            signal,
        )
        .await
    }
}
