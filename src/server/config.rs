//! Server configuration and the serve loop.
//!
//! [`serve`] binds a listener, runs the rendered tree under axum with graceful
//! shutdown, and ends every event stream when shutdown begins so that
//! long-lived SSE responses do not hold the server open.

use super::broadcast::HubControl;
use super::tree::ResourceTree;
use crate::error::{CanopyError, Result};
use axum::Router;
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind: SocketAddr,
    /// Time in-flight requests get once shutdown starts.
    pub shutdown_grace: Duration,
    /// Log every request through `tower_http::trace::TraceLayer`.
    pub trace_requests: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            shutdown_grace: Duration::from_secs(10),
            trace_requests: true,
        }
    }
}

impl ServerConfig {
    /// Listen on `bind`.
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Time in-flight requests get once shutdown starts.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Turn request tracing on or off.
    pub fn with_trace_requests(mut self, enabled: bool) -> Self {
        self.trace_requests = enabled;
        self
    }
}

/// Render `tree` and serve it until `shutdown` resolves.
pub async fn serve<F>(tree: &ResourceTree, config: ServerConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(|err| CanopyError::Io(format!("failed to bind {}: {err}", config.bind)))?;
    serve_listener(tree, listener, &config, shutdown).await
}

/// Like [`serve`], on an already bound listener.
pub async fn serve_listener<F>(
    tree: &ResourceTree,
    listener: TcpListener,
    config: &ServerConfig,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let mut app: Router = tree.router()?;
    if config.trace_requests {
        app = app.layer(TraceLayer::new_for_http());
    }
    let hubs = tree.hubs();
    for hub in &hubs {
        hub.start();
    }

    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "listening");
    }
    run(listener, app, hubs, config.shutdown_grace, shutdown).await
}

async fn run<F>(
    listener: TcpListener,
    app: Router,
    hubs: Vec<Arc<dyn HubControl>>,
    grace: Duration,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| CanopyError::Io(format!("server failed: {err}")))?;
        }
        _ = shutdown => {
            tracing::info!("shutting down");
            for hub in &hubs {
                hub.close();
            }
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(grace, &mut server).await {
                Ok(result) => {
                    result.map_err(|err| CanopyError::Io(format!("server failed: {err}")))?
                }
                Err(_) => return Err(CanopyError::Io("server shutdown timed out".into())),
            }
        }
    }
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}
