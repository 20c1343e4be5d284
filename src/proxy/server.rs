//! Proxy server struct and accept loop.

use super::client::{create_http_client, HttpClient};
use super::handler::handle_request;
use super::network::create_reusable_listener;
use crate::store::SharedRuleStore;
use anyhow::Context;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Drain budget granted to open connections during graceful shutdown.
pub(crate) const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

/// The fault-injection reverse proxy.
pub struct ProxyServer {
    store: SharedRuleStore,
    http_client: HttpClient,
}

impl ProxyServer {
    pub fn new(store: SharedRuleStore) -> Self {
        Self {
            store,
            http_client: create_http_client(),
        }
    }

    /// Bind `addr` and serve until the shutdown signal fires.
    pub async fn run(
        self,
        addr: SocketAddr,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), anyhow::Error> {
        let listener = create_reusable_listener(addr)
            .with_context(|| format!("failed to bind proxy listener on {addr}"))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), anyhow::Error> {
        let addr = listener.local_addr()?;
        info!("FaultLine proxy listening on http://{addr}");

        let server = Arc::new(self);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("proxy accept error: {e}");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            continue;
                        }
                    };
                    let server = Arc::clone(&server);
                    connections.spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| {
                            let server = Arc::clone(&server);
                            async move {
                                handle_request(&server.store, &server.http_client, req, remote_addr)
                                    .await
                            }
                        });
                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            debug!("error serving connection from {remote_addr}: {e}");
                        }
                    });
                }
            }
        }

        drop(listener);
        drain_with_budget(&mut connections, SHUTDOWN_DRAIN).await;
        info!("proxy stopped");
        Ok(())
    }
}

/// Join connection tasks until `budget` runs out, then abort the rest.
pub(crate) async fn drain_with_budget(connections: &mut JoinSet<()>, budget: Duration) {
    if connections.is_empty() {
        return;
    }
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        match tokio::time::timeout_at(deadline, connections.join_next()).await {
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(_) => {
                warn!(
                    open = connections.len(),
                    "drain budget exhausted, aborting open connections"
                );
                connections.abort_all();
                break;
            }
        }
    }
}
