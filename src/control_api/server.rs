//! Control API server.

use super::router::route_request;
use crate::proxy::{drain_with_budget, SHUTDOWN_DRAIN};
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

pub struct ControlApiServer {
    store: SharedRuleStore,
}

impl ControlApiServer {
    pub fn new(store: SharedRuleStore) -> Self {
        Self { store }
    }

    /// Bind `addr` and serve until the shutdown signal fires.
    pub async fn run(
        self,
        addr: SocketAddr,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind control API on {addr}"))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), anyhow::Error> {
        let addr = listener.local_addr()?;
        info!("control API listening on http://{addr}");

        let store = self.store;
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => {
                    let (stream, _) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("control API accept error: {e}");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            continue;
                        }
                    };
                    let io = TokioIo::new(stream);
                    let store = Arc::clone(&store);
                    connections.spawn(async move {
                        let service = service_fn(move |req| {
                            let store = Arc::clone(&store);
                            async move { route_request(req, store).await }
                        });
                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            debug!("control API connection error: {e}");
                        }
                    });
                }
            }
        }

        drop(listener);
        drain_with_budget(&mut connections, SHUTDOWN_DRAIN).await;
        info!("control API stopped");
        Ok(())
    }
}
