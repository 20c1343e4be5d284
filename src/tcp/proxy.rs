//! TCP proxy accept loop and per-connection fault handling.

use super::copier::copy_with_faults;
use crate::config::TcpRule;
use anyhow::Context;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A single transparent TCP proxy bound to one listen/upstream pair.
pub struct TcpProxy {
    rule: TcpRule,
}

impl TcpProxy {
    pub fn new(rule: TcpRule) -> Self {
        Self { rule }
    }

    /// Bind the configured listen address and serve until shutdown.
    pub async fn run(self, shutdown: broadcast::Receiver<()>) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(&self.rule.listen)
            .await
            .with_context(|| format!("failed to bind tcp proxy on {}", self.rule.listen))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), anyhow::Error> {
        info!(listen = %self.rule.listen, upstream = %self.rule.upstream, "tcp proxy listening");

        let rule = Arc::new(self.rule);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((client, peer)) => {
                        let rule = Arc::clone(&rule);
                        connections.spawn(async move {
                            handle_conn(client, peer, &rule).await;
                        });
                    }
                    Err(e) if is_transient(&e) => {
                        debug!(listen = %rule.listen, "transient accept error: {e}");
                        sleep(Duration::from_millis(50)).await;
                    }
                    Err(e) => {
                        warn!(listen = %rule.listen, "accept error: {e}");
                        sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }

        // Stop accepting, then let in-flight connections drain.
        drop(listener);
        while connections.join_next().await.is_some() {}
        info!(listen = %rule.listen, "tcp proxy stopped");
        Ok(())
    }
}

fn is_transient(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::Interrupted
            | ErrorKind::TimedOut
            | ErrorKind::WouldBlock
    )
}

async fn handle_conn(client: TcpStream, peer: SocketAddr, rule: &TcpRule) {
    let faults = &rule.faults;

    if faults.refuse_connections {
        debug!(%peer, listen = %rule.listen, "refusing connection");
        drop(client);
        return;
    }

    if faults.latency_ms > 0 {
        sleep(Duration::from_millis(faults.latency_ms)).await;
    }

    let reset_probability = faults.reset_probability.clamp(0.0, 1.0);
    if reset_probability > 0.0 && SmallRng::from_entropy().gen::<f64>() < reset_probability {
        info!(%peer, listen = %rule.listen, "injecting reset after accept");
        // Linger 0 turns the close into an RST on the wire.
        let _ = client.set_linger(Some(Duration::ZERO));
        drop(client);
        return;
    }

    let upstream = match timeout(CONNECT_TIMEOUT, TcpStream::connect(&rule.upstream)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            warn!(upstream = %rule.upstream, "upstream dial error: {e}");
            return;
        }
        Err(_) => {
            warn!(upstream = %rule.upstream, "upstream dial timed out");
            return;
        }
    };

    let (client_read, client_write) = client.into_split();
    let (upstream_read, upstream_write) = upstream.into_split();

    // Each copier half-closes its destination on exit, so whichever side
    // finishes first unblocks the other; both are joined before closing.
    let (up, down) = tokio::join!(
        copy_with_faults(
            client_read,
            upstream_write,
            faults,
            SmallRng::from_entropy()
        ),
        copy_with_faults(
            upstream_read,
            client_write,
            faults,
            SmallRng::from_entropy()
        ),
    );

    info!(%peer, listen = %rule.listen, %up, %down, "connection closed");
}
