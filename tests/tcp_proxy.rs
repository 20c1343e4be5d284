//! End-to-end tests for the TCP fault-injection proxy.

use faultline::config::{TcpFaults, TcpRule};
use faultline::tcp::TcpProxy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Echo server counting accepted connections.
async fn start_echo_upstream() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connects = Arc::new(AtomicUsize::new(0));
    let connects_task = Arc::clone(&connects);

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => break,
            };
            connects_task.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let (mut read, mut write) = stream.split();
                let _ = tokio::io::copy(&mut read, &mut write).await;
            });
        }
    });

    (addr, connects)
}

async fn start_proxy(
    upstream: SocketAddr,
    faults: TcpFaults,
) -> (SocketAddr, broadcast::Sender<()>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let rule = TcpRule {
        listen: addr.to_string(),
        upstream: upstream.to_string(),
        faults,
    };
    let handle = tokio::spawn(async move {
        TcpProxy::new(rule).serve(listener, shutdown_rx).await.unwrap();
    });
    (addr, shutdown_tx, handle)
}

#[tokio::test]
async fn test_passthrough_preserves_bytes_both_directions() {
    let (upstream, _connects) = start_echo_upstream().await;
    let (proxy, _shutdown, _handle) = start_proxy(upstream, TcpFaults::default()).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    client.write_all(&payload).await.unwrap();

    let mut echoed = vec![0u8; payload.len()];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(echoed, payload);
}

#[tokio::test]
async fn test_refuse_closes_without_dialing_upstream() {
    let (upstream, connects) = start_echo_upstream().await;
    let faults = TcpFaults {
        refuse_connections: true,
        ..TcpFaults::default()
    };
    let (proxy, _shutdown, _handle) = start_proxy(upstream, faults).await;

    // The kernel accepts before the proxy refuses, so connect succeeds and
    // the very next read observes the close with zero bytes.
    let mut client = TcpStream::connect(proxy).await.unwrap();
    let mut buf = [0u8; 1];
    match timeout(Duration::from_secs(2), client.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => {}
        other => panic!("expected closed connection, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_reset_probability_one_closes_after_accept() {
    let (upstream, connects) = start_echo_upstream().await;
    let faults = TcpFaults {
        reset_probability: 1.0,
        ..TcpFaults::default()
    };
    let (proxy, _shutdown, _handle) = start_proxy(upstream, faults).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    let mut buf = [0u8; 1];
    match timeout(Duration::from_secs(2), client.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => {}
        other => panic!("expected reset connection, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_drop_probability_one_forwards_nothing() {
    let (upstream, _connects) = start_echo_upstream().await;
    let faults = TcpFaults {
        drop_probability: 1.0,
        ..TcpFaults::default()
    };
    let (proxy, _shutdown, _handle) = start_proxy(upstream, faults).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(b"into the void").await.unwrap();

    let mut buf = [0u8; 16];
    let read = timeout(Duration::from_millis(300), client.read(&mut buf)).await;
    assert!(read.is_err(), "expected no echoed data, got {read:?}");
}

#[tokio::test]
async fn test_latency_applied_at_accept_and_per_chunk() {
    let (upstream, _connects) = start_echo_upstream().await;
    let faults = TcpFaults {
        latency_ms: 150,
        ..TcpFaults::default()
    };
    let (proxy, _shutdown, _handle) = start_proxy(upstream, faults).await;

    let start = Instant::now();
    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(&buf, b"ping");
    // Accept latency plus at least one per-chunk sleep; the two copiers
    // sleep concurrently, so their delays overlap rather than add.
    assert!(elapsed >= Duration::from_millis(280), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn test_bandwidth_throttle_limits_throughput() {
    let (upstream, _connects) = start_echo_upstream().await;
    let faults = TcpFaults {
        bandwidth_kbps: 4,
        ..TcpFaults::default()
    };
    let (proxy, _shutdown, _handle) = start_proxy(upstream, faults).await;

    let payload = vec![42u8; 8 * 1024];
    let start = Instant::now();
    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&payload).await.unwrap();
    let mut echoed = vec![0u8; payload.len()];
    client.read_exact(&mut echoed).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(echoed, payload);
    // An 8 KiB chunk overflows the 4 KiB/s window at least once.
    assert!(elapsed >= Duration::from_millis(900), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn test_unreachable_upstream_closes_client() {
    // Nothing listens on port 9 on loopback.
    let dead: SocketAddr = "127.0.0.1:9".parse().unwrap();
    let (proxy, _shutdown, _handle) = start_proxy(dead, TcpFaults::default()).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    let mut buf = [0u8; 1];
    match timeout(Duration::from_secs(2), client.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => {}
        other => panic!("expected closed connection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_shutdown_stops_accept_loop_and_drains() {
    let (upstream, _connects) = start_echo_upstream().await;
    let (proxy, shutdown, handle) = start_proxy(upstream, TcpFaults::default()).await;

    // One in-flight connection that finishes on its own.
    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(b"bye").await.unwrap();
    let mut buf = [0u8; 3];
    client.read_exact(&mut buf).await.unwrap();
    drop(client);

    shutdown.send(()).unwrap();
    timeout(Duration::from_secs(5), handle)
        .await
        .expect("accept loop did not stop")
        .unwrap();

    assert!(TcpStream::connect(proxy).await.is_err());
}
