//! Byte-stream copier with per-chunk fault injection.

use crate::config::TcpFaults;
use rand::Rng;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep, Instant};
use tracing::debug;

const CHUNK_SIZE: usize = 32 * 1024;
const THROTTLE_WINDOW: Duration = Duration::from_secs(1);

/// Per-direction counters, logged when the connection closes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyStats {
    pub bytes: u64,
    pub chunks: u64,
    pub drops: u64,
    pub latency_sleep: Duration,
    pub throttle_sleep: Duration,
}

impl fmt::Display for CopyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bytes={} chunks={} drops={} latency_sleep_ms={} throttle_sleep_ms={}",
            self.bytes,
            self.chunks,
            self.drops,
            self.latency_sleep.as_millis(),
            self.throttle_sleep.as_millis()
        )
    }
}

/// Copy `src` to `dst` until EOF or error, applying per-chunk latency,
/// drops and bandwidth throttling.
///
/// The per-chunk latency sleep runs before every read, so cumulative added
/// latency is bounded only by traffic volume, and on the first chunk it
/// stacks on top of the per-connection accept latency. Throttling keeps a
/// one-second window of bytes written; a chunk that would overflow the
/// window waits out the remainder first. On exit the destination is
/// half-closed so the opposite copier observes EOF.
pub async fn copy_with_faults<R, W>(
    mut src: R,
    mut dst: W,
    faults: &TcpFaults,
    mut rng: impl Rng,
) -> CopyStats
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stats = CopyStats::default();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let latency = Duration::from_millis(faults.latency_ms);
    let drop_probability = faults.drop_probability.clamp(0.0, 1.0);
    let window_budget = faults.bandwidth_kbps.saturating_mul(1024);
    let mut window_start = Instant::now();
    let mut sent_this_window: u64 = 0;

    loop {
        if !latency.is_zero() {
            sleep(latency).await;
            stats.latency_sleep += latency;
        }

        let n = match src.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("read error, closing direction: {e}");
                break;
            }
        };
        stats.chunks += 1;

        if drop_probability > 0.0 && rng.gen::<f64>() < drop_probability {
            stats.drops += 1;
            continue;
        }

        if window_budget > 0 {
            let now = Instant::now();
            if now.duration_since(window_start) >= THROTTLE_WINDOW {
                window_start = now;
                sent_this_window = 0;
            }
            if sent_this_window + n as u64 > window_budget {
                let remainder = THROTTLE_WINDOW.saturating_sub(now.duration_since(window_start));
                if !remainder.is_zero() {
                    sleep(remainder).await;
                    stats.throttle_sleep += remainder;
                }
                window_start = Instant::now();
                sent_this_window = 0;
            }
        }

        if let Err(e) = dst.write_all(&buf[..n]).await {
            debug!("write error, closing direction: {e}");
            break;
        }
        sent_this_window += n as u64;
        stats.bytes += n as u64;
    }

    let _ = dst.shutdown().await;
    stats
}
