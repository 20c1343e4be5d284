//! Response body instrumentation.
//!
//! Streamed upstream responses bypass the handler once headers are written,
//! so the access log entry is emitted by a body wrapper that counts bytes
//! as frames flow through and logs when the body is dropped.

use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Bytes, Frame, SizeHint};
use hyper::{Method, StatusCode};
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tracing::info;

pub struct AccessLog {
    pub method: Method,
    pub target: String,
    pub remote_addr: SocketAddr,
    pub status: StatusCode,
    pub start: Instant,
}

pub struct CountingBody {
    inner: BoxBody<Bytes, hyper::Error>,
    log: AccessLog,
    bytes: u64,
}

impl CountingBody {
    pub fn new(inner: BoxBody<Bytes, hyper::Error>, log: AccessLog) -> Self {
        Self {
            inner,
            log,
            bytes: 0,
        }
    }
}

impl Body for CountingBody {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, hyper::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.bytes += data.len() as u64;
                }
                Poll::Ready(Some(Ok(frame)))
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for CountingBody {
    fn drop(&mut self) {
        info!(
            method = %self.log.method,
            url = %self.log.target,
            remote = %self.log.remote_addr,
            status = self.log.status.as_u16(),
            bytes = self.bytes,
            duration_ms = self.log.start.elapsed().as_millis() as u64,
            "forwarded"
        );
    }
}
