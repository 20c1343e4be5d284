//! L4 fault-injection proxy.
//!
//! One proxy per configured listen/upstream pair. Each accepted connection
//! dials its upstream and runs two concurrent stream copiers with faults
//! applied per chunk. TCP faults are silent by design: errors close the
//! connection with a log line and are never reported to either peer.

mod copier;
mod proxy;

pub use copier::{copy_with_faults, CopyStats};
pub use proxy::TcpProxy;
