//! L7 fault-injection reverse proxy.
//!
//! Incoming requests carry the absolute target URL in their path
//! (`GET /https://api.example.test/users`). The handler matches the
//! reconstructed target against the rule store and either injects a
//! synthetic response or reverse-proxies to the target.

mod body;
mod client;
pub mod fault;
mod forwarding;
mod handler;
pub(crate) mod headers;
mod network;
mod response_ext;
mod server;

pub use server::ProxyServer;
pub(crate) use server::{drain_with_budget, SHUTDOWN_DRAIN};
