//! Control-plane HTTP API.
//!
//! CRUD over the shared rule store, consumed by the showcase UI and any
//! other out-of-band tooling. A thin layer: every handler is a few lines
//! over `Arc<dyn RuleStore>`.

mod handlers;
mod router;
mod server;
mod types;

pub use server::ControlApiServer;
