//! Shared rule store.
//!
//! The store is consumed from three places in the same process (the proxies,
//! the control API, and the CLI), so it is exposed as the [`RuleStore`]
//! capability trait and shared as `Arc<dyn RuleStore>` rather than as a
//! concrete type.

mod file;
mod rules;

pub use file::FileRuleStore;
pub use rules::{Failure, FailureKind, Rule, TIMEOUT_LATENCY_MS};

use std::sync::Arc;

/// Errors surfaced by [`RuleStore::reload_if_modified`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read rule file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse rule file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Capability set over the registry of rules. Every read hands out a
/// defensive copy; the store never aliases its internal state.
pub trait RuleStore: Send + Sync {
    /// Snapshot of all rules, sorted by id.
    fn get_all(&self) -> Vec<Rule>;

    /// First enabled rule whose `target` is a prefix of `target_url`.
    ///
    /// Rules are scanned in ascending id order, so ties between overlapping
    /// targets resolve to the lexicographically smallest id.
    fn find_match(&self, target_url: &str) -> Option<Rule>;

    /// Insert by id, overwriting any existing rule with the same id.
    fn add(&self, rule: Rule);

    /// Replace the rule with the matching id. Returns false when absent.
    fn update(&self, rule: Rule) -> bool;

    /// Remove by id. Returns false when absent.
    fn delete(&self, id: &str) -> bool;

    /// Reload the backing file when it has been modified by another writer
    /// since the last load. Failures leave the in-memory state intact.
    fn reload_if_modified(&self) -> Result<(), StoreError>;
}

pub type SharedRuleStore = Arc<dyn RuleStore>;
