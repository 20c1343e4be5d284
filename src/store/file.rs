//! File-backed rule store.
//!
//! The persisted JSON file is the rendezvous between a long-running server
//! and ad-hoc CLI invocations: every mutation rewrites it in full, and
//! readers poll [`RuleStore::reload_if_modified`] to pick up out-of-band
//! edits. Writes go through a temp file plus rename so a crash mid-write
//! cannot corrupt the file.

use super::{Rule, RuleStore, StoreError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::{debug, warn};

pub struct FileRuleStore {
    path: Option<PathBuf>,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    rules: HashMap<String, Rule>,
    loaded_at: Option<SystemTime>,
}

impl FileRuleStore {
    /// Open a store backed by `path`. When the file exists it is
    /// authoritative for the initial state; a missing file starts empty.
    pub fn new(path: Option<PathBuf>) -> Self {
        let store = Self {
            path,
            inner: RwLock::new(Inner::default()),
        };
        if let Err(e) = store.load() {
            match e {
                StoreError::Io(ref io) if io.kind() == ErrorKind::NotFound => {}
                other => warn!("failed to load rule file: {other}"),
            }
        }
        store
    }

    /// Store with no backing file, for embedding and tests.
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    fn load(&self) -> Result<(), StoreError> {
        let path = match &self.path {
            Some(p) => p,
            None => return Ok(()),
        };
        let modified = fs::metadata(path)?.modified()?;
        let data = fs::read(path)?;
        let rules: Vec<Rule> = serde_json::from_slice(&data)?;

        let mut inner = self.inner.write();
        inner.rules = rules.into_iter().map(|r| (r.id.clone(), r)).collect();
        inner.loaded_at = Some(modified);
        debug!(count = inner.rules.len(), "loaded rules from file");
        Ok(())
    }

    /// Persist inside the write critical section. Failures are logged and
    /// swallowed; the in-memory update already succeeded from the caller's
    /// perspective.
    fn persist_locked(&self, inner: &mut Inner) {
        let path = match &self.path {
            Some(p) => p,
            None => return,
        };
        let rules = sorted_rules(&inner.rules);
        let result = serde_json::to_vec_pretty(&rules)
            .map_err(StoreError::from)
            .and_then(|data| {
                let tmp = path.with_extension("json.tmp");
                fs::write(&tmp, data)?;
                fs::rename(&tmp, path)?;
                Ok(())
            });
        match result {
            // Track our own write so the next poll does not re-read it.
            Ok(()) => {
                if let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) {
                    inner.loaded_at = Some(modified);
                }
            }
            Err(e) => warn!("failed to persist rule file: {e}"),
        }
    }
}

fn sorted_rules(rules: &HashMap<String, Rule>) -> Vec<Rule> {
    let mut rules: Vec<Rule> = rules.values().cloned().collect();
    rules.sort_by(|a, b| a.id.cmp(&b.id));
    rules
}

impl RuleStore for FileRuleStore {
    fn get_all(&self) -> Vec<Rule> {
        sorted_rules(&self.inner.read().rules)
    }

    fn find_match(&self, target_url: &str) -> Option<Rule> {
        let inner = self.inner.read();
        let mut candidates: Vec<&Rule> = inner.rules.values().collect();
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        candidates
            .into_iter()
            .find(|rule| {
                rule.enabled && !rule.target.is_empty() && target_url.starts_with(&rule.target)
            })
            .cloned()
    }

    fn add(&self, rule: Rule) {
        let mut inner = self.inner.write();
        inner.rules.insert(rule.id.clone(), rule);
        self.persist_locked(&mut inner);
    }

    fn update(&self, rule: Rule) -> bool {
        let mut inner = self.inner.write();
        if !inner.rules.contains_key(&rule.id) {
            return false;
        }
        inner.rules.insert(rule.id.clone(), rule);
        self.persist_locked(&mut inner);
        true
    }

    fn delete(&self, id: &str) -> bool {
        let mut inner = self.inner.write();
        if inner.rules.remove(id).is_none() {
            return false;
        }
        self.persist_locked(&mut inner);
        true
    }

    fn reload_if_modified(&self) -> Result<(), StoreError> {
        let path = match &self.path {
            Some(p) => p,
            None => return Ok(()),
        };
        let modified = match fs::metadata(path) {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let stale = {
            let inner = self.inner.read();
            match inner.loaded_at {
                Some(loaded_at) => modified > loaded_at,
                None => true,
            }
        };
        if stale {
            debug!("rule file modified, reloading");
            self.load()?;
        }
        Ok(())
    }
}
