//! Per-run state shared through the reconciliation pipeline.
//!
//! Every cache the pipeline needs lives here instead of in module statics, so
//! two runs never observe each other's data.

use crate::models::Ledger;
use crate::orphans::DependencyTree;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Outcome of the one dependency-tree lookup allowed per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeLookup {
    /// Listing succeeded
    Known(DependencyTree),
    /// Listing failed or timed out; everything counts as used
    Unknown,
}

/// Caches and clock for a single invocation
#[derive(Debug)]
pub struct RunContext {
    started_at: DateTime<Utc>,
    manifests: HashMap<PathBuf, Value>,
    dependency_tree: Option<TreeLookup>,
    ledgers: HashMap<String, Ledger>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Context with a fixed clock
    pub fn at(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            manifests: HashMap::new(),
            dependency_tree: None,
            ledgers: HashMap::new(),
        }
    }

    /// Drop every cache. Called at run start.
    pub fn reset(&mut self) {
        self.manifests.clear();
        self.dependency_tree = None;
        self.ledgers.clear();
    }

    /// `addedDate` for ledgers created during this run
    pub fn added_date(&self) -> String {
        self.started_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    // =========================================================================
    // Manifest cache
    // =========================================================================

    pub fn cached_manifest(&self, path: &Path) -> Option<&Value> {
        self.manifests.get(path)
    }

    pub fn cache_manifest(&mut self, path: PathBuf, value: Value) {
        self.manifests.insert(path, value);
    }

    pub fn invalidate_manifest(&mut self, path: &Path) {
        self.manifests.remove(path);
    }

    // =========================================================================
    // Dependency tree
    // =========================================================================

    pub fn dependency_tree(&self) -> Option<&TreeLookup> {
        self.dependency_tree.as_ref()
    }

    pub fn set_dependency_tree(&mut self, lookup: TreeLookup) {
        self.dependency_tree = Some(lookup);
    }

    // =========================================================================
    // Ledger memo
    // =========================================================================

    pub fn memoized_ledger(&self, key: &str) -> Option<&Ledger> {
        self.ledgers.get(key)
    }

    pub fn memoize_ledger(&mut self, key: impl Into<String>, ledger: Ledger) {
        self.ledgers.insert(key.into(), ledger);
    }
}
