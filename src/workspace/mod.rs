//! Workspace discovery and aggregation

pub mod aggregator;
pub mod matcher;

pub use aggregator::{
    missing_in_root, override_path_packages, unify_overrides, IgnoredPin, RootScan,
    WorkspaceAggregator, WorkspaceError, WorkspaceSummary,
};
pub use matcher::{FileMatcher, GlobMatcher, DEFAULT_IGNORE};
