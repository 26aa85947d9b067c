//! Orphan collection: overrides no known consumer still needs

pub mod collector;
pub mod tree;

pub use collector::{remove_overrides, CollectInput, KeepReason, OrphanCollector, Verdict};
pub use tree::{
    lookup_tree, DependencyTree, DependencyTreeProvider, PackageManagerTree, TREE_TIMEOUT,
};
