//! Decide which overrides nothing needs anymore and remove them

use super::tree::{lookup_tree, DependencyTreeProvider};
use crate::context::{RunContext, TreeLookup};
use crate::models::appendix::key_name;
use crate::models::{Appendix, OverrideValue, OverridesMap};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Why an override survives collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepReason {
    /// Tracked through `overridePaths`
    OverridePaths,
    /// A manifest uses the pin directly or through a nested override
    Dependents,
    /// The root manifest depends on the package
    RootDependency,
    /// Workspaces depend on it even though the root does not
    MissingInRoot,
    /// Present in the installed dependency tree
    InTree,
    /// The tree could not be listed; assume it is still used
    TreeUnknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep(KeepReason),
    Remove,
}

/// Everything the collector judges against
#[derive(Debug, Clone, Copy)]
pub struct CollectInput<'a> {
    pub overrides: &'a OverridesMap,
    pub appendix: &'a Appendix,
    pub root_deps: &'a BTreeMap<String, String>,
    pub missing_in_root: &'a BTreeSet<String>,
    pub override_path_packages: &'a BTreeSet<String>,
}

pub struct OrphanCollector<'p> {
    provider: &'p dyn DependencyTreeProvider,
    root_dir: PathBuf,
}

impl<'p> OrphanCollector<'p> {
    pub fn new(provider: &'p dyn DependencyTreeProvider, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            root_dir: root_dir.into(),
        }
    }

    /// Verdict for every declared override, by name.
    ///
    /// The dependency tree is only listed when some simple override cannot be
    /// decided from the manifests alone.
    pub async fn judge(
        &self,
        ctx: &mut RunContext,
        input: CollectInput<'_>,
    ) -> BTreeMap<String, Verdict> {
        let mut verdicts = BTreeMap::new();
        let mut undecided = Vec::new();

        for (name, value) in input.overrides {
            match static_verdict(name, value, input) {
                Some(verdict) => {
                    verdicts.insert(name.clone(), verdict);
                }
                None => undecided.push(name.clone()),
            }
        }

        if !undecided.is_empty() {
            let lookup = lookup_tree(ctx, self.provider, &self.root_dir).await;
            for name in undecided {
                verdicts.insert(name.clone(), tree_verdict(&name, lookup));
            }
        }

        verdicts
    }

    /// Names of removable overrides, sorted
    pub async fn find_removable(&self, ctx: &mut RunContext, input: CollectInput<'_>) -> Vec<String> {
        self.judge(ctx, input)
            .await
            .into_iter()
            .filter(|(_, verdict)| *verdict == Verdict::Remove)
            .map(|(name, _)| name)
            .collect()
    }
}

/// Verdict from manifests alone; `None` means the tree must decide
fn static_verdict(name: &str, value: &OverrideValue, input: CollectInput<'_>) -> Option<Verdict> {
    if input.override_path_packages.contains(name) {
        return Some(Verdict::Keep(KeepReason::OverridePaths));
    }

    if !value.is_nested() {
        let used = input
            .appendix
            .iter()
            .any(|(key, entry)| key_name(key) == name && entry.has_conclusive_dependent());
        if used {
            return Some(Verdict::Keep(KeepReason::Dependents));
        }
    }

    if input.root_deps.contains_key(name) {
        return Some(Verdict::Keep(KeepReason::RootDependency));
    }

    if input.missing_in_root.contains(name) {
        return Some(Verdict::Keep(KeepReason::MissingInRoot));
    }

    // Nested overrides are judged on the parent alone; the tree never applies
    if value.is_nested() {
        return Some(Verdict::Remove);
    }

    None
}

fn tree_verdict(name: &str, lookup: &TreeLookup) -> Verdict {
    match lookup {
        TreeLookup::Known(tree) if tree.get(name).copied().unwrap_or(false) => {
            Verdict::Keep(KeepReason::InTree)
        }
        TreeLookup::Known(_) => Verdict::Remove,
        TreeLookup::Unknown => Verdict::Keep(KeepReason::TreeUnknown),
    }
}

/// Delete each named override and every appendix entry keyed `"{name}@*"`
pub fn remove_overrides(overrides: &mut OverridesMap, appendix: &mut Appendix, names: &[String]) {
    for name in names {
        overrides.remove(name);
        appendix.retain(|key, _| key_name(key) != name);
        log::info!("Removed unused override '{}'", name);
    }
}
