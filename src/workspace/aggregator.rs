//! Drive the appendix builder across every workspace manifest

use super::matcher::FileMatcher;
use crate::appendix::{AppendixBuilder, ManifestInput};
use crate::context::RunContext;
use crate::manifest::{load_manifest, normalize_path};
use crate::models::appendix::key_name;
use crate::models::{Appendix, OverridesMap};
use crate::overrides::{normalize, NormalizeError};
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// Proceeding would produce an appendix that looks like "nothing needed"
    #[error("No workspace manifests matched: {}", .patterns.join(", "))]
    NoMatches { patterns: Vec<String> },
}

/// The root manifest as seen by the aggregator
#[derive(Debug, Clone, Copy)]
pub struct RootScan<'a> {
    pub path: &'a Path,
    pub deps: &'a BTreeMap<String, String>,
    pub overrides: &'a OverridesMap,
}

/// An override a workspace declares that the root does not.
/// Package managers only honor root overrides, so it is never pinned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredPin {
    pub manifest: PathBuf,
    pub name: String,
}

/// What the workspace pass learned
#[derive(Debug, Clone, Default)]
pub struct WorkspaceSummary {
    /// Workspace manifests that were scanned
    pub manifests: Vec<PathBuf>,
    /// Merged dependencies across all workspace manifests, last write wins
    pub merged_deps: BTreeMap<String, String>,
    /// Overrides workspaces depend on but the root does not
    pub missing_in_root: BTreeSet<String>,
    /// Packages tracked through `overridePaths`; never collected
    pub override_path_packages: BTreeSet<String>,
    pub ignored_pins: Vec<IgnoredPin>,
    pub ambiguous: Vec<(PathBuf, NormalizeError)>,
    pub unreadable: Vec<PathBuf>,
}

pub struct WorkspaceAggregator<'m> {
    matcher: &'m dyn FileMatcher,
    root_dir: PathBuf,
    ignore: Vec<String>,
}

impl<'m> WorkspaceAggregator<'m> {
    pub fn new(matcher: &'m dyn FileMatcher, root_dir: impl Into<PathBuf>, ignore: Vec<String>) -> Self {
        Self {
            matcher,
            root_dir: root_dir.into(),
            ignore,
        }
    }

    /// Workspace manifests matching `patterns`, excluding the root manifest.
    ///
    /// Supplied patterns that match nothing are a hard failure.
    pub fn discover(&self, patterns: &[String], root_manifest: &Path) -> Result<Vec<PathBuf>> {
        let root_manifest = normalize_path(root_manifest);
        let manifests: Vec<PathBuf> = self
            .matcher
            .find(&self.root_dir, patterns, &self.ignore)?
            .into_iter()
            .filter(|path| normalize_path(path) != root_manifest)
            .collect();

        if manifests.is_empty() {
            return Err(WorkspaceError::NoMatches {
                patterns: patterns.to_vec(),
            }
            .into());
        }

        log::info!("Found {} workspace manifest(s)", manifests.len());
        Ok(manifests)
    }

    /// Discover, scan and fold every workspace manifest into `builder`, then
    /// merge `overridePaths` entries for overrides the root does not use.
    pub fn aggregate(
        &self,
        ctx: &mut RunContext,
        builder: &mut AppendixBuilder<'_>,
        root: RootScan<'_>,
        patterns: &[String],
        override_paths: Option<&BTreeMap<String, Appendix>>,
    ) -> Result<WorkspaceSummary> {
        let mut summary = WorkspaceSummary::default();

        if patterns.is_empty() {
            log::warn!("Workspace scanning requested but no patterns resolved");
        } else {
            for path in self.discover(patterns, root.path)? {
                self.scan_manifest(ctx, builder, root, &path, &mut summary);
            }
        }

        summary.missing_in_root = missing_in_root(root, &summary.merged_deps);
        if !summary.missing_in_root.is_empty() {
            log::info!(
                "Overrides used by workspaces but not by the root: {}",
                summary
                    .missing_in_root
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        if let Some(override_paths) = override_paths {
            merge_override_paths(builder, override_paths, &mut summary);
        }

        Ok(summary)
    }

    fn scan_manifest(
        &self,
        ctx: &mut RunContext,
        builder: &mut AppendixBuilder<'_>,
        root: RootScan<'_>,
        path: &Path,
        summary: &mut WorkspaceSummary,
    ) {
        let Some(manifest) = load_manifest(ctx, path) else {
            summary.unreadable.push(path.to_path_buf());
            return;
        };

        let label = path
            .strip_prefix(&self.root_dir)
            .unwrap_or(path)
            .display()
            .to_string();

        let own_overrides = match normalize(&manifest) {
            Ok(config) => config.map(|c| c.overrides).unwrap_or_default(),
            Err(e) => {
                log::warn!("{}: {}", label, e);
                summary.ambiguous.push((path.to_path_buf(), e));
                OverridesMap::new()
            }
        };

        let (overrides, ignored) = unify_overrides(root.overrides, &own_overrides);
        for name in ignored {
            log::warn!(
                "{}: override '{}' is only declared in this workspace; move it to the root manifest",
                label,
                name
            );
            summary.ignored_pins.push(IgnoredPin {
                manifest: path.to_path_buf(),
                name,
            });
        }

        let deps = manifest.merged_dependencies();
        let consumer = manifest.consumer_name(&label);
        builder.add_manifest(
            ctx,
            ManifestInput {
                consumer: &consumer,
                deps: &deps,
                overrides: &overrides,
                only_used_overrides: true,
            },
        );

        summary.merged_deps.extend(deps);
        summary.manifests.push(path.to_path_buf());
    }
}

/// Overrides applied to a workspace: the root's, which win on conflict.
/// Names only the workspace declares are returned separately.
pub fn unify_overrides(root: &OverridesMap, workspace: &OverridesMap) -> (OverridesMap, Vec<String>) {
    let mut ignored = Vec::new();

    for (name, value) in workspace {
        match root.get(name) {
            None => ignored.push(name.clone()),
            Some(pinned) if pinned != value => {
                log::debug!("Root override for '{}' takes precedence over workspace value", name);
            }
            Some(_) => {}
        }
    }

    (root.clone(), ignored)
}

/// Override names (nested parents included) that workspaces depend on but
/// the root manifest does not
pub fn missing_in_root(root: RootScan<'_>, workspace_deps: &BTreeMap<String, String>) -> BTreeSet<String> {
    root.overrides
        .keys()
        .filter(|name| !root.deps.contains_key(*name) && workspace_deps.contains_key(*name))
        .cloned()
        .collect()
}

/// Package names tracked through `overridePaths`
pub fn override_path_packages(override_paths: &BTreeMap<String, Appendix>) -> BTreeSet<String> {
    override_paths
        .values()
        .flat_map(|appendix| appendix.keys())
        .map(|key| key_name(key).to_string())
        .collect()
}

fn merge_override_paths(
    builder: &mut AppendixBuilder<'_>,
    override_paths: &BTreeMap<String, Appendix>,
    summary: &mut WorkspaceSummary,
) {
    summary.override_path_packages = override_path_packages(override_paths);

    for (path, appendix) in override_paths {
        for (key, entry) in appendix {
            if summary.missing_in_root.contains(key_name(key)) {
                log::debug!("Merging {} from overridePaths[{}]", key, path);
                builder.merge_entry(key, entry);
            }
        }
    }
}
