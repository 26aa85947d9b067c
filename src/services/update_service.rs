//! Update service - one full reconciliation run
//!
//! Load the root manifest, fold it and every workspace into the appendix,
//! attach patches, collect orphans and write the result back.

use crate::appendix::{AppendixBuilder, LedgerSources, ManifestInput};
use crate::context::RunContext;
use crate::manifest::{load_raw, resolve_dialect};
use crate::models::{
    Appendix, DepPaths, Dialect, OverrideConfig, OverrideValue, OverridesMap, PackageJson,
    PastoralistConfig,
};
use crate::orphans::{remove_overrides, CollectInput, DependencyTreeProvider, OrphanCollector};
use crate::overrides::normalize;
use crate::patches::{attach_patches, discover_patches};
use crate::persist::{persist, PersistOptions, EXTERNALIZE_THRESHOLD};
use crate::security::{collect_findings, ReportFileProvider, SecurityProvider, SecurityReport};
use crate::workspace::{
    override_path_packages, FileMatcher, IgnoredPin, RootScan, WorkspaceAggregator,
    WorkspaceSummary,
};
use crate::Result;
use anyhow::Context;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Caller-controlled knobs for a run. Unset fields fall back to configuration.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Directory holding the root manifest and lock files
    pub root_dir: PathBuf,
    /// Root manifest path; defaults to `<root_dir>/package.json`
    pub manifest_path: Option<PathBuf>,
    pub dep_paths: Option<DepPaths>,
    pub ignore: Vec<String>,
    pub dry_run: bool,
    pub compact: Option<bool>,
    pub check_security: bool,
    /// Reasons supplied for this run, by package name
    pub explicit_reasons: BTreeMap<String, String>,
    pub externalize_threshold: usize,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            manifest_path: None,
            dep_paths: None,
            ignore: Vec::new(),
            dry_run: false,
            compact: None,
            check_security: false,
            explicit_reasons: BTreeMap::new(),
            externalize_threshold: EXTERNALIZE_THRESHOLD,
        }
    }
}

impl UpdateOptions {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Default::default()
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        match &self.manifest_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.root_dir.join(path),
            None => self.root_dir.join("package.json"),
        }
    }
}

/// External collaborators a run talks to
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub matcher: &'a dyn FileMatcher,
    pub tree: &'a dyn DependencyTreeProvider,
    /// Overrides the provider derived from `pastoralist.security`
    pub security: Option<&'a dyn SecurityProvider>,
}

/// Everything a run decided
#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    pub manifest: PathBuf,
    pub dialect: Option<Dialect>,
    /// Overrides that survived collection
    pub kept: Vec<String>,
    pub removed: Vec<String>,
    /// Declarations written back as-is because their shape is not understood
    pub opaque: Vec<String>,
    pub appendix: Appendix,
    pub missing_in_root: Vec<String>,
    pub ignored_pins: Vec<IgnoredPin>,
    /// Manifests whose override configuration was ambiguous
    pub ambiguous: Vec<String>,
    pub unused_patches: Vec<String>,
    pub workspaces_scanned: usize,
    /// Workspace manifests that could not be read or parsed
    pub unreadable: Vec<PathBuf>,
    pub dry_run: bool,
    pub written: bool,
    pub suggest_externalize: bool,
    /// Set when the run stopped before reconciling
    pub skipped: Option<String>,
}

/// Run one reconciliation over the project at `options.root_dir`
pub async fn update(
    ctx: &mut RunContext,
    options: &UpdateOptions,
    collaborators: Collaborators<'_>,
) -> Result<UpdateReport> {
    ctx.reset();

    let manifest_path = options.manifest_path();
    let mut report = UpdateReport {
        manifest: manifest_path.clone(),
        dry_run: options.dry_run,
        ..Default::default()
    };

    let Some(raw) = load_raw(ctx, &manifest_path) else {
        log::warn!("No readable manifest at {}", manifest_path.display());
        report.skipped = Some(format!("no readable manifest at {}", manifest_path.display()));
        return Ok(report);
    };
    let root = match PackageJson::from_value(&raw) {
        Ok(root) => root,
        Err(e) => {
            log::warn!("Unexpected manifest shape in {}: {}", manifest_path.display(), e);
            report.skipped = Some(format!("unexpected manifest shape: {}", e));
            return Ok(report);
        }
    };

    let config = load_config(&root, &options.root_dir);

    let mut root_config = match normalize(&root) {
        Ok(Some(config)) => config,
        Ok(None) => OverrideConfig::empty(resolve_dialect(&raw, &options.root_dir)),
        Err(e) => {
            log::warn!("{}: {}", manifest_path.display(), e);
            report.ambiguous.push(format!("{}: {}", manifest_path.display(), e));
            report.skipped = Some(e.to_string());
            return Ok(report);
        }
    };
    report.dialect = Some(root_config.dialect);

    let root_deps = root.merged_dependencies();
    let security = security_report(options, &config, &root_config.overrides, collaborators);
    let sources = LedgerSources {
        explicit_reasons: options.explicit_reasons.clone(),
        configured_reasons: config.override_reasons.clone().unwrap_or_default(),
        security,
    };
    let previous = config.appendix.clone().unwrap_or_default();

    // Root first, then every workspace
    let mut builder = AppendixBuilder::new(&sources, &previous);
    let consumer = root.consumer_name("root");
    builder.add_manifest(
        ctx,
        ManifestInput {
            consumer: &consumer,
            deps: &root_deps,
            overrides: &root_config.overrides,
            only_used_overrides: false,
        },
    );

    let summary = scan_workspaces(
        ctx,
        &mut builder,
        options,
        &config,
        &root,
        RootScan {
            path: &manifest_path,
            deps: &root_deps,
            overrides: &root_config.overrides,
        },
        collaborators.matcher,
    )?;
    let mut appendix = builder.finish();

    let mut all_deps = root_deps.clone();
    all_deps.extend(summary.merged_deps.clone());

    let patches = discover_patches(collaborators.matcher, &options.root_dir)?;
    let patch_report = attach_patches(&mut appendix, &patches, &all_deps)?;

    let collector = OrphanCollector::new(collaborators.tree, &options.root_dir);
    let removable = collector
        .find_removable(
            ctx,
            CollectInput {
                overrides: &root_config.overrides,
                appendix: &appendix,
                root_deps: &root_deps,
                missing_in_root: &summary.missing_in_root,
                override_path_packages: &summary.override_path_packages,
            },
        )
        .await;
    remove_overrides(&mut root_config.overrides, &mut appendix, &removable);

    let outcome = persist(
        ctx,
        &manifest_path,
        &raw,
        &root_config,
        &appendix,
        PersistOptions {
            dry_run: options.dry_run,
            compact: options.compact.unwrap_or_else(|| config.compact()),
            externalize_threshold: options.externalize_threshold,
        },
    )
    .with_context(|| format!("Failed to update {}", manifest_path.display()))?;

    report.kept = root_config.overrides.keys().cloned().collect();
    report.removed = removable;
    report.opaque = root_config.opaque.into_iter().collect();
    report.appendix = appendix;
    report.missing_in_root = summary.missing_in_root.into_iter().collect();
    report.ignored_pins = summary.ignored_pins;
    report.ambiguous.extend(
        summary
            .ambiguous
            .iter()
            .map(|(path, e)| format!("{}: {}", path.display(), e)),
    );
    report.unused_patches = patch_report.unused;
    report.workspaces_scanned = summary.manifests.len();
    report.unreadable = summary.unreadable;
    report.written = outcome.written;
    report.suggest_externalize = outcome.suggest_externalize;

    Ok(report)
}

/// Root manifest `pastoralist` layered over an external config file
fn load_config(root: &PackageJson, root_dir: &Path) -> PastoralistConfig {
    let external = PastoralistConfig::load_external(root_dir)
        .map(|(_, config)| config)
        .unwrap_or_default();
    root.config().layered_over(external)
}

fn scan_workspaces(
    ctx: &mut RunContext,
    builder: &mut AppendixBuilder<'_>,
    options: &UpdateOptions,
    config: &PastoralistConfig,
    root: &PackageJson,
    scan: RootScan<'_>,
    matcher: &dyn FileMatcher,
) -> Result<WorkspaceSummary> {
    let Some(dep_paths) = options.dep_paths.as_ref().or(config.dep_paths.as_ref()) else {
        return Ok(WorkspaceSummary {
            override_path_packages: config
                .override_paths
                .as_ref()
                .map(override_path_packages)
                .unwrap_or_default(),
            ..Default::default()
        });
    };

    let mut ignore = config.ignore.clone().unwrap_or_default();
    ignore.extend(options.ignore.iter().cloned());

    let aggregator = WorkspaceAggregator::new(matcher, &options.root_dir, ignore);
    aggregator.aggregate(
        ctx,
        builder,
        scan,
        &dep_paths.patterns(root),
        config.override_paths.as_ref(),
    )
}

/// Every package a ledger may be created for: simple names and nested children
fn pinned_packages(overrides: &OverridesMap) -> Vec<String> {
    let mut packages: Vec<String> = overrides
        .iter()
        .flat_map(|(name, value)| match value {
            OverrideValue::Simple(_) => vec![name.clone()],
            OverrideValue::Nested(children) => children.keys().cloned().collect(),
        })
        .collect();
    packages.sort();
    packages.dedup();
    packages
}

fn security_report(
    options: &UpdateOptions,
    config: &PastoralistConfig,
    overrides: &OverridesMap,
    collaborators: Collaborators<'_>,
) -> SecurityReport {
    if !(options.check_security || config.security_enabled()) {
        return SecurityReport::default();
    }

    let settings = config.security.clone().unwrap_or_default();
    let packages = pinned_packages(overrides);

    if let Some(provider) = collaborators.security {
        return collect_findings(provider, &packages, &settings.exclude_packages);
    }

    match &settings.report_file {
        Some(report_file) => {
            let provider = ReportFileProvider::new(
                settings.provider.clone().unwrap_or_else(|| "report".to_string()),
                options.root_dir.join(report_file),
            );
            collect_findings(&provider, &packages, &settings.exclude_packages)
        }
        None => {
            log::warn!("Security checks enabled but no provider is configured");
            SecurityReport::default()
        }
    }
}
