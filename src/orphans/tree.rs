//! Full dependency tree from the host package manager

use crate::context::{RunContext, TreeLookup};
use crate::manifest::PackageManager;
use anyhow::{Context, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Bound on the package manager listing
pub const TREE_TIMEOUT: Duration = Duration::from_secs(30);

static UNKNOWN_TREE: TreeLookup = TreeLookup::Unknown;

/// Package name -> present anywhere in the installed tree
pub type DependencyTree = BTreeMap<String, bool>;

#[async_trait]
pub trait DependencyTreeProvider: Send + Sync {
    async fn dependency_tree(&self, root: &Path) -> Result<DependencyTree>;
}

/// Shells out to the project's package manager
#[derive(Debug, Clone)]
pub struct PackageManagerTree {
    manager: PackageManager,
    show_progress: bool,
}

impl PackageManagerTree {
    pub fn new(manager: PackageManager) -> Self {
        Self {
            manager,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Command and arguments producing a JSON listing
    fn invocation(&self) -> (&'static str, Vec<&'static str>) {
        match self.manager {
            // bun has no JSON listing; npm reads the same node_modules
            PackageManager::Npm | PackageManager::Bun => ("npm", vec!["ls", "--all", "--json"]),
            PackageManager::Pnpm => ("pnpm", vec!["ls", "--depth", "Infinity", "--json"]),
            PackageManager::Yarn => ("yarn", vec!["list", "--json", "--silent"]),
        }
    }

    fn parse(&self, stdout: &str) -> Result<DependencyTree> {
        match self.manager {
            PackageManager::Npm | PackageManager::Bun => {
                let value: Value = serde_json::from_str(stdout).context("Invalid npm ls output")?;
                Ok(parse_npm_tree(&value))
            }
            PackageManager::Pnpm => {
                let value: Value = serde_json::from_str(stdout).context("Invalid pnpm ls output")?;
                Ok(parse_pnpm_tree(&value))
            }
            PackageManager::Yarn => parse_yarn_tree(stdout),
        }
    }
}

#[async_trait]
impl DependencyTreeProvider for PackageManagerTree {
    async fn dependency_tree(&self, root: &Path) -> Result<DependencyTree> {
        let (program, args) = self.invocation();

        let progress = if self.show_progress {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} {msg}")
                    .context("Invalid spinner template")?,
            );
            pb.set_message(format!("Listing dependencies with {}...", program));
            pb.enable_steady_tick(Duration::from_millis(100));
            Some(pb)
        } else {
            None
        };

        let child = Command::new(program)
            .args(&args)
            .current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let result = tokio::time::timeout(TREE_TIMEOUT, child).await;

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        let output = result
            .map_err(|_| anyhow::anyhow!("'{} {}' timed out after {:?}", program, args.join(" "), TREE_TIMEOUT))?
            .with_context(|| format!("Failed to run '{}'", program))?;

        // `npm ls` exits non-zero on peer warnings while still printing a tree
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            anyhow::bail!(
                "'{}' produced no output (exit {}): {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        self.parse(&stdout)
    }
}

/// Fetch the tree once per run. Failures degrade to [`TreeLookup::Unknown`].
pub async fn lookup_tree<'c>(
    ctx: &'c mut RunContext,
    provider: &dyn DependencyTreeProvider,
    root: &Path,
) -> &'c TreeLookup {
    if ctx.dependency_tree().is_none() {
        let lookup = match provider.dependency_tree(root).await {
            Ok(tree) => {
                log::debug!("Dependency tree has {} packages", tree.len());
                TreeLookup::Known(tree)
            }
            Err(e) => {
                log::warn!("Dependency tree unavailable, keeping transitive overrides: {:#}", e);
                TreeLookup::Unknown
            }
        };
        ctx.set_dependency_tree(lookup);
    }

    ctx.dependency_tree().unwrap_or(&UNKNOWN_TREE)
}

fn collect_npm(node: &Value, tree: &mut DependencyTree) {
    let Some(deps) = node.get("dependencies").and_then(Value::as_object) else {
        return;
    };
    for (name, child) in deps {
        tree.insert(name.clone(), true);
        collect_npm(child, tree);
    }
}

/// `npm ls --all --json`: nested `dependencies` objects keyed by name
pub fn parse_npm_tree(root: &Value) -> DependencyTree {
    let mut tree = DependencyTree::new();
    collect_npm(root, &mut tree);
    tree
}

fn collect_pnpm(node: &Value, tree: &mut DependencyTree) {
    for field in ["dependencies", "devDependencies", "optionalDependencies"] {
        if let Some(deps) = node.get(field).and_then(Value::as_object) {
            for (name, child) in deps {
                tree.insert(name.clone(), true);
                collect_pnpm(child, tree);
            }
        }
    }
}

/// `pnpm ls --json`: an array of projects
pub fn parse_pnpm_tree(root: &Value) -> DependencyTree {
    let mut tree = DependencyTree::new();
    match root.as_array() {
        Some(projects) => projects.iter().for_each(|p| collect_pnpm(p, &mut tree)),
        None => collect_pnpm(root, &mut tree),
    }
    tree
}

fn collect_yarn(nodes: &[Value], tree: &mut DependencyTree) {
    for node in nodes {
        if let Some(name) = node.get("name").and_then(Value::as_str) {
            let package = crate::models::appendix::key_name(name);
            tree.insert(package.to_string(), true);
        }
        if let Some(children) = node.get("children").and_then(Value::as_array) {
            collect_yarn(children, tree);
        }
    }
}

/// `yarn list --json`: newline-delimited events, one of type `tree`
pub fn parse_yarn_tree(output: &str) -> Result<DependencyTree> {
    let mut tree = DependencyTree::new();
    let mut saw_tree = false;

    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        if event.get("type").and_then(Value::as_str) != Some("tree") {
            continue;
        }
        saw_tree = true;
        if let Some(trees) = event.pointer("/data/trees").and_then(Value::as_array) {
            collect_yarn(trees, &mut tree);
        }
    }

    if !saw_tree {
        anyhow::bail!("yarn list produced no tree event");
    }
    Ok(tree)
}
