//! `pastoralist update` CLI command

use crate::context::RunContext;
use crate::manifest::PackageManager;
use crate::models::DepPaths;
use crate::orphans::PackageManagerTree;
use crate::services::update_service::{self, Collaborators, UpdateOptions, UpdateReport};
use crate::workspace::GlobMatcher;
use crate::Result;
use clap::Args;
use colored::Colorize;
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

#[derive(Args, Debug, Default)]
pub struct UpdateArgs {
    /// Root manifest (default: ./package.json)
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Project root directory (default: current directory)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Workspace manifest globs, or "workspace" to use the workspaces field
    #[arg(long = "depPaths", alias = "dep-paths", num_args = 1..)]
    pub dep_paths: Vec<String>,

    /// Extra ignore globs for workspace discovery
    #[arg(long, num_args = 1..)]
    pub ignore: Vec<String>,

    /// Report what would change without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Write the compact appendix form
    #[arg(long)]
    pub compact: bool,

    /// Reason recorded in new ledgers, as name=text (repeatable)
    #[arg(long = "reason", value_name = "NAME=TEXT")]
    pub reasons: Vec<String>,

    /// Attach security findings to new ledgers
    #[arg(long)]
    pub security: bool,

    /// Hide the progress spinner
    #[arg(long)]
    pub no_progress: bool,
}

impl UpdateArgs {
    fn options(&self, root_dir: PathBuf) -> Result<UpdateOptions> {
        let dep_paths = match self.dep_paths.as_slice() {
            [] => None,
            [single] if single == "workspace" || single == "workspaces" => {
                Some(DepPaths::Keyword(single.clone()))
            }
            many => Some(DepPaths::Patterns(many.to_vec())),
        };

        Ok(UpdateOptions {
            root_dir,
            manifest_path: self.path.clone(),
            dep_paths,
            ignore: self.ignore.clone(),
            dry_run: self.dry_run,
            compact: self.compact.then_some(true),
            check_security: self.security,
            explicit_reasons: parse_reasons(&self.reasons)?,
            ..Default::default()
        })
    }
}

/// `name=text` pairs into a reason map
pub fn parse_reasons(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((name, reason)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), reason.trim().to_string()))
            }
            _ => Err(anyhow::anyhow!("Invalid --reason '{}': expected name=text", pair)),
        })
        .collect()
}

pub async fn run(args: UpdateArgs) -> Result<()> {
    let root_dir = match &args.root {
        Some(root) => root.clone(),
        None => env::current_dir()?,
    };
    let options = args.options(root_dir.clone())?;

    let manager = PackageManager::detect(&root_dir);
    log::debug!("Detected package manager: {}", manager.command());

    let tree = PackageManagerTree::new(manager).with_progress(!args.no_progress);
    let matcher = GlobMatcher;
    let mut ctx = RunContext::new();

    let report = update_service::update(
        &mut ctx,
        &options,
        Collaborators {
            matcher: &matcher,
            tree: &tree,
            security: None,
        },
    )
    .await?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &UpdateReport) {
    if let Some(reason) = &report.skipped {
        println!("{}", format!("⚠ Skipped: {}", reason).yellow());
        for message in &report.ambiguous {
            println!("   {}", message.yellow());
        }
        return;
    }

    println!(
        "{}",
        format!("🌾 Overrides for {}", report.manifest.display()).cyan().bold()
    );
    if let Some(dialect) = report.dialect {
        println!("   Dialect:    {}", dialect);
    }
    if report.workspaces_scanned > 0 {
        println!("   Workspaces: {}", report.workspaces_scanned);
    }
    println!("   Tracked:    {}", report.appendix.len());

    if !report.removed.is_empty() {
        println!();
        println!("{}", "Removed unused overrides:".yellow());
        for name in &report.removed {
            println!("   - {}", name.yellow());
        }
    }

    if !report.opaque.is_empty() {
        println!();
        println!("{}", "Left as declared (unrecognized shape):".bright_black());
        for name in &report.opaque {
            println!("   • {}", name);
        }
    }

    if !report.missing_in_root.is_empty() {
        println!();
        println!("{}", "Used only by workspaces:".cyan());
        for name in &report.missing_in_root {
            println!("   • {}", name);
        }
    }

    if !report.ignored_pins.is_empty() {
        println!();
        println!("{}", "Workspace overrides ignored (declare them in the root):".yellow());
        for pin in &report.ignored_pins {
            println!("   • {} ({})", pin.name, pin.manifest.display());
        }
    }

    for message in &report.ambiguous {
        println!("{}", format!("⚠ {}", message).yellow());
    }

    if !report.unreadable.is_empty() {
        println!();
        println!("{}", "Workspace manifests that could not be read:".yellow());
        for path in &report.unreadable {
            println!("   • {}", path.display());
        }
    }

    if !report.unused_patches.is_empty() {
        println!();
        println!("{}", "Patches for packages no longer depended on:".yellow());
        for patch in &report.unused_patches {
            println!("   • {}", patch);
        }
    }

    if report.suggest_externalize {
        println!();
        println!(
            "{}",
            "💡 The pastoralist config is getting long; consider moving it to .pastoralistrc.json"
                .bright_black()
        );
    }

    println!();
    if report.dry_run {
        println!("{}", "Dry run: package.json was not written".bright_black());
    } else if report.written {
        println!("{}", "✅ package.json updated".green());
    } else {
        println!("{}", "✅ package.json already up to date".green());
    }
}
