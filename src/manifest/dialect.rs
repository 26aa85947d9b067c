//! Which override dialect a project uses, and which package manager runs it

use crate::models::Dialect;
use serde_json::Value;
use std::path::Path;

/// Host package manager, detected from lock files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
    Bun,
}

impl PackageManager {
    /// Lock files, checked in this order
    const LOCK_FILES: &'static [(&'static str, PackageManager)] = &[
        ("bun.lockb", PackageManager::Bun),
        ("bun.lock", PackageManager::Bun),
        ("yarn.lock", PackageManager::Yarn),
        ("pnpm-lock.yaml", PackageManager::Pnpm),
        ("package-lock.json", PackageManager::Npm),
        ("npm-shrinkwrap.json", PackageManager::Npm),
    ];

    /// Detect from lock files in `dir`, defaulting to npm
    pub fn detect(dir: &Path) -> Self {
        Self::LOCK_FILES
            .iter()
            .find(|(file, _)| dir.join(file).exists())
            .map(|(_, manager)| *manager)
            .unwrap_or(PackageManager::Npm)
    }

    /// Dialect this package manager reads
    pub fn dialect(&self) -> Dialect {
        match self {
            PackageManager::Npm | PackageManager::Bun => Dialect::Npm,
            PackageManager::Yarn => Dialect::Yarn,
            PackageManager::Pnpm => Dialect::Pnpm,
        }
    }

    pub fn command(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Yarn => "yarn",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Bun => "bun",
        }
    }
}

/// Dialect whose block is already present in the manifest, if any.
///
/// Priority is `resolutions > overrides > pnpm.overrides`.
pub fn existing_dialect(manifest: &Value) -> Option<Dialect> {
    Dialect::PRIORITY
        .into_iter()
        .find(|dialect| dialect.block(manifest).is_some())
}

/// Dialect to write to: keep the manifest's convention, otherwise follow the
/// lock file in `dir`.
pub fn resolve_dialect(manifest: &Value, dir: &Path) -> Dialect {
    existing_dialect(manifest).unwrap_or_else(|| {
        let dialect = PackageManager::detect(dir).dialect();
        log::debug!("No override block found, using {} from lock files", dialect);
        dialect
    })
}
