//! File discovery behind a small trait so callers can swap the matcher

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Always ignored during discovery
pub const DEFAULT_IGNORE: &[&str] = &["**/node_modules/**"];

/// Lists files matching glob patterns under a root directory
pub trait FileMatcher {
    /// Sorted, deduplicated matches. Ignore patterns are matched against
    /// root-relative paths.
    fn find(&self, root: &Path, patterns: &[String], ignore: &[String]) -> Result<Vec<PathBuf>>;
}

/// [`FileMatcher`] backed by the `glob` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobMatcher;

impl FileMatcher for GlobMatcher {
    fn find(&self, root: &Path, patterns: &[String], ignore: &[String]) -> Result<Vec<PathBuf>> {
        let ignore = DEFAULT_IGNORE
            .iter()
            .map(|p| p.to_string())
            .chain(ignore.iter().cloned())
            .map(|p| glob::Pattern::new(&p).with_context(|| format!("Invalid ignore pattern '{}'", p)))
            .collect::<Result<Vec<_>>>()?;

        let mut found = BTreeSet::new();
        for pattern in patterns {
            let full = root.join(pattern);
            let full = full.to_string_lossy();
            let entries = glob::glob(&full)
                .with_context(|| format!("Invalid glob pattern '{}'", pattern))?;

            for entry in entries {
                let path = match entry {
                    Ok(path) => path,
                    Err(e) => {
                        log::debug!("Skipping unreadable path: {}", e);
                        continue;
                    }
                };
                let relative = path.strip_prefix(root).unwrap_or(&path);
                if ignore.iter().any(|p| p.matches_path(relative)) {
                    continue;
                }
                if path.is_file() {
                    found.insert(path);
                }
            }
        }

        Ok(found.into_iter().collect())
    }
}
