//! Attach on-disk patch files to the appendix entries they modify

use crate::models::appendix::key_name;
use crate::models::Appendix;
use crate::workspace::FileMatcher;
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where patch files are looked up, relative to the root directory
pub const PATCH_PATTERNS: &[&str] = &["patches/*.patch", "**/patches/*.patch"];

/// Result of attaching patches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Appendix entries that received patches
    pub attached: usize,
    /// Patch files whose package is no longer a dependency
    pub unused: Vec<String>,
}

/// Parses patch file names into package names
pub struct PatchNameParser {
    re: Regex,
}

impl PatchNameParser {
    pub fn new() -> Result<Self> {
        // @scope+pkg[+version] or name[+version]
        let re = Regex::new(r"^(?:(@[^+]+)\+([^+]+)|([^@+][^+]*))(?:\+.*)?$")
            .context("Failed to compile patch name regex")?;
        Ok(Self { re })
    }

    /// `lodash+4.17.21.patch` -> `lodash`, `@babel+core+7.20.0.patch` ->
    /// `@babel/core`, `lodash.patch` -> `lodash`
    pub fn package_name(&self, path: &Path) -> Option<String> {
        let file_name = path.file_name()?.to_str()?;
        let stem = file_name.strip_suffix(".patch")?;
        let caps = self.re.captures(stem)?;

        match (caps.get(1), caps.get(2), caps.get(3)) {
            (Some(scope), Some(pkg), _) => Some(format!("{}/{}", scope.as_str(), pkg.as_str())),
            (_, _, Some(name)) => Some(name.as_str().to_string()),
            _ => None,
        }
    }
}

/// Patch files under `root`, as sorted root-relative paths with `/` separators
pub fn discover_patches(matcher: &dyn FileMatcher, root: &Path) -> Result<Vec<String>> {
    let patterns: Vec<String> = PATCH_PATTERNS.iter().map(|p| p.to_string()).collect();
    let found: Vec<PathBuf> = matcher.find(root, &patterns, &[])?;

    Ok(found
        .iter()
        .map(|path| relative_display(root, path))
        .collect())
}

fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Attach patches to every appendix entry whose package they modify and
/// report patches for packages no longer in `merged_deps`.
pub fn attach_patches(
    appendix: &mut Appendix,
    patches: &[String],
    merged_deps: &BTreeMap<String, String>,
) -> Result<PatchReport> {
    let parser = PatchNameParser::new()?;
    let mut by_package: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut report = PatchReport::default();

    for patch in patches {
        let Some(package) = parser.package_name(Path::new(patch)) else {
            log::debug!("Cannot derive a package name from {}", patch);
            continue;
        };

        if !merged_deps.contains_key(&package) {
            log::warn!("Patch {} targets '{}', which is no longer a dependency", patch, package);
            report.unused.push(patch.clone());
        }

        by_package.entry(package).or_default().push(patch.clone());
    }

    for (key, entry) in appendix.iter_mut() {
        if let Some(list) = by_package.get(key_name(key)) {
            let mut list = list.clone();
            list.sort();
            entry.patches = Some(list);
            report.attached += 1;
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppendixEntry;
    use crate::workspace::GlobMatcher;
    use tempfile::TempDir;

    #[test]
    fn test_package_name_forms() {
        let parser = PatchNameParser::new().unwrap();
        let name = |p: &str| parser.package_name(Path::new(p));

        assert_eq!(name("patches/lodash+4.17.21.patch").as_deref(), Some("lodash"));
        assert_eq!(
            name("patches/@babel+core+7.20.0.patch").as_deref(),
            Some("@babel/core")
        );
        assert_eq!(name("patches/@types+node.patch").as_deref(), Some("@types/node"));
        assert_eq!(name("patches/left-pad.patch").as_deref(), Some("left-pad"));
        assert_eq!(name("patches/README.md"), None);
    }

    #[test]
    fn test_attach_and_report_unused() {
        let mut appendix = Appendix::from([
            ("@babel/core@7.20.0".to_string(), AppendixEntry::default()),
            ("lodash@4.17.21".to_string(), AppendixEntry::default()),
        ]);
        let merged_deps = BTreeMap::from([("@babel/core".to_string(), "^7.20.0".to_string())]);
        let patches = vec![
            "patches/@babel+core+7.20.0.patch".to_string(),
            "patches/moment+2.29.1.patch".to_string(),
        ];

        let report = attach_patches(&mut appendix, &patches, &merged_deps).unwrap();

        assert_eq!(report.attached, 1);
        assert_eq!(report.unused, vec!["patches/moment+2.29.1.patch"]);
        assert_eq!(
            appendix["@babel/core@7.20.0"].patches.as_deref(),
            Some(&["patches/@babel+core+7.20.0.patch".to_string()][..])
        );
        assert!(appendix["lodash@4.17.21"].patches.is_none());
    }

    #[test]
    fn test_discover_patches_relative_paths() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("patches")).unwrap();
        std::fs::create_dir_all(root.join("packages/web/patches")).unwrap();
        std::fs::write(root.join("patches/lodash+4.17.21.patch"), "").unwrap();
        std::fs::write(root.join("packages/web/patches/react.patch"), "").unwrap();

        let found = discover_patches(&GlobMatcher, root).unwrap();
        assert_eq!(
            found,
            vec![
                "packages/web/patches/react.patch".to_string(),
                "patches/lodash+4.17.21.patch".to_string()
            ]
        );
    }
}
