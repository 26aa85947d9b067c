use super::appendix::Appendix;
use super::lenient;
use super::manifest::PackageJson;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// External configuration files, checked in order
const EXTERNAL_CONFIG_FILES: &[&str] = &[".pastoralistrc.json", ".pastoralistrc", "pastoralist.json"];

/// The `pastoralist` object of a root manifest (or an external config file)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PastoralistConfig {
    /// Previously persisted appendix
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::appendix"
    )]
    pub appendix: Option<Appendix>,

    /// Where to look for workspace manifests
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::or_default"
    )]
    pub dep_paths: Option<DepPaths>,

    /// Pre-computed appendix per manifest path
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::override_paths"
    )]
    pub override_paths: Option<BTreeMap<String, Appendix>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::or_default"
    )]
    pub security: Option<SecurityConfig>,

    /// Manually configured reasons, by package name
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::or_default"
    )]
    pub override_reasons: Option<BTreeMap<String, String>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::or_default"
    )]
    pub compact_appendix: Option<bool>,

    /// Extra ignore globs for workspace discovery
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::or_default"
    )]
    pub ignore: Option<Vec<String>>,
}

/// `depPaths`: a keyword pointing at the `workspaces` field, or explicit globs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DepPaths {
    Keyword(String),
    Patterns(Vec<String>),
}

impl DepPaths {
    /// Expand into manifest glob patterns relative to the root directory
    pub fn patterns(&self, root: &PackageJson) -> Vec<String> {
        match self {
            DepPaths::Keyword(keyword) if keyword == "workspace" || keyword == "workspaces" => root
                .workspaces
                .as_ref()
                .map(|w| {
                    w.patterns()
                        .iter()
                        .map(|pattern| manifest_glob(pattern))
                        .collect()
                })
                .unwrap_or_default(),
            DepPaths::Keyword(pattern) => vec![pattern.clone()],
            DepPaths::Patterns(patterns) => patterns.clone(),
        }
    }
}

/// `packages/*` -> `packages/*/package.json`; patterns already naming a
/// manifest are kept as they are.
fn manifest_glob(pattern: &str) -> String {
    if pattern.ends_with("package.json") {
        pattern.to_string()
    } else {
        format!("{}/package.json", pattern.trim_end_matches('/'))
    }
}

/// Security settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub enabled: bool,

    /// Provider label recorded in ledgers (e.g. "osv")
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::or_default"
    )]
    pub provider: Option<String>,

    /// Advisory report consumed by the offline provider
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::or_default"
    )]
    pub report_file: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "lenient::or_default"
    )]
    pub exclude_packages: Vec<String>,
}

impl PastoralistConfig {
    /// Load the first external configuration file found in `dir`.
    ///
    /// An unreadable or invalid file is reported and treated as absent.
    pub fn load_external(dir: &Path) -> Option<(PathBuf, Self)> {
        for name in EXTERNAL_CONFIG_FILES {
            let path = dir.join(name);
            if !path.is_file() {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|content| serde_json::from_str(&content).map_err(anyhow::Error::from))
            {
                Ok(config) => {
                    log::debug!("Loaded external config {}", path.display());
                    return Some((path, config));
                }
                Err(e) => {
                    log::warn!("Ignoring invalid config {}: {}", path.display(), e);
                }
            }
        }
        None
    }

    /// Layer `self` over `lower`: fields set here win, unset fields fall back.
    pub fn layered_over(self, lower: PastoralistConfig) -> PastoralistConfig {
        PastoralistConfig {
            appendix: self.appendix.or(lower.appendix),
            dep_paths: self.dep_paths.or(lower.dep_paths),
            override_paths: self.override_paths.or(lower.override_paths),
            security: self.security.or(lower.security),
            override_reasons: self.override_reasons.or(lower.override_reasons),
            compact_appendix: self.compact_appendix.or(lower.compact_appendix),
            ignore: self.ignore.or(lower.ignore),
        }
    }

    pub fn compact(&self) -> bool {
        self.compact_appendix.unwrap_or(false)
    }

    pub fn security_enabled(&self) -> bool {
        self.security.as_ref().is_some_and(|s| s.enabled)
    }
}
