//! Security findings consumed when building ledgers.
//!
//! Network advisory clients live outside this crate; they plug in through
//! [`SecurityProvider`]. Two offline providers ship here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// What a provider knows about one vulnerable package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityFinding {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub cve: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Findings keyed by package name
pub type SecurityFindings = BTreeMap<String, SecurityFinding>;

/// Findings for the run plus the provider that produced them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityReport {
    pub provider: Option<String>,
    pub findings: SecurityFindings,
}

impl SecurityReport {
    pub fn get(&self, package: &str) -> Option<&SecurityFinding> {
        self.findings.get(package)
    }
}

pub trait SecurityProvider {
    /// Label recorded as `securityProvider` in ledgers
    fn name(&self) -> &str;

    /// Findings for the given packages; packages without advisories are absent
    fn findings(&self, packages: &[String]) -> Result<SecurityFindings>;
}

/// In-memory findings
#[derive(Debug, Clone, Default)]
pub struct StaticFindings {
    name: String,
    findings: SecurityFindings,
}

impl StaticFindings {
    pub fn new(name: impl Into<String>, findings: SecurityFindings) -> Self {
        Self {
            name: name.into(),
            findings,
        }
    }
}

impl SecurityProvider for StaticFindings {
    fn name(&self) -> &str {
        &self.name
    }

    fn findings(&self, packages: &[String]) -> Result<SecurityFindings> {
        Ok(packages
            .iter()
            .filter_map(|p| self.findings.get(p).map(|f| (p.clone(), f.clone())))
            .collect())
    }
}

/// Reads a JSON advisory report produced by an external scanner.
///
/// Accepts either `{ "pkg": { finding } }` or `[{ "package": "pkg", ...finding }]`.
#[derive(Debug, Clone)]
pub struct ReportFileProvider {
    name: String,
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ReportRow {
    package: String,
    #[serde(flatten)]
    finding: SecurityFinding,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReportFile {
    Map(SecurityFindings),
    Rows(Vec<ReportRow>),
}

impl ReportFileProvider {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

impl SecurityProvider for ReportFileProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn findings(&self, packages: &[String]) -> Result<SecurityFindings> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read security report {}", self.path.display()))?;
        let report: ReportFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse security report {}", self.path.display()))?;

        let all: SecurityFindings = match report {
            ReportFile::Map(map) => map,
            ReportFile::Rows(rows) => rows.into_iter().map(|r| (r.package, r.finding)).collect(),
        };

        Ok(all
            .into_iter()
            .filter(|(package, _)| packages.contains(package))
            .collect())
    }
}

/// Ask `provider` about `packages`, minus the excluded ones.
///
/// A failing provider is reported and yields no findings; advisories only
/// enrich ledgers and never block a run.
pub fn collect_findings(
    provider: &dyn SecurityProvider,
    packages: &[String],
    exclude: &[String],
) -> SecurityReport {
    let wanted: Vec<String> = packages
        .iter()
        .filter(|p| !exclude.contains(p))
        .cloned()
        .collect();

    let findings = match provider.findings(&wanted) {
        Ok(findings) => findings,
        Err(e) => {
            log::warn!("Security provider '{}' failed: {:#}", provider.name(), e);
            SecurityFindings::new()
        }
    };

    log::debug!(
        "Security provider '{}' reported {} of {} packages",
        provider.name(),
        findings.len(),
        wanted.len()
    );

    SecurityReport {
        provider: Some(provider.name().to_string()),
        findings,
    }
}
