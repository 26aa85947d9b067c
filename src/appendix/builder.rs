//! Appendix reconciliation.
//!
//! Each manifest is folded into one accumulator. Dependents are unioned as
//! ordered maps and ledgers are write-once, so the final appendix does not
//! depend on the order manifests arrive in, and an unchanged project
//! reproduces the same appendix on every run.

use crate::context::RunContext;
use crate::models::appendix::{
    appendix_key, direct_descriptor, nested_descriptor, transitive_descriptor,
};
use crate::models::{Appendix, AppendixEntry, Ledger, OverrideValue, OverridesMap};
use crate::overrides::nested;
use crate::security::SecurityReport;
use std::collections::BTreeMap;

/// Where new ledgers get their reason and security fields
#[derive(Debug, Clone, Default)]
pub struct LedgerSources {
    /// Reasons given for this run (CLI, prompt answers), by package name
    pub explicit_reasons: BTreeMap<String, String>,
    /// `pastoralist.overrideReasons`, by package name
    pub configured_reasons: BTreeMap<String, String>,
    pub security: SecurityReport,
}

impl LedgerSources {
    /// Reason for a new ledger: explicit, then security, then configured
    fn reason(&self, package: &str) -> Option<String> {
        self.explicit_reasons
            .get(package)
            .cloned()
            .or_else(|| self.security.get(package).and_then(|f| f.reason.clone()))
            .or_else(|| self.configured_reasons.get(package).cloned())
    }

    fn build_ledger(&self, package: &str, added_date: String) -> Ledger {
        let mut ledger = Ledger::new(added_date);
        ledger.reason = self.reason(package);

        if let Some(finding) = self.security.get(package) {
            ledger.security_checked = Some(true);
            ledger.security_provider = self.security.provider.clone();
            ledger.cve = finding.cve.clone();
            ledger.severity = finding.severity.clone();
            ledger.url = finding.url.clone();
        }

        ledger
    }
}

/// One manifest's contribution
#[derive(Debug, Clone, Copy)]
pub struct ManifestInput<'a> {
    /// Dependent name recorded in the appendix
    pub consumer: &'a str,
    /// Merged dependencies of the manifest
    pub deps: &'a BTreeMap<String, String>,
    pub overrides: &'a OverridesMap,
    /// Skip simple overrides the manifest does not depend on directly
    pub only_used_overrides: bool,
}

/// Accumulates the appendix across manifests
#[derive(Debug)]
pub struct AppendixBuilder<'a> {
    sources: &'a LedgerSources,
    previous: &'a Appendix,
    appendix: Appendix,
}

impl<'a> AppendixBuilder<'a> {
    /// `previous` is the appendix persisted by the last run; its ledgers are
    /// carried forward by key.
    pub fn new(sources: &'a LedgerSources, previous: &'a Appendix) -> Self {
        Self {
            sources,
            previous,
            appendix: Appendix::new(),
        }
    }

    /// Fold one manifest into the appendix. Returns the number of dependents
    /// recorded.
    pub fn add_manifest(&mut self, ctx: &mut RunContext, input: ManifestInput<'_>) -> usize {
        let mut recorded = 0;

        for (name, value) in input.overrides {
            match value {
                OverrideValue::Nested(_) => {
                    let Some(applicable) = nested::applicable(name, value, input.deps) else {
                        log::debug!(
                            "{}: skipping nested override {} (not a dependency)",
                            input.consumer,
                            name
                        );
                        continue;
                    };

                    let descriptor = nested_descriptor(applicable.parent, applicable.parent_range);
                    for (child, child_version) in applicable.children {
                        let key = appendix_key(child, child_version);
                        self.record(ctx, &key, child, input.consumer, &descriptor);
                        recorded += 1;
                    }
                }
                OverrideValue::Simple(version) => {
                    let range = input.deps.get(name);
                    if input.only_used_overrides && range.is_none() {
                        continue;
                    }

                    let descriptor = match range {
                        Some(range) => direct_descriptor(name, range),
                        None => transitive_descriptor(name),
                    };
                    let key = appendix_key(name, version);
                    self.record(ctx, &key, name, input.consumer, &descriptor);
                    recorded += 1;
                }
            }
        }

        log::debug!("{}: recorded {} dependent(s)", input.consumer, recorded);
        recorded
    }

    /// Union a pre-computed entry into the appendix
    pub fn merge_entry(&mut self, key: &str, entry: &AppendixEntry) {
        let target = self.appendix.entry(key.to_string()).or_default();
        let had_ledger = target.ledger.is_some();
        target.merge(entry);

        // A ledger persisted by a previous run still wins over the merged one
        if !had_ledger {
            if let Some(previous) = self.previous.get(key).and_then(|e| e.ledger.clone()) {
                target.ledger = Some(previous);
            }
        }
    }

    pub fn appendix(&self) -> &Appendix {
        &self.appendix
    }

    /// Finish the fold, pruning entries nobody depends on
    pub fn finish(self) -> Appendix {
        let mut appendix = self.appendix;
        let before = appendix.len();
        appendix.retain(|_, entry| !entry.dependents.is_empty());

        let pruned = before - appendix.len();
        if pruned > 0 {
            log::debug!("Pruned {} appendix entr(ies) without dependents", pruned);
        }
        appendix
    }

    fn record(
        &mut self,
        ctx: &mut RunContext,
        key: &str,
        package: &str,
        consumer: &str,
        descriptor: &str,
    ) {
        let needs_ledger = self
            .appendix
            .get(key)
            .map_or(true, |entry| entry.ledger.is_none());
        let ledger = needs_ledger.then(|| self.resolve_ledger(ctx, key, package));

        let entry = self.appendix.entry(key.to_string()).or_default();
        entry.add_dependent(consumer, descriptor);
        if let Some(ledger) = ledger {
            entry.ledger = Some(ledger);
        }
    }

    /// Existing ledgers are returned untouched; new ones are built once per
    /// key and memoized for the rest of the run.
    fn resolve_ledger(&self, ctx: &mut RunContext, key: &str, package: &str) -> Ledger {
        if let Some(memo) = ctx.memoized_ledger(key) {
            return memo.clone();
        }

        let ledger = match self.previous.get(key).and_then(|e| e.ledger.clone()) {
            Some(previous) => previous,
            None => {
                log::debug!("New ledger for {}", key);
                self.sources.build_ledger(package, ctx.added_date())
            }
        };

        ctx.memoize_ledger(key, ledger.clone());
        ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{SecurityFinding, SecurityFindings};
    use chrono::{TimeZone, Utc};

    fn ctx() -> RunContext {
        RunContext::at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    fn deps(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn simple(pairs: &[(&str, &str)]) -> OverridesMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), OverrideValue::Simple(v.to_string())))
            .collect()
    }

    fn react_nested() -> OverridesMap {
        OverridesMap::from([(
            "react".to_string(),
            OverrideValue::Nested(BTreeMap::from([(
                "react-dom".to_string(),
                "18.0.0".to_string(),
            )])),
        )])
    }

    #[test]
    fn test_shared_pin_has_one_entry_with_both_consumers() {
        let mut ctx = ctx();
        let sources = LedgerSources::default();
        let previous = Appendix::new();
        let overrides = simple(&[("lodash", "4.17.21")]);
        let p1 = deps(&[("lodash", "^4.17.0")]);
        let p2 = deps(&[("lodash", "^4.0.0")]);

        let mut builder = AppendixBuilder::new(&sources, &previous);
        for (consumer, deps) in [("p1", &p1), ("p2", &p2)] {
            builder.add_manifest(
                &mut ctx,
                ManifestInput {
                    consumer,
                    deps,
                    overrides: &overrides,
                    only_used_overrides: false,
                },
            );
        }
        let appendix = builder.finish();

        assert_eq!(appendix.len(), 1);
        let entry = &appendix["lodash@4.17.21"];
        assert_eq!(entry.dependents["p1"], "lodash@^4.17.0");
        assert_eq!(entry.dependents["p2"], "lodash@^4.0.0");
    }

    #[test]
    fn test_transitive_and_only_used() {
        let mut ctx = ctx();
        let sources = LedgerSources::default();
        let previous = Appendix::new();
        let overrides = simple(&[("minimist", "1.2.8")]);
        let empty = BTreeMap::new();

        let mut builder = AppendixBuilder::new(&sources, &previous);
        builder.add_manifest(
            &mut ctx,
            ManifestInput {
                consumer: "workspace-a",
                deps: &empty,
                overrides: &overrides,
                only_used_overrides: true,
            },
        );
        assert!(builder.appendix().is_empty());

        builder.add_manifest(
            &mut ctx,
            ManifestInput {
                consumer: "root",
                deps: &empty,
                overrides: &overrides,
                only_used_overrides: false,
            },
        );
        let appendix = builder.finish();
        assert_eq!(
            appendix["minimist@1.2.8"].dependents["root"],
            "minimist (transitive dependency)"
        );
    }

    #[test]
    fn test_nested_override_gating() {
        let mut ctx = ctx();
        let sources = LedgerSources::default();
        let previous = Appendix::new();
        let overrides = react_nested();

        let without_react = deps(&[("vue", "^3.0.0")]);
        let mut builder = AppendixBuilder::new(&sources, &previous);
        builder.add_manifest(
            &mut ctx,
            ManifestInput {
                consumer: "app",
                deps: &without_react,
                overrides: &overrides,
                only_used_overrides: false,
            },
        );
        assert!(builder.finish().is_empty());

        let with_react = deps(&[("react", "^18.2.0")]);
        let mut builder = AppendixBuilder::new(&sources, &previous);
        builder.add_manifest(
            &mut ctx,
            ManifestInput {
                consumer: "app",
                deps: &with_react,
                overrides: &overrides,
                only_used_overrides: false,
            },
        );
        let appendix = builder.finish();
        assert_eq!(
            appendix["react-dom@18.0.0"].dependents["app"],
            "react@^18.2.0 (nested override)"
        );
    }

    #[test]
    fn test_ledger_reason_priority() {
        let mut ctx = ctx();
        let previous = Appendix::new();
        let overrides = simple(&[("a", "1.0.0"), ("b", "1.0.0"), ("c", "1.0.0"), ("d", "1.0.0")]);
        let sources = LedgerSources {
            explicit_reasons: BTreeMap::from([("a".to_string(), "explicit".to_string())]),
            configured_reasons: BTreeMap::from([
                ("a".to_string(), "configured".to_string()),
                ("b".to_string(), "configured".to_string()),
                ("c".to_string(), "configured".to_string()),
            ]),
            security: SecurityReport {
                provider: Some("osv".to_string()),
                findings: SecurityFindings::from([(
                    "b".to_string(),
                    SecurityFinding {
                        reason: Some("advisory".to_string()),
                        cve: Some("CVE-2024-0001".to_string()),
                        severity: Some("high".to_string()),
                        url: None,
                    },
                )]),
            },
        };
        let empty = BTreeMap::new();

        let mut builder = AppendixBuilder::new(&sources, &previous);
        builder.add_manifest(
            &mut ctx,
            ManifestInput {
                consumer: "root",
                deps: &empty,
                overrides: &overrides,
                only_used_overrides: false,
            },
        );
        let appendix = builder.finish();

        let ledger = |key: &str| appendix[key].ledger.clone().unwrap();
        assert_eq!(ledger("a@1.0.0").reason.as_deref(), Some("explicit"));
        assert_eq!(ledger("b@1.0.0").reason.as_deref(), Some("advisory"));
        assert_eq!(ledger("b@1.0.0").security_checked, Some(true));
        assert_eq!(ledger("b@1.0.0").security_provider.as_deref(), Some("osv"));
        assert_eq!(ledger("b@1.0.0").cve.as_deref(), Some("CVE-2024-0001"));
        assert_eq!(ledger("c@1.0.0").reason.as_deref(), Some("configured"));
        assert_eq!(ledger("d@1.0.0").reason, None);
        assert_eq!(ledger("d@1.0.0").added_date, "2024-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_previous_ledger_is_preserved() {
        let mut ctx = ctx();
        let sources = LedgerSources {
            explicit_reasons: BTreeMap::from([("lodash".to_string(), "new reason".to_string())]),
            ..Default::default()
        };
        let previous = Appendix::from([(
            "lodash@4.17.21".to_string(),
            AppendixEntry {
                dependents: BTreeMap::from([("p1".to_string(), "lodash@^4".to_string())]),
                ledger: Some(Ledger {
                    added_date: "2020-05-05T00:00:00.000Z".to_string(),
                    reason: Some("original reason".to_string()),
                    ..Default::default()
                }),
                patches: None,
            },
        )]);
        let overrides = simple(&[("lodash", "4.17.21")]);
        let p2 = deps(&[("lodash", "^4.17.0")]);

        let mut builder = AppendixBuilder::new(&sources, &previous);
        builder.add_manifest(
            &mut ctx,
            ManifestInput {
                consumer: "p2",
                deps: &p2,
                overrides: &overrides,
                only_used_overrides: false,
            },
        );
        let appendix = builder.finish();

        let ledger = appendix["lodash@4.17.21"].ledger.clone().unwrap();
        assert_eq!(ledger.added_date, "2020-05-05T00:00:00.000Z");
        assert_eq!(ledger.reason.as_deref(), Some("original reason"));
    }

    #[test]
    fn test_order_does_not_change_result() {
        let sources = LedgerSources::default();
        let previous = Appendix::new();
        let mut overrides = simple(&[("lodash", "4.17.21"), ("minimist", "1.2.8")]);
        overrides.extend(react_nested());
        let manifests = [
            ("web", deps(&[("lodash", "^4"), ("react", "^18.2.0")])),
            ("api", deps(&[("lodash", "~4.17.0")])),
            ("cli", deps(&[("minimist", "^1.2.0")])),
        ];

        let run = |order: &[usize]| {
            let mut ctx = ctx();
            let mut builder = AppendixBuilder::new(&sources, &previous);
            for &i in order {
                let (consumer, deps) = &manifests[i];
                builder.add_manifest(
                    &mut ctx,
                    ManifestInput {
                        consumer,
                        deps,
                        overrides: &overrides,
                        only_used_overrides: true,
                    },
                );
            }
            builder.finish()
        };

        let forward = run(&[0, 1, 2]);
        assert_eq!(forward, run(&[2, 1, 0]));
        assert_eq!(forward, run(&[1, 2, 0]));
        assert_eq!(forward.len(), 3);
    }

    #[test]
    fn test_merge_entry_unions_dependents() {
        let mut ctx = ctx();
        let sources = LedgerSources::default();
        let previous = Appendix::new();
        let overrides = simple(&[("lodash", "4.17.21")]);
        let p1 = deps(&[("lodash", "^4")]);

        let mut builder = AppendixBuilder::new(&sources, &previous);
        builder.add_manifest(
            &mut ctx,
            ManifestInput {
                consumer: "p1",
                deps: &p1,
                overrides: &overrides,
                only_used_overrides: false,
            },
        );
        builder.merge_entry(
            "lodash@4.17.21",
            &AppendixEntry {
                dependents: BTreeMap::from([("legacy".to_string(), "lodash@^3".to_string())]),
                ledger: Some(Ledger::new("1999-01-01T00:00:00.000Z")),
                patches: None,
            },
        );
        let appendix = builder.finish();

        let entry = &appendix["lodash@4.17.21"];
        assert_eq!(entry.dependents.len(), 2);
        assert_eq!(
            entry.ledger.as_ref().unwrap().added_date,
            "2024-01-01T00:00:00.000Z"
        );
    }
}
