use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Suffix marking a dependent that reaches the package only transitively
pub const TRANSITIVE_MARKER: &str = "(transitive dependency)";

/// Suffix marking a dependent that pins a child of one of its direct dependencies
pub const NESTED_MARKER: &str = "(nested override)";

/// The persisted provenance ledger: `"{name}@{version}"` -> entry
pub type Appendix = BTreeMap<String, AppendixEntry>;

/// One pinned `name@version` and everything known about why it exists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendixEntry {
    /// Consumer package name -> descriptor of how it uses the pin
    #[serde(default, deserialize_with = "super::lenient::string_map")]
    pub dependents: BTreeMap<String, String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "super::lenient::or_default"
    )]
    pub ledger: Option<Ledger>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "super::lenient::or_default"
    )]
    pub patches: Option<Vec<String>>,
}

impl AppendixEntry {
    /// Record a dependent. A consumer that already has a different descriptor
    /// keeps the lexicographically smallest one so merge order never matters.
    pub fn add_dependent(&mut self, consumer: impl Into<String>, descriptor: impl Into<String>) {
        let descriptor = descriptor.into();
        self.dependents
            .entry(consumer.into())
            .and_modify(|existing| {
                if descriptor < *existing {
                    *existing = descriptor.clone();
                }
            })
            .or_insert(descriptor);
    }

    /// Union the dependents of `other` into this entry. The ledger is only
    /// taken from `other` when this entry has none yet.
    pub fn merge(&mut self, other: &AppendixEntry) {
        for (consumer, descriptor) in &other.dependents {
            self.add_dependent(consumer.clone(), descriptor.clone());
        }
        if self.ledger.is_none() {
            self.ledger = other.ledger.clone();
        }
    }

    /// True when at least one dependent uses the pin directly or through a
    /// nested override. Transitive markers alone prove nothing.
    pub fn has_conclusive_dependent(&self) -> bool {
        self.dependents
            .values()
            .any(|descriptor| !is_transitive_descriptor(descriptor))
    }

    /// Whether the entry carries metadata beyond its added date
    pub fn has_security_or_patches(&self) -> bool {
        let patched = self.patches.as_ref().is_some_and(|p| !p.is_empty());
        let secured = self.ledger.as_ref().is_some_and(Ledger::has_security_fields);
        patched || secured
    }
}

/// Provenance attached to one appendix entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    /// When the pin was first recorded (ISO-8601, UTC). Never changes once set.
    pub added_date: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_checked: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cve: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Ledger {
    pub fn new(added_date: impl Into<String>) -> Self {
        Self {
            added_date: added_date.into(),
            ..Default::default()
        }
    }

    pub fn has_security_fields(&self) -> bool {
        self.security_checked.is_some()
            || self.security_provider.is_some()
            || self.cve.is_some()
            || self.severity.is_some()
            || self.url.is_some()
    }
}

/// Build an appendix key from a package name and a pinned version
pub fn appendix_key(name: &str, version: &str) -> String {
    format!("{}@{}", name, version)
}

/// Split an appendix key into `(name, version)`.
///
/// Scoped names carry a leading `@`, so the split happens on the first `@`
/// after the first character. Versions may contain `@` themselves
/// (`npm:@scope/pkg@1.0.0` aliases).
pub fn split_key(key: &str) -> (&str, &str) {
    match key.get(1..).and_then(|rest| rest.find('@')).map(|idx| idx + 1) {
        Some(idx) => (&key[..idx], &key[idx + 1..]),
        None => (key, ""),
    }
}

/// Package name portion of an appendix key
pub fn key_name(key: &str) -> &str {
    split_key(key).0
}

/// Descriptor for a consumer that depends on `name` directly
pub fn direct_descriptor(name: &str, range: &str) -> String {
    format!("{}@{}", name, range)
}

/// Descriptor for a consumer that only reaches `name` through other packages
pub fn transitive_descriptor(name: &str) -> String {
    format!("{} {}", name, TRANSITIVE_MARKER)
}

/// Descriptor for a consumer pinning a child of its direct dependency `parent`
pub fn nested_descriptor(parent: &str, range: &str) -> String {
    format!("{}@{} {}", parent, range, NESTED_MARKER)
}

pub fn is_transitive_descriptor(descriptor: &str) -> bool {
    descriptor.ends_with(TRANSITIVE_MARKER)
}
