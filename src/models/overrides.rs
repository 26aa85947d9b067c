use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// A single declared override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OverrideValue {
    /// `name -> version`, pinned everywhere in the tree
    Simple(String),
    /// `parent -> {child -> version}`, pinned only below `parent`
    Nested(BTreeMap<String, String>),
}

impl OverrideValue {
    pub fn is_nested(&self) -> bool {
        matches!(self, OverrideValue::Nested(_))
    }

    pub fn to_json(&self) -> Value {
        match self {
            OverrideValue::Simple(version) => Value::String(version.clone()),
            OverrideValue::Nested(children) => Value::Object(
                children
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
        }
    }
}

/// Canonical override map, independent of the dialect it came from
pub type OverridesMap = BTreeMap<String, OverrideValue>;

/// The three manifest conventions for declaring overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Top-level `overrides` (npm, bun)
    Npm,
    /// Top-level `resolutions` (yarn)
    Yarn,
    /// `pnpm.overrides`
    Pnpm,
}

impl Dialect {
    /// Detection priority when a manifest already carries a block
    pub const PRIORITY: [Dialect; 3] = [Dialect::Yarn, Dialect::Npm, Dialect::Pnpm];

    /// Manifest field path, for messages
    pub fn field(&self) -> &'static str {
        match self {
            Dialect::Npm => "overrides",
            Dialect::Yarn => "resolutions",
            Dialect::Pnpm => "pnpm.overrides",
        }
    }

    /// Borrow this dialect's block from a raw manifest
    pub fn block<'a>(&self, manifest: &'a Value) -> Option<&'a Map<String, Value>> {
        match self {
            Dialect::Npm => manifest.get("overrides")?.as_object(),
            Dialect::Yarn => manifest.get("resolutions")?.as_object(),
            Dialect::Pnpm => manifest.get("pnpm")?.get("overrides")?.as_object(),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field())
    }
}

/// Overrides tagged with the dialect that declared them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideConfig {
    pub dialect: Dialect,
    pub overrides: OverridesMap,
    /// Declared names whose value has no canonical form (deeper nesting,
    /// non-string values). Never judged, always written back untouched.
    pub opaque: BTreeSet<String>,
}

impl OverrideConfig {
    pub fn empty(dialect: Dialect) -> Self {
        Self {
            dialect,
            overrides: OverridesMap::new(),
            opaque: BTreeSet::new(),
        }
    }

    /// Whether the declaration for `name` stays in the dialect block
    pub fn retains(&self, name: &str) -> bool {
        self.overrides.contains_key(name) || self.opaque.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_override_value_untagged() {
        let simple: OverrideValue = serde_json::from_value(json!("4.17.21")).unwrap();
        assert_eq!(simple, OverrideValue::Simple("4.17.21".to_string()));
        assert!(!simple.is_nested());

        let nested: OverrideValue =
            serde_json::from_value(json!({"react-dom": "18.0.0"})).unwrap();
        assert!(nested.is_nested());
        assert_eq!(nested.to_json(), json!({"react-dom": "18.0.0"}));
    }

    #[test]
    fn test_dialect_block_lookup() {
        let manifest = json!({
            "name": "app",
            "pnpm": { "overrides": { "foo": "1.0.0" } },
            "resolutions": { "bar": "2.0.0" }
        });

        assert!(Dialect::Npm.block(&manifest).is_none());
        assert_eq!(Dialect::Yarn.block(&manifest).unwrap().len(), 1);
        assert_eq!(Dialect::Pnpm.block(&manifest).unwrap()["foo"], "1.0.0");
        assert_eq!(Dialect::Pnpm.to_string(), "pnpm.overrides");
    }
}
