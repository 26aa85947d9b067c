use super::{lenient, PastoralistConfig};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Typed read-only view of a package manifest.
///
/// Writes never go through this struct: the persistence writer edits the raw
/// JSON so fields it does not own keep their content and order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "lenient::or_default")]
    pub version: Option<String>,

    #[serde(default, deserialize_with = "lenient::string_map")]
    pub dependencies: BTreeMap<String, String>,

    #[serde(default, deserialize_with = "lenient::string_map")]
    pub dev_dependencies: BTreeMap<String, String>,

    #[serde(default, deserialize_with = "lenient::string_map")]
    pub peer_dependencies: BTreeMap<String, String>,

    #[serde(default, deserialize_with = "lenient::or_default")]
    pub overrides: Option<Map<String, Value>>,

    #[serde(default, deserialize_with = "lenient::or_default")]
    pub resolutions: Option<Map<String, Value>>,

    #[serde(default, deserialize_with = "lenient::or_default")]
    pub pnpm: Option<PnpmSection>,

    #[serde(default, deserialize_with = "lenient::or_default")]
    pub workspaces: Option<Workspaces>,

    #[serde(default, deserialize_with = "lenient::or_default")]
    pub pastoralist: Option<PastoralistConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PnpmSection {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub overrides: Option<Map<String, Value>>,
}

/// The `workspaces` field: either a list or yarn's `{ packages: [...] }`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Workspaces {
    List(Vec<String>),
    Object {
        #[serde(default)]
        packages: Vec<String>,
    },
}

impl Workspaces {
    pub fn patterns(&self) -> &[String] {
        match self {
            Workspaces::List(list) => list,
            Workspaces::Object { packages } => packages,
        }
    }
}

impl PackageJson {
    pub fn from_value(value: &Value) -> serde_json::Result<Self> {
        PackageJson::deserialize(value)
    }

    /// Dependencies, devDependencies and peerDependencies folded into one
    /// map; later sets win on conflicting ranges.
    pub fn merged_dependencies(&self) -> BTreeMap<String, String> {
        let mut merged = self.dependencies.clone();
        merged.extend(self.dev_dependencies.clone());
        merged.extend(self.peer_dependencies.clone());
        merged
    }

    /// Name used as the dependent key in the appendix
    pub fn consumer_name(&self, fallback: &str) -> String {
        self.name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }

    pub fn config(&self) -> PastoralistConfig {
        self.pastoralist.clone().unwrap_or_default()
    }
}
