//! Reduce whichever override dialect a manifest uses to one canonical map

use crate::models::{Dialect, OverrideConfig, OverrideValue, PackageJson};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Soft normalization failures; the manifest contributes zero overrides
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("ambiguous override configuration: {} are all populated", join_dialects(.0))]
    Ambiguous(Vec<Dialect>),
}

fn join_dialects(dialects: &[Dialect]) -> String {
    dialects
        .iter()
        .map(Dialect::field)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Raw block of each dialect, in detection priority order
fn raw_blocks(manifest: &PackageJson) -> [(Dialect, Option<&Map<String, Value>>); 3] {
    [
        (Dialect::Yarn, manifest.resolutions.as_ref()),
        (Dialect::Npm, manifest.overrides.as_ref()),
        (
            Dialect::Pnpm,
            manifest.pnpm.as_ref().and_then(|p| p.overrides.as_ref()),
        ),
    ]
}

/// Extract the manifest's overrides.
///
/// `Ok(None)` means no dialect is populated. More than one populated dialect
/// is rejected rather than merged.
pub fn normalize(manifest: &PackageJson) -> Result<Option<OverrideConfig>, NormalizeError> {
    let populated: Vec<(Dialect, &Map<String, Value>)> = raw_blocks(manifest)
        .into_iter()
        .filter_map(|(dialect, block)| block.filter(|b| !b.is_empty()).map(|b| (dialect, b)))
        .collect();

    match populated.as_slice() {
        [] => Ok(None),
        [(dialect, block)] => Ok(Some(convert_block(*dialect, block))),
        many => Err(NormalizeError::Ambiguous(
            many.iter().map(|(dialect, _)| *dialect).collect(),
        )),
    }
}

/// Convert a raw dialect block into canonical values. Names that cannot be
/// represented are kept aside as opaque.
pub fn convert_block(dialect: Dialect, block: &Map<String, Value>) -> OverrideConfig {
    let mut config = OverrideConfig::empty(dialect);
    let overrides = &mut config.overrides;

    for (name, value) in block {
        match value {
            Value::String(version) => {
                overrides.insert(name.clone(), OverrideValue::Simple(version.clone()));
            }
            Value::Object(children) => {
                let mut nested = BTreeMap::new();
                for (child, child_version) in children {
                    match child_version.as_str() {
                        Some(version) => {
                            nested.insert(child.clone(), version.to_string());
                        }
                        None => log::warn!(
                            "Skipping override {} > {}: version must be a string",
                            name,
                            child
                        ),
                    }
                }
                // npm spells the parent's own version as "."
                let own_version = nested.remove(".");
                match (own_version, nested.is_empty()) {
                    (Some(version), true) => {
                        overrides.insert(name.clone(), OverrideValue::Simple(version));
                    }
                    (_, false) => {
                        overrides.insert(name.clone(), OverrideValue::Nested(nested));
                    }
                    (None, true) => {
                        log::warn!(
                            "Override {} has no plain versions; leaving it as declared",
                            name
                        );
                        config.opaque.insert(name.clone());
                    }
                }
            }
            other => {
                log::warn!(
                    "Override {} has unsupported value {}; leaving it as declared",
                    name,
                    other
                );
                config.opaque.insert(name.clone());
            }
        }
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(value: Value) -> PackageJson {
        PackageJson::from_value(&value).unwrap()
    }

    #[test]
    fn test_single_dialect_each_kind() {
        let npm = normalize(&manifest(json!({ "overrides": { "lodash": "4.17.21" } })))
            .unwrap()
            .unwrap();
        assert_eq!(npm.dialect, Dialect::Npm);
        assert_eq!(
            npm.overrides["lodash"],
            OverrideValue::Simple("4.17.21".to_string())
        );

        let yarn = normalize(&manifest(json!({ "resolutions": { "a": "1.0.0" } })))
            .unwrap()
            .unwrap();
        assert_eq!(yarn.dialect, Dialect::Yarn);

        let pnpm = normalize(&manifest(json!({ "pnpm": { "overrides": { "a": "1.0.0" } } })))
            .unwrap()
            .unwrap();
        assert_eq!(pnpm.dialect, Dialect::Pnpm);
    }

    #[test]
    fn test_no_overrides() {
        assert_eq!(normalize(&manifest(json!({ "name": "app" }))).unwrap(), None);
        // An empty block next to a populated one is not ambiguous
        let config = normalize(&manifest(json!({
            "overrides": {},
            "resolutions": { "a": "1.0.0" }
        })))
        .unwrap()
        .unwrap();
        assert_eq!(config.dialect, Dialect::Yarn);
    }

    #[test]
    fn test_ambiguous_configuration_is_rejected() {
        let pkg = manifest(json!({
            "overrides": { "a": "1.0.0" },
            "pnpm": { "overrides": { "b": "2.0.0" } }
        }));

        let err = normalize(&pkg).unwrap_err();
        assert_eq!(err, NormalizeError::Ambiguous(vec![Dialect::Npm, Dialect::Pnpm]));
        assert!(err.to_string().contains("ambiguous override configuration"));
    }

    #[test]
    fn test_convert_block_nested_and_invalid_values() {
        let block = json!({
            "react": { "react-dom": "18.0.0", "scheduler": 3 },
            "broken": 42,
            "empty": {},
            "lodash": "4.17.21",
            "semver": { ".": "7.5.4" }
        });

        let config = convert_block(Dialect::Npm, block.as_object().unwrap());
        let overrides = &config.overrides;
        assert_eq!(overrides.len(), 3);
        assert_eq!(
            config.opaque.iter().collect::<Vec<_>>(),
            vec!["broken", "empty"]
        );
        assert_eq!(
            overrides["semver"],
            OverrideValue::Simple("7.5.4".to_string())
        );
        assert_eq!(
            overrides["react"],
            OverrideValue::Nested(BTreeMap::from([(
                "react-dom".to_string(),
                "18.0.0".to_string()
            )]))
        );
    }
}
