//! Tolerant field deserializers for hand-edited manifests.
//!
//! A malformed field is logged and replaced by its default so one bad value
//! never discards the rest of the manifest.

use super::appendix::{Appendix, AppendixEntry};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Any field: malformed values fall back to `T::default()`
pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_else(|e| {
        log::warn!("Ignoring malformed field: {}", e);
        T::default()
    }))
}

/// Dependency maps: entries whose range is not a string are dropped
pub fn string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Object(entries) = Value::deserialize(deserializer)? else {
        log::warn!("Ignoring dependency map that is not an object");
        return Ok(BTreeMap::new());
    };

    Ok(entries
        .into_iter()
        .filter_map(|(name, range)| match range {
            Value::String(range) => Some((name, range)),
            other => {
                log::warn!("Ignoring dependency '{}' with non-string range {}", name, other);
                None
            }
        })
        .collect())
}

/// Appendix: malformed entries are dropped one by one
pub fn appendix<'de, D>(deserializer: D) -> Result<Option<Appendix>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(appendix_from(Value::deserialize(deserializer)?))
}

/// `overridePaths`: each path's appendix is read like the main appendix
pub fn override_paths<'de, D>(deserializer: D) -> Result<Option<BTreeMap<String, Appendix>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Object(paths) => Ok(Some(
            paths
                .into_iter()
                .filter_map(|(path, value)| appendix_from(value).map(|appendix| (path, appendix)))
                .collect(),
        )),
        Value::Null => Ok(None),
        _ => {
            log::warn!("Ignoring overridePaths that is not an object");
            Ok(None)
        }
    }
}

fn appendix_from(value: Value) -> Option<Appendix> {
    let entries = match value {
        Value::Object(entries) => entries,
        Value::Null => return None,
        _ => {
            log::warn!("Ignoring appendix that is not an object");
            return None;
        }
    };

    let appendix = entries
        .into_iter()
        .filter_map(|(key, entry)| match serde_json::from_value::<AppendixEntry>(entry) {
            Ok(entry) => Some((key, entry)),
            Err(e) => {
                log::warn!("Ignoring malformed appendix entry '{}': {}", key, e);
                None
            }
        })
        .collect();
    Some(appendix)
}
