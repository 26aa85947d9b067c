//! Nested overrides: pins that only apply below one direct dependency

use crate::models::OverrideValue;
use std::collections::BTreeMap;

/// A nested override whose parent the manifest actually depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicableNested<'a> {
    pub parent: &'a str,
    /// The manifest's declared range for `parent`
    pub parent_range: &'a str,
    pub children: &'a BTreeMap<String, String>,
}

/// Gate one nested override against a manifest's merged dependencies
pub fn applicable<'a>(
    parent: &'a str,
    value: &'a OverrideValue,
    deps: &'a BTreeMap<String, String>,
) -> Option<ApplicableNested<'a>> {
    let OverrideValue::Nested(children) = value else {
        return None;
    };
    let parent_range = deps.get(parent)?;
    Some(ApplicableNested {
        parent,
        parent_range,
        children,
    })
}
