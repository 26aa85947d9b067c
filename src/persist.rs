//! Write the reconciled overrides and appendix back into the root manifest.
//!
//! Only two places are touched: the active dialect block and
//! `pastoralist.appendix`. Everything else in the manifest, including the rest
//! of the `pastoralist` object, is left as it was.

use crate::context::RunContext;
use crate::manifest::{write_manifest, ManifestError};
use crate::models::{Appendix, Dialect, OverrideConfig};
use serde_json::{json, Map, Value};
use std::path::Path;

/// Serialized `pastoralist` blocks longer than this suggest an external file
pub const EXTERNALIZE_THRESHOLD: usize = 50;

#[derive(Debug, Clone, Copy)]
pub struct PersistOptions {
    pub dry_run: bool,
    pub compact: bool,
    pub externalize_threshold: usize,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            compact: false,
            externalize_threshold: EXTERNALIZE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PersistOutcome {
    /// The manifest as written (or as it would be written in dry-run)
    pub content: Value,
    pub written: bool,
    /// Lines of the serialized `pastoralist` object
    pub config_lines: usize,
    pub suggest_externalize: bool,
}

/// Apply the surviving overrides and appendix to a copy of the raw manifest
pub fn apply_state(raw: &Value, config: &OverrideConfig, appendix: &Appendix, compact: bool) -> Value {
    let mut manifest = raw.as_object().cloned().unwrap_or_default();

    write_dialect_block(&mut manifest, config);
    write_appendix(&mut manifest, appendix, compact);

    Value::Object(manifest)
}

/// Persist the run's result into the root manifest
pub fn persist(
    ctx: &mut RunContext,
    path: &Path,
    raw: &Value,
    config: &OverrideConfig,
    appendix: &Appendix,
    options: PersistOptions,
) -> Result<PersistOutcome, ManifestError> {
    let content = apply_state(raw, config, appendix, options.compact);

    let config_lines = content
        .get("pastoralist")
        .map(|block| serde_json::to_string_pretty(block).map(|s| s.lines().count()))
        .transpose()?
        .unwrap_or(0);
    let suggest_externalize = config_lines > options.externalize_threshold;
    if suggest_externalize {
        log::info!(
            "pastoralist config is {} lines; consider moving it to .pastoralistrc.json",
            config_lines
        );
    }

    let written = if options.dry_run {
        log::info!("Dry run: not writing {}", path.display());
        false
    } else {
        write_manifest(ctx, path, &content, true)?
    };

    Ok(PersistOutcome {
        content,
        written,
        config_lines,
        suggest_externalize,
    })
}

/// Keep the existing block's order and raw values for surviving and opaque
/// names; drop the block entirely once nothing survives.
fn write_dialect_block(manifest: &mut Map<String, Value>, config: &OverrideConfig) {
    let dialect = config.dialect;
    let overrides = &config.overrides;
    let existing = dialect.block(&Value::Object(manifest.clone())).cloned();

    let block: Map<String, Value> = match existing {
        Some(mut block) => {
            block.retain(|name, _| config.retains(name));
            for (name, value) in overrides {
                if !block.contains_key(name) {
                    block.insert(name.clone(), value.to_json());
                }
            }
            block
        }
        None => overrides
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect(),
    };

    match dialect {
        Dialect::Npm => set_or_remove(manifest, "overrides", block),
        Dialect::Yarn => set_or_remove(manifest, "resolutions", block),
        Dialect::Pnpm => {
            let mut pnpm = manifest
                .get("pnpm")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            set_or_remove(&mut pnpm, "overrides", block);
            set_or_remove(manifest, "pnpm", pnpm);
        }
    }
}

fn set_or_remove(target: &mut Map<String, Value>, key: &str, value: Map<String, Value>) {
    if value.is_empty() {
        target.remove(key);
    } else {
        target.insert(key.to_string(), Value::Object(value));
    }
}

fn write_appendix(manifest: &mut Map<String, Value>, appendix: &Appendix, compact: bool) {
    let mut config = manifest
        .get("pastoralist")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if appendix.is_empty() {
        config.remove("appendix");
    } else {
        config.insert("appendix".to_string(), serialize_appendix(appendix, compact));
    }

    set_or_remove(manifest, "pastoralist", config);
}

/// Serialize the appendix; in compact mode entries without security or patch
/// metadata keep only their added date.
pub fn serialize_appendix(appendix: &Appendix, compact: bool) -> Value {
    let entries = appendix
        .iter()
        .map(|(key, entry)| {
            let value = match &entry.ledger {
                Some(ledger) if compact && !entry.has_security_or_patches() => {
                    json!({ "ledger": { "addedDate": ledger.added_date } })
                }
                _ => serde_json::to_value(entry).unwrap_or(Value::Null),
            };
            (key.clone(), value)
        })
        .collect();

    Value::Object(entries)
}
