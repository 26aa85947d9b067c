//! Manifest reads and writes, cached per absolute path for one run

use crate::context::RunContext;
use crate::models::PackageJson;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};

/// Hard failures of a manifest write. Reads never fail hard.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Refusing to write non-JSON file: {0}")]
    NotJson(PathBuf),

    #[error("Refusing to write root manifest without a \"name\" field: {0}")]
    MissingName(PathBuf),

    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write '{0}': {1}")]
    Write(PathBuf, std::io::Error),
}

/// Absolute path with `.` and `..` removed lexically, used as the cache key
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Raw JSON of the manifest at `path`, or `None` when it is missing or invalid
pub fn load_raw(ctx: &mut RunContext, path: &Path) -> Option<Value> {
    let key = normalize_path(path);
    if let Some(cached) = ctx.cached_manifest(&key) {
        return Some(cached.clone());
    }

    let content = match std::fs::read_to_string(&key) {
        Ok(content) => content,
        Err(e) => {
            log::debug!("Cannot read {}: {}", key.display(), e);
            return None;
        }
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(value) if value.is_object() => {
            ctx.cache_manifest(key, value.clone());
            Some(value)
        }
        Ok(_) => {
            log::warn!("{} is not a JSON object, ignoring it", key.display());
            None
        }
        Err(e) => {
            log::warn!("Invalid JSON in {}: {}", key.display(), e);
            None
        }
    }
}

/// Typed manifest at `path`; missing, invalid or mistyped files yield `None`
pub fn load_manifest(ctx: &mut RunContext, path: &Path) -> Option<PackageJson> {
    let raw = load_raw(ctx, path)?;
    match PackageJson::from_value(&raw) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            log::warn!("Unexpected manifest shape in {}: {}", path.display(), e);
            None
        }
    }
}

/// Render manifest content the way package managers do: two-space indent and
/// a trailing newline.
pub fn render_manifest(content: &Value) -> Result<String, ManifestError> {
    let mut rendered = serde_json::to_string_pretty(content)?;
    rendered.push('\n');
    Ok(rendered)
}

/// Write `content` to `path` and invalidate its cache entry.
///
/// Returns `Ok(false)` when the file already parses to the same JSON, so
/// formatting alone never causes a rewrite.
pub fn write_manifest(
    ctx: &mut RunContext,
    path: &Path,
    content: &Value,
    is_root: bool,
) -> Result<bool, ManifestError> {
    let key = normalize_path(path);

    if key.extension().map_or(true, |ext| ext != "json") {
        return Err(ManifestError::NotJson(key));
    }

    if is_root {
        let named = content
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|name| !name.trim().is_empty());
        if !named {
            return Err(ManifestError::MissingName(key));
        }
    }

    let unchanged = std::fs::read_to_string(&key)
        .ok()
        .and_then(|existing| serde_json::from_str::<Value>(&existing).ok())
        .is_some_and(|existing| &existing == content);

    if unchanged {
        log::debug!("{} unchanged, skipping write", key.display());
        return Ok(false);
    }

    let rendered = render_manifest(content)?;
    std::fs::write(&key, rendered).map_err(|e| ManifestError::Write(key.clone(), e))?;
    ctx.invalidate_manifest(&key);
    log::info!("Wrote {}", key.display());

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_path_removes_dots() {
        let normalized = normalize_path(Path::new("/repo/packages/../apps/./web/package.json"));
        assert_eq!(normalized, PathBuf::from("/repo/apps/web/package.json"));
    }

    #[test]
    fn test_load_missing_and_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let mut ctx = RunContext::new();

        assert!(load_manifest(&mut ctx, &temp_dir.path().join("package.json")).is_none());

        let broken = temp_dir.path().join("broken.json");
        std::fs::write(&broken, "{ \"name\": ").unwrap();
        assert!(load_manifest(&mut ctx, &broken).is_none());
    }

    #[test]
    fn test_load_is_cached_until_write() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("package.json");
        std::fs::write(&path, r#"{ "name": "first" }"#).unwrap();

        let mut ctx = RunContext::new();
        assert_eq!(load_manifest(&mut ctx, &path).unwrap().name.unwrap(), "first");

        // Out-of-band edits are not seen while cached
        std::fs::write(&path, r#"{ "name": "second" }"#).unwrap();
        assert_eq!(load_manifest(&mut ctx, &path).unwrap().name.unwrap(), "first");

        write_manifest(&mut ctx, &path, &json!({ "name": "third" }), true).unwrap();
        assert_eq!(load_manifest(&mut ctx, &path).unwrap().name.unwrap(), "third");
    }

    #[test]
    fn test_write_refuses_non_json_target() {
        let temp_dir = TempDir::new().unwrap();
        let mut ctx = RunContext::new();

        let result = write_manifest(
            &mut ctx,
            &temp_dir.path().join("package.yaml"),
            &json!({ "name": "app" }),
            false,
        );
        assert!(matches!(result, Err(ManifestError::NotJson(_))));
    }

    #[test]
    fn test_write_refuses_nameless_root() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("package.json");
        let mut ctx = RunContext::new();

        let result = write_manifest(&mut ctx, &path, &json!({ "version": "1.0.0" }), true);
        assert!(matches!(result, Err(ManifestError::MissingName(_))));
        assert!(!path.exists());

        // Workspace manifests have no such requirement
        assert!(write_manifest(&mut ctx, &path, &json!({ "private": true }), false).unwrap());
    }

    #[test]
    fn test_write_preserves_key_order_and_skips_identical() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("package.json");
        let mut ctx = RunContext::new();

        let content: Value =
            serde_json::from_str(r#"{ "name": "app", "scripts": {}, "dependencies": {} }"#).unwrap();
        assert!(write_manifest(&mut ctx, &path, &content, true).unwrap());

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.find("\"scripts\"").unwrap() < written.find("\"dependencies\"").unwrap());
        assert!(written.ends_with("}\n"));

        assert!(!write_manifest(&mut ctx, &path, &content, true).unwrap());
    }

    #[test]
    fn test_write_skips_when_only_formatting_differs() {
        let temp_dir = TempDir::new().unwrap();
        let mut ctx = RunContext::new();
        let content = json!({ "name": "app", "overrides": { "lodash": "4.17.21" } });

        for (file, existing) in [
            ("tabs.json", "{\n\t\"name\": \"app\",\n\t\"overrides\": {\n\t\t\"lodash\": \"4.17.21\"\n\t}\n}"),
            ("wide.json", "{\n    \"name\": \"app\",\n    \"overrides\": {\n        \"lodash\": \"4.17.21\"\n    }\n}\n"),
        ] {
            let path = temp_dir.path().join(file);
            std::fs::write(&path, existing).unwrap();

            assert!(!write_manifest(&mut ctx, &path, &content, true).unwrap());
            assert_eq!(std::fs::read_to_string(&path).unwrap(), existing);
        }
    }
}
