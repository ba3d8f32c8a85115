//! Loading command arguments that carry JSON, and default file locations.
//!
//! Every JSON-valued flag accepts either an inline document (anything that
//! starts with `{` or `[`) or a path to a file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use melodist_orchestrator::ComposerConfig;

/// Directory name under the platform config and data directories.
pub const APP_DIR: &str = "melodist";

/// Returns the JSON text for an argument, reading it from disk when the
/// argument is not an inline document.
pub fn json_text(arg: &str) -> Result<String> {
    let trimmed = arg.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(arg.to_string());
    }
    std::fs::read_to_string(arg).with_context(|| format!("Failed to read {}", arg))
}

/// Parses a JSON argument into a value.
pub fn json_value(arg: &str) -> Result<serde_json::Value> {
    let text = json_text(arg)?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", describe(arg)))
}

/// Parses a JSON argument that must be an array.
pub fn json_array(arg: &str) -> Result<Vec<serde_json::Value>> {
    match json_value(arg)? {
        serde_json::Value::Array(items) => Ok(items),
        other => anyhow::bail!("expected a JSON array in {}, got {}", describe(arg), other),
    }
}

fn describe(arg: &str) -> &str {
    if arg.trim_start().starts_with(['{', '[']) {
        "inline argument"
    } else {
        arg
    }
}

/// `<config dir>/melodist/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.json"))
}

/// `<data dir>/melodist/feedback.json`
pub fn default_feedback_log() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_DIR).join("feedback.json"))
}

/// Loads the composer config from `path`, or from the default location if
/// a file exists there, or falls back to defaults.
pub fn load_config(path: Option<&str>) -> Result<ComposerConfig> {
    let path = match path {
        Some(p) => PathBuf::from(p),
        None => match default_config_path().filter(|p| p.is_file()) {
            Some(p) => p,
            None => return Ok(ComposerConfig::default()),
        },
    };
    load_config_file(&path)
}

fn load_config_file(path: &Path) -> Result<ComposerConfig> {
    log::info!("loading config from {}", path.display());
    ComposerConfig::from_path(path)
        .with_context(|| format!("Failed to load config: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_and_file_arguments() {
        assert_eq!(json_value(r#"{"a": 1}"#).unwrap()["a"], 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");
        std::fs::write(&path, r#"[{"note": "C4"}]"#).unwrap();
        let items = json_array(path.to_str().unwrap()).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_array_required() {
        let err = json_array(r#"{"note": "C4"}"#).unwrap_err();
        assert!(err.to_string().contains("expected a JSON array"));
    }

    #[test]
    fn test_missing_file() {
        let err = json_value("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_explicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"cache": {"ttl_secs": 5}}"#).unwrap();
        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.cache.ttl_secs, 5);
        assert_eq!(config.admission.max_concurrent, 2);
    }
}
