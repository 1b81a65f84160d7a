//! Reading schema, value and configuration files.

use std::path::Path;

use schemaform_core::TreeConfig;
use serde_json::Value;

pub(crate) fn read_json(path: &Path) -> Result<Value, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading file '{}': {}", path.display(), e))?;
    serde_json::from_str(&text)
        .map_err(|e| format!("error parsing JSON in '{}': {}", path.display(), e))
}

pub(crate) fn read_config(path: &Path) -> Result<TreeConfig, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading file '{}': {}", path.display(), e))?;
    toml::from_str(&text).map_err(|e| format!("error parsing TOML in '{}': {}", path.display(), e))
}

/// Split a `--set` argument into its pointer and value. The value is read
/// as JSON, or taken as a plain string when it is not valid JSON.
pub(crate) fn parse_assignment(arg: &str) -> Result<(String, Value), String> {
    let (pointer, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("invalid --set '{}': expected <pointer>=<json>", arg))?;
    if pointer.is_empty() {
        return Err(format!("invalid --set '{}': empty pointer", arg));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((pointer.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assignments_parse_json_or_fall_back_to_strings() {
        assert_eq!(
            parse_assignment("/age=42").unwrap(),
            ("/age".to_string(), json!(42))
        );
        assert_eq!(
            parse_assignment("/name=Ada").unwrap(),
            ("/name".to_string(), json!("Ada"))
        );
        assert_eq!(
            parse_assignment("/tags=[\"a\",\"b=c\"]").unwrap(),
            ("/tags".to_string(), json!(["a", "b=c"]))
        );
        assert!(parse_assignment("/name").is_err());
        assert!(parse_assignment("=1").is_err());
    }

    #[test]
    fn config_reads_toml() {
        let dir = std::env::temp_dir().join(format!("schemaform-load-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tree.toml");
        std::fs::write(&path, "validation_mode = \"none\"\nreset_hidden_values = false\n").unwrap();
        let config = read_config(&path).unwrap();
        assert_eq!(config.validation_mode, schemaform_core::ValidationMode::None);
        assert!(!config.reset_hidden_values);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
