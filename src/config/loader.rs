use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};
use serde_json::Value;

use crate::config::group::ConfigurationGroup;

/// Prefix of environment variables layered over the property file
/// (`COURIER__SOAPCLIENT__DEF__BILLING__READ_TIMEOUT=5000`).
pub const ENV_PREFIX: &str = "COURIER";

/// Load a property file using the config crate and flatten it into a root group.
/// Supports multiple formats: YAML, JSON, TOML, INI.
pub async fn load_properties(config_path: &str) -> Result<ConfigurationGroup> {
    load_properties_sync(config_path)
}

/// Load properties synchronously, with environment overrides applied
pub fn load_properties_sync(config_path: &str) -> Result<ConfigurationGroup> {
    build_properties(config_path, true)
}

/// Load properties from the file only, ignoring the environment
pub fn load_properties_unchecked(config_path: &str) -> Result<ConfigurationGroup> {
    build_properties(config_path, false)
}

fn build_properties(config_path: &str, with_env: bool) -> Result<ConfigurationGroup> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Yaml, // Default to YAML
    };

    let mut builder = Config::builder().add_source(File::new(
        config_path
            .to_str()
            .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
        format,
    ));
    if with_env {
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));
    }

    let settings = builder
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let tree: Value = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    let mut entries = Vec::new();
    flatten("", &tree, &mut entries);
    tracing::debug!(
        "Loaded {} properties from {}",
        entries.len(),
        config_path.display()
    );
    Ok(ConfigurationGroup::root(entries))
}

/// Flatten a nested tree into dotted keys. Arrays become comma separated lists.
pub fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    let key = |k: &str| {
        if prefix.is_empty() {
            k.to_string()
        } else {
            format!("{prefix}.{k}")
        }
    };
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten(&key(k), v, out);
            }
        }
        Value::Array(items) => {
            let joined = items
                .iter()
                .filter_map(scalar)
                .collect::<Vec<_>>()
                .join(",");
            out.push((prefix.to_string(), joined));
        }
        Value::Null => {}
        other => {
            if let Some(s) = scalar(other) {
                out.push((prefix.to_string(), s));
            }
        }
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
