/// Provider configuration file loading.
///
/// The file maps provider names to launch commands in the common
/// `mcpServers` layout:
///
/// ```json
/// {
///   "mcpServers": {
///     "docs": {
///       "command": "docs-provider",
///       "args": ["--index", "main"],
///       "env": { "DOCS_ROOT": "/srv/docs" },
///       "startupTimeoutMs": 10000
///     }
///   }
/// }
/// ```
///
/// Descriptor order follows file order, which fixes how duplicate tool
/// names are resolved across providers.
use serde::Deserialize;
use spinoza_core::SessionDescriptor;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(rename = "mcpServers")]
    servers: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerEntry {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    disabled: bool,
    startup_timeout_ms: Option<u64>,
    list_timeout_ms: Option<u64>,
}

/// Load session descriptors from a configuration file.
///
/// Disabled entries are skipped. Timeout overrides are optional; absent
/// fields fall back to the descriptor defaults.
pub fn load_descriptors(path: &Path) -> anyhow::Result<Vec<SessionDescriptor>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config {}: {}", path.display(), e))?;
    let file: ConfigFile = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("failed to parse config {}: {}", path.display(), e))?;

    let mut descriptors = Vec::new();
    for (name, value) in file.servers {
        let entry: ServerEntry = serde_json::from_value(value)
            .map_err(|e| anyhow::anyhow!("invalid provider entry '{}': {}", name, e))?;

        if entry.disabled {
            info!(provider = %name, "Skipping disabled provider");
            continue;
        }

        let mut descriptor = SessionDescriptor::new(&name, &entry.command, entry.args);
        for (key, value) in entry.env {
            descriptor = descriptor.with_env(key, value);
        }
        if let Some(ms) = entry.startup_timeout_ms {
            descriptor = descriptor.with_startup_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = entry.list_timeout_ms {
            descriptor = descriptor.with_list_timeout(Duration::from_millis(ms));
        }
        descriptors.push(descriptor);
    }

    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spinoza_core::{DEFAULT_LIST_TIMEOUT, DEFAULT_STARTUP_TIMEOUT};
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn test_basic_config_parses_in_file_order() {
        let file = write_config(
            r#"{
                "mcpServers": {
                    "zeta": { "command": "zeta-provider" },
                    "alpha": { "command": "alpha-provider", "args": ["--fast"] }
                }
            }"#,
        );

        let descriptors = load_descriptors(file.path()).expect("valid config");
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].id, "zeta");
        assert_eq!(descriptors[1].id, "alpha");
        assert_eq!(descriptors[1].args, ["--fast"]);
    }

    #[test]
    fn test_disabled_entries_are_skipped() {
        let file = write_config(
            r#"{
                "mcpServers": {
                    "on": { "command": "on-provider" },
                    "off": { "command": "off-provider", "disabled": true }
                }
            }"#,
        );

        let descriptors = load_descriptors(file.path()).expect("valid config");
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].id, "on");
    }

    #[test]
    fn test_timeout_overrides_and_defaults() {
        let file = write_config(
            r#"{
                "mcpServers": {
                    "slow": {
                        "command": "slow-provider",
                        "startupTimeoutMs": 30000
                    }
                }
            }"#,
        );

        let descriptors = load_descriptors(file.path()).expect("valid config");
        assert_eq!(descriptors[0].startup_timeout, Duration::from_secs(30));
        assert_eq!(descriptors[0].list_timeout, DEFAULT_LIST_TIMEOUT);
        assert_eq!(DEFAULT_STARTUP_TIMEOUT, Duration::from_secs(5));
    }

    #[test]
    fn test_env_overrides_carried_into_descriptor() {
        let file = write_config(
            r#"{
                "mcpServers": {
                    "envy": {
                        "command": "envy-provider",
                        "env": { "API_BASE": "http://localhost:9999" }
                    }
                }
            }"#,
        );

        let descriptors = load_descriptors(file.path()).expect("valid config");
        assert_eq!(
            descriptors[0].env.get("API_BASE").map(String::as_str),
            Some("http://localhost:9999")
        );
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let file = write_config(r#"{ "mcpServers": [] }"#);
        assert!(load_descriptors(file.path()).is_err());
    }
}
