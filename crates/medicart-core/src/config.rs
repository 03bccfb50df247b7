//! Configuration resolution for Medicart.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/medicart/settings.json)
//! 3. Project config (.medicart/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// Complete Medicart configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub forward: ForwardConfig,
}

/// External command-line tools driven by the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Device tool executable name or path.
    pub device_cli: String,
    /// Camera control tool executable name or path.
    pub camera_cli: String,
    /// Extra arguments appended after the device mode flag.
    pub device_args: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            device_cli: "lepu_cli.exe".to_string(),
            camera_cli: "camera_cli.exe".to_string(),
            device_args: Vec::new(),
        }
    }
}

/// HTTP/WebSocket server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8081,
            log_level: "info".to_string(),
        }
    }
}

/// Defaults for HTTP forwarding to a central collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Collector ingest URL.
    pub url: Option<String>,
    pub patient_name: Option<String>,
    pub clinic_name: Option<String>,
    /// Per-request timeout (seconds).
    pub timeout_secs: u64,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            url: Some("http://localhost:8080/api/data".to_string()),
            patient_name: None,
            clinic_name: None,
            timeout_secs: 10,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let global = global_config_path();
    let mut config = load_layers(global.as_deref(), project_dir)?;
    apply_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Load the file layers only: defaults, then `global`, then the project
/// settings under `project_dir`. Missing files are skipped; fields absent
/// from a layer keep the value from the layer below.
pub fn load_layers(global: Option<&Path>, project_dir: Option<&Path>) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;

    if let Some(global_path) = global
        && global_path.exists()
    {
        merge_value(&mut merged, load_config_file(global_path)?);
        debug!(path = %global_path.display(), "Loaded global config");
    }

    if let Some(dir) = project_dir {
        let project_path = dir.join(".medicart").join("settings.json");
        if project_path.exists() {
            merge_value(&mut merged, load_config_file(&project_path)?);
            debug!(path = %project_path.display(), "Loaded project config");
        }
    }

    serde_json::from_value(merged).map_err(|e| Error::Config(format!("Invalid configuration: {e}")))
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".medicart").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/medicart/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("medicart").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Recursively overlay `overlay` onto `base`. Objects merge key by key;
/// any other value replaces.
fn merge_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Apply `MEDICART_*` overrides read through `lookup`.
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("MEDICART_DEVICE_CLI") {
        config.tools.device_cli = val;
    }
    if let Some(val) = lookup("MEDICART_CAMERA_CLI") {
        config.tools.camera_cli = val;
    }
    if let Some(val) = lookup("MEDICART_PORT")
        && let Ok(n) = val.parse()
    {
        config.server.port = n;
    }
    if let Some(val) = lookup("MEDICART_LOG_LEVEL") {
        config.server.log_level = val;
    }
    if let Some(val) = lookup("MEDICART_FORWARD_URL") {
        config.forward.url = Some(val);
    }
    if let Some(val) = lookup("MEDICART_PATIENT_NAME") {
        config.forward.patient_name = Some(val);
    }
    if let Some(val) = lookup("MEDICART_CLINIC_NAME") {
        config.forward.clinic_name = Some(val);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_point_at_device_tools() {
        let config = Config::default();
        assert_eq!(config.tools.device_cli, "lepu_cli.exe");
        assert_eq!(config.tools.camera_cli, "camera_cli.exe");
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.forward.timeout_secs, 10);
    }

    #[test]
    fn project_layer_overrides_global() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.json");
        std::fs::write(
            &global,
            r#"{"tools": {"device_cli": "/opt/lepu/lepu_cli"}, "forward": {"clinic_name": "North"}}"#,
        )
        .unwrap();

        let project = dir.path().join("project");
        std::fs::create_dir_all(project.join(".medicart")).unwrap();
        std::fs::write(
            project.join(".medicart").join("settings.json"),
            r#"{"server": {"port": 9000}, "forward": {"patient_name": "Ada"}}"#,
        )
        .unwrap();

        let config = load_layers(Some(&global), Some(&project)).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.forward.patient_name.as_deref(), Some("Ada"));
        assert_eq!(config.forward.clinic_name.as_deref(), Some("North"));
        assert_eq!(config.tools.device_cli, "/opt/lepu/lepu_cli");
        assert_eq!(config.tools.camera_cli, "camera_cli.exe");
    }

    #[test]
    fn missing_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_layers(Some(&dir.path().join("nope.json")), Some(dir.path())).unwrap();
        assert_eq!(config.server.port, 8081);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.json");
        std::fs::write(&global, "{not json").unwrap();
        let err = load_layers(Some(&global), None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("MEDICART_DEVICE_CLI", "./lepu_cli"),
            ("MEDICART_PORT", "7000"),
            ("MEDICART_FORWARD_URL", "http://collector/api/ingest"),
            ("MEDICART_PATIENT_NAME", "Grace"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        apply_overrides(&mut config, |k| env.get(k).map(ToString::to_string));

        assert_eq!(config.tools.device_cli, "./lepu_cli");
        assert_eq!(config.server.port, 7000);
        assert_eq!(
            config.forward.url.as_deref(),
            Some("http://collector/api/ingest")
        );
        assert_eq!(config.forward.patient_name.as_deref(), Some("Grace"));
        assert!(config.forward.clinic_name.is_none());
    }

    #[test]
    fn unparsable_port_override_is_ignored() {
        let mut config = Config::default();
        apply_overrides(&mut config, |k| (k == "MEDICART_PORT").then(|| "abc".to_string()));
        assert_eq!(config.server.port, 8081);
    }
}
