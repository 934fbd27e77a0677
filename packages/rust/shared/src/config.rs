//! Application configuration for LeadFlow.
//!
//! User config lives at `~/.leadflow/leadflow.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LeadFlowError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadflow";

// ---------------------------------------------------------------------------
// Config structs (matching leadflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Inference service settings.
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Pipeline policies.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root directory for batch data, snapshots, and the intel store.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Worker pool size for record processing.
    #[serde(default = "default_worker_count")]
    pub worker_count: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            worker_count: default_worker_count(),
        }
    }
}

fn default_data_dir() -> String {
    "data".into()
}
fn default_worker_count() -> u32 {
    4
}

/// `[inference]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Base URL of the text-generation service.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Total per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Name of the env var holding a bearer token (never store the key
    /// itself). Empty means unauthenticated.
    #[serde(default)]
    pub api_key_env: String,

    /// Generation cap passed to the service.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            api_key_env: String::new(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}
fn default_model() -> String {
    "llama3.2".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.2
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum intent score required before composition runs. `0.0`
    /// composes for every lead.
    #[serde(default)]
    pub compose_min_intent: f32,

    /// What a new batch run does with a lead id that already holds intel
    /// from an earlier run.
    #[serde(default)]
    pub reprocess: ReprocessPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            compose_min_intent: 0.0,
            reprocess: ReprocessPolicy::Overwrite,
        }
    }
}

/// Reprocessing policy for already-enriched leads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReprocessPolicy {
    /// Re-enrich unconditionally; the new state replaces the old entry.
    #[default]
    Overwrite,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LeadFlowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadflow/leadflow.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LeadFlowError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LeadFlowError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadFlowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeadFlowError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeadFlowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the bearer token, if the config names an env var for one.
pub fn resolve_api_key(config: &InferenceConfig) -> Option<String> {
    if config.api_key_env.is_empty() {
        return None;
    }
    std::env::var(&config.api_key_env)
        .ok()
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("worker_count"));
        assert!(toml_str.contains("base_url"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.worker_count, 4);
        assert_eq!(parsed.inference.timeout_secs, 30);
        assert_eq!(parsed.pipeline.compose_min_intent, 0.0);
        assert_eq!(parsed.pipeline.reprocess, ReprocessPolicy::Overwrite);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
data_dir = "/tmp/leadflow-data"

[inference]
model = "mistral"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.data_dir, "/tmp/leadflow-data");
        assert_eq!(config.defaults.worker_count, 4);
        assert_eq!(config.inference.model, "mistral");
        assert_eq!(config.inference.base_url, "http://localhost:11434");
    }

    #[test]
    fn malformed_config_is_config_error() {
        let result: Result<AppConfig> =
            toml::from_str("defaults = 5").map_err(|e| LeadFlowError::config(e.to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn api_key_resolution() {
        let mut config = InferenceConfig::default();
        assert!(resolve_api_key(&config).is_none());

        // Unique env var name to avoid interfering with other tests
        config.api_key_env = "LEADFLOW_TEST_NONEXISTENT_KEY_12345".into();
        assert!(resolve_api_key(&config).is_none());
    }
}
