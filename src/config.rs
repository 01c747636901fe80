use crate::constants::{
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_VIRTUAL_HOST, FAST_MODE, MIDJOURNEY_FAST_MODEL,
    MIDJOURNEY_MODEL, MIDJOURNEY_TURBO_MODEL, RELAX_MODE, RENDERER_MODES, TURBO_MODE,
};
use crate::pricing::QuotaTable;
use crate::types::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MJ_API_SECRET_ENV: &str = "MJ_API_SECRET";
pub const MJ_ENDPOINT_ENV: &str = "MJ_ENDPOINT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MidjourneyConfig {
    /// Base URL of the midjourney-proxy deployment. Empty disables image tasks.
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    /// Host used for the follow-up action links.
    pub virtual_host: String,
    pub poll_interval_ms: u64,
    /// Tokens stripped from user prompts before the model's own mode is appended.
    pub renderer_modes: Vec<String>,
    pub mode_tokens: HashMap<String, String>,
    pub default_mode: String,
}

impl Default for MidjourneyConfig {
    fn default() -> Self {
        let mode_tokens = [
            (MIDJOURNEY_MODEL, RELAX_MODE),
            (MIDJOURNEY_FAST_MODEL, FAST_MODE),
            (MIDJOURNEY_TURBO_MODEL, TURBO_MODE),
        ]
        .into_iter()
        .map(|(model, mode)| (model.to_string(), mode.to_string()))
        .collect();

        Self {
            endpoint: String::new(),
            api_secret: None,
            virtual_host: DEFAULT_VIRTUAL_HOST.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            renderer_modes: RENDERER_MODES.iter().map(|m| m.to_string()).collect(),
            mode_tokens,
            default_mode: RELAX_MODE.to_string(),
        }
    }
}

impl MidjourneyConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn is_midjourney_model(&self, model: &str) -> bool {
        self.mode_tokens.contains_key(model)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub quota: QuotaTable,
    /// OpenRouter-style `/models` listing merged over `quota` at load time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing_file: Option<PathBuf>,
    pub midjourney: MidjourneyConfig,
}

impl GatewayConfig {
    /// Reads the JSON config at `path` (defaults when `None`), merges the
    /// pricing listing it points at and applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    GatewayError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                serde_json::from_str::<GatewayConfig>(&raw).map_err(|e| {
                    GatewayError::Config(format!("invalid config {}: {}", path.display(), e))
                })?
            }
            None => GatewayConfig::default(),
        };

        if let Some(pricing_path) = config.pricing_file.clone() {
            let pricing_path = match (pricing_path.is_relative(), path.and_then(Path::parent)) {
                (true, Some(dir)) => dir.join(pricing_path),
                _ => pricing_path,
            };
            let raw = std::fs::read_to_string(&pricing_path)?;
            let listing: serde_json::Value = serde_json::from_str(&raw)?;
            let merged = config.quota.merge_pricing_json(&listing);
            tracing::info!("Merged pricing for {} models from {}", merged, pricing_path.display());
        }

        config.apply_env();
        Ok(config)
    }

    /// `MJ_API_SECRET` and `MJ_ENDPOINT` override the file. Empty values are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var(MJ_API_SECRET_ENV) {
            if !secret.is_empty() {
                self.midjourney.api_secret = Some(secret);
            }
        }
        if let Ok(endpoint) = std::env::var(MJ_ENDPOINT_ENV) {
            if !endpoint.is_empty() {
                self.midjourney.endpoint = endpoint;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MidjourneyConfig::default();
        assert_eq!(config.virtual_host, "https://chat.virtual");
        assert_eq!(config.mode_tokens.get("midjourney-fast").map(String::as_str), Some("--fast"));
        assert_eq!(config.poll_interval(), Duration::from_millis(1500));
        assert!(config.is_midjourney_model("midjourney-turbo"));
        assert!(!config.is_midjourney_model("gpt-4"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"midjourney": {{"endpoint": "http://mj.local", "poll_interval_ms": 0}}}}"#
        )
        .unwrap();

        let config = GatewayConfig::load(Some(file.path())).unwrap();
        assert!(!config.midjourney.endpoint.is_empty());
        assert_eq!(config.midjourney.default_mode, "--relax");
        assert_eq!(config.midjourney.poll_interval(), Duration::from_millis(1));
        assert!(config.quota.models.contains_key("gpt-4"));
    }

    #[test]
    fn test_pricing_file_is_resolved_next_to_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("models.json"),
            r#"{"data":[{"id":"acme/tiny","pricing":{"prompt":"0.000001","completion":"0.000002"}}]}"#,
        )
        .unwrap();
        let config_path = dir.path().join("gateway.json");
        std::fs::write(&config_path, r#"{"pricing_file":"models.json"}"#).unwrap();

        let config = GatewayConfig::load(Some(&config_path)).unwrap();
        assert!(config.quota.models.contains_key("acme/tiny"));
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let result = GatewayConfig::load(Some(file.path()));
        assert!(matches!(result.map_err(|e| e.inner), Err(GatewayError::Config(_))));
    }
}
