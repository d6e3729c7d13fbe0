//! Bridge configuration (layered: code > env > file > defaults).

pub mod limits;
pub mod names;

use std::path::Path;

use bon::Builder;
use serde::Deserialize;

use crate::error::BridgeError;

/// Default inline placeholder marking where a queued artifact is rendered.
pub const DEFAULT_PLACEHOLDER_TOKEN: &str = "{{place_chart_here}}";

const ENV_PROGRESSIVE: &str = "HOSTBRIDGE_PROGRESSIVE_DISCOVERY";
const ENV_CAPSULE: &str = "HOSTBRIDGE_LOCAL_TOOL_CAPSULE";
const ENV_TOKENS: &str = "HOSTBRIDGE_PLACEHOLDER_TOKENS";

/// Per-request behaviour toggles.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Rename wrapped calls to `call_tools` and merge tagged toolsets into discovery.
    #[builder(default = true)]
    pub enable_progressive_discovery: bool,
    /// Pack completed local tool calls into outbound deferred requests and
    /// rehydrate them from inbound results.
    #[builder(default = true)]
    pub enable_local_tool_capsule: bool,
    #[builder(default = vec![DEFAULT_PLACEHOLDER_TOKEN.to_string()])]
    pub placeholder_tokens: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BridgeConfig {
    /// Load overrides from environment variables on top of the defaults.
    pub fn from_env() -> Result<Self, BridgeError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::default();

        if let Ok(raw) = std::env::var(ENV_PROGRESSIVE) {
            config.enable_progressive_discovery = parse_flag(ENV_PROGRESSIVE, &raw)?;
        }
        if let Ok(raw) = std::env::var(ENV_CAPSULE) {
            config.enable_local_tool_capsule = parse_flag(ENV_CAPSULE, &raw)?;
        }
        if let Ok(raw) = std::env::var(ENV_TOKENS) {
            let tokens: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .collect();
            if !tokens.is_empty() {
                config.placeholder_tokens = tokens;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, BridgeError> {
        let config: Self =
            toml::from_str(raw).map_err(|e| BridgeError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> Result<(), BridgeError> {
        if self.placeholder_tokens.iter().any(String::is_empty) {
            return Err(BridgeError::Configuration(
                "placeholder tokens must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, BridgeError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(BridgeError::Configuration(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}
