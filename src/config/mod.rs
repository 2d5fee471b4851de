//! Configuration module for the voice connector
//!
//! This module handles gateway configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable names and parsing
//! - `merge`: Merging YAML and environment configurations
//!
//! # Example
//! ```rust,no_run
//! use ai_voice_connector::config::GatewayConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = GatewayConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = GatewayConfig::from_file(&config_path)?;
//!
//! println!("Management interface at {}", config.mi_address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

pub mod env;
mod merge;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::call::CallManagerConfig;
use crate::core::realtime::{BackendFlavor, OpenAIConfig, UnknownEventPolicy};

/// Event socket and call handling settings
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Address the event socket binds to and announces
    pub event_ip: String,
    /// Event socket port; 0 picks an ephemeral port
    pub event_port: u16,
    /// Flavor for INVITEs without a `To` header
    pub default_flavor: BackendFlavor,
    pub unknown_event_policy: UnknownEventPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_ip: "127.0.0.1".to_string(),
            event_port: 0,
            default_flavor: BackendFlavor::default(),
            unknown_event_policy: UnknownEventPolicy::default(),
        }
    }
}

/// Management interface of the switch
#[derive(Debug, Clone, PartialEq)]
pub struct OpenSipsConfig {
    pub ip: String,
    pub port: u16,
    /// Per-command reply timeout
    pub timeout_ms: u64,
}

impl Default for OpenSipsConfig {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: 8080,
            timeout_ms: 2000,
        }
    }
}

/// Gateway configuration
///
/// Contains everything needed to run the connector:
/// - Event socket settings
/// - Management interface of the switch
/// - OpenAI engine settings, including the API key
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub engine: EngineConfig,
    pub opensips: OpenSipsConfig,
    pub openai: OpenAIConfig,
}

impl GatewayConfig {
    /// Load configuration from environment variables
    ///
    /// Missing variables fall back to defaults. Variables that do not parse
    /// are reported as errors naming the variable.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, else from the file named by `CONFIG_FILE`, else
    /// from the environment alone.
    pub fn load(path: Option<PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        match path.or_else(|| env::string(env::CONFIG_FILE).map(PathBuf::from)) {
            Some(path) => Self::from_file(&path),
            None => Self::from_env(),
        }
    }

    pub fn mi_address(&self) -> String {
        format!("{}:{}", self.opensips.ip, self.opensips.port)
    }

    pub fn mi_timeout(&self) -> Duration {
        Duration::from_millis(self.opensips.timeout_ms)
    }

    pub fn call_manager_config(&self) -> CallManagerConfig {
        CallManagerConfig {
            flavors: BackendFlavor::all().to_vec(),
            default_flavor: self.engine.default_flavor,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.openai.api_key.as_ref().is_some_and(|k| !k.is_empty())
    }

    fn validate(&self) -> Result<(), String> {
        let threshold = self.openai.turn_detection.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(format!(
                "Turn detection threshold must be between 0.0 and 1.0, got {threshold}"
            ));
        }
        if self.openai.temperature < 0.0 {
            return Err(format!(
                "Temperature must not be negative, got {}",
                self.openai.temperature
            ));
        }
        if self.opensips.timeout_ms == 0 {
            return Err("MI timeout must be greater than zero".to_string());
        }
        if let Some(raw) = self.openai.url.as_deref() {
            let parsed = url::Url::parse(raw)
                .map_err(|e| format!("Invalid OpenAI URL '{raw}': {e}"))?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(format!(
                    "OpenAI URL scheme must be ws or wss, got: {}",
                    parsed.scheme()
                ));
            }
        }
        Ok(())
    }
}
