use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file take precedence over environment variables.
///
/// # Example YAML structure
/// ```yaml
/// engine:
///   event_ip: "127.0.0.1"
///   event_port: 5050
///   default_flavor: "openai"
///   unknown_event_policy: "end_session"
///
/// opensips:
///   ip: "127.0.0.1"
///   port: 8080
///   timeout_ms: 2000
///
/// openai:
///   key: "sk-..."
///   model: "gpt-4o-realtime-preview-2024-12-17"
///   voice: "alloy"
///   instructions: "You are a helpful receptionist."
///   welcome_message: "Welcome to the front desk!"
///   transfer_to: "sip:operator@example.com"
///   transfer_by: "sip:bot@example.com"
///   turn_detection_type: "server_vad"
///   turn_detection_silence_ms: 200
///   turn_detection_threshold: 0.5
///   turn_detection_prefix_ms: 200
///   temperature: 0.8
///   max_tokens: inf
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub engine: Option<EngineYaml>,
    pub opensips: Option<OpenSipsYaml>,
    pub openai: Option<OpenAIYaml>,
}

/// Event socket and call handling from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngineYaml {
    pub event_ip: Option<String>,
    pub event_port: Option<u16>,
    pub default_flavor: Option<String>,
    pub unknown_event_policy: Option<String>,
}

/// Management interface of the switch from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OpenSipsYaml {
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub timeout_ms: Option<u64>,
}

/// OpenAI engine settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OpenAIYaml {
    pub key: Option<String>,
    pub model: Option<String>,
    pub url: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub welcome_message: Option<String>,
    pub transfer_to: Option<String>,
    pub transfer_by: Option<String>,
    pub turn_detection_type: Option<String>,
    pub turn_detection_silence_ms: Option<u32>,
    pub turn_detection_threshold: Option<f32>,
    pub turn_detection_prefix_ms: Option<u32>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<MaxTokensYaml>,
}

/// `max_tokens` is either a number or the string `inf`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MaxTokensYaml {
    Number(u32),
    Text(String),
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
engine:
  event_ip: "10.0.0.2"
  event_port: 5050
  default_flavor: "openai"
  unknown_event_policy: "ignore"

opensips:
  ip: "10.0.0.1"
  port: 8088
  timeout_ms: 500

openai:
  key: "sk-yaml"
  model: "gpt-4o-mini-realtime-preview"
  voice: "verse"
  welcome_message: "Hello!"
  transfer_to: "sip:operator@example.com"
  turn_detection_silence_ms: 400
  temperature: 0.6
  max_tokens: 512
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let engine = config.engine.unwrap();
        assert_eq!(engine.event_ip, Some("10.0.0.2".to_string()));
        assert_eq!(engine.event_port, Some(5050));
        assert_eq!(engine.unknown_event_policy, Some("ignore".to_string()));

        let opensips = config.opensips.unwrap();
        assert_eq!(opensips.port, Some(8088));
        assert_eq!(opensips.timeout_ms, Some(500));

        let openai = config.openai.unwrap();
        assert_eq!(openai.key, Some("sk-yaml".to_string()));
        assert_eq!(openai.voice, Some("verse".to_string()));
        assert_eq!(openai.turn_detection_silence_ms, Some(400));
        assert_eq!(openai.max_tokens, Some(MaxTokensYaml::Number(512)));
        assert!(openai.instructions.is_none());
    }

    #[test]
    fn test_max_tokens_inf() {
        let config: YamlConfig = serde_yaml::from_str("openai:\n  max_tokens: inf\n").unwrap();
        assert_eq!(
            config.openai.unwrap().max_tokens,
            Some(MaxTokensYaml::Text("inf".to_string()))
        );
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.engine.is_none());
        assert!(config.opensips.is_none());
        assert!(config.openai.is_none());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        fs::write(&config_path, "opensips:\n  ip: \"localhost\"\n  port: 8080\n").unwrap();

        let config = YamlConfig::from_file(&config_path).unwrap();
        let opensips = config.opensips.unwrap();
        assert_eq!(opensips.ip, Some("localhost".to_string()));
        assert_eq!(opensips.port, Some(8080));
    }

    #[test]
    fn test_from_file_not_found() {
        let path = PathBuf::from("/nonexistent/config.yaml");
        let result = YamlConfig::from_file(&path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");

        fs::write(&config_path, "invalid: yaml: content:").unwrap();

        let result = YamlConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );
    }
}
