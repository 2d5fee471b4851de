use std::str::FromStr;

use zeroize::Zeroizing;

use super::env;
use super::yaml::{MaxTokensYaml, YamlConfig};
use super::{EngineConfig, GatewayConfig, OpenSipsConfig};
use crate::core::realtime::openai::{MaxOutputTokens, TurnDetectionSettings};
use crate::core::realtime::{BackendFlavor, OpenAIConfig, UnknownEventPolicy};

/// Build the gateway configuration from YAML values over environment values
/// over defaults.
pub fn merge_config(yaml: Option<YamlConfig>) -> Result<GatewayConfig, Box<dyn std::error::Error>> {
    let yaml = yaml.unwrap_or_default();
    let engine_yaml = yaml.engine.unwrap_or_default();
    let mi_yaml = yaml.opensips.unwrap_or_default();
    let ai_yaml = yaml.openai.unwrap_or_default();

    let engine_defaults = EngineConfig::default();
    let engine = EngineConfig {
        event_ip: engine_yaml
            .event_ip
            .or_else(|| env::string(env::EVENT_IP))
            .unwrap_or(engine_defaults.event_ip),
        event_port: pick(engine_yaml.event_port, env::EVENT_PORT)?
            .unwrap_or(engine_defaults.event_port),
        default_flavor: pick_parsed::<BackendFlavor>(
            engine_yaml.default_flavor,
            "engine.default_flavor",
            env::ENGINE_DEFAULT_FLAVOR,
        )?
        .unwrap_or(engine_defaults.default_flavor),
        unknown_event_policy: pick_parsed::<UnknownEventPolicy>(
            engine_yaml.unknown_event_policy,
            "engine.unknown_event_policy",
            env::ENGINE_UNKNOWN_EVENT_POLICY,
        )?
        .unwrap_or(engine_defaults.unknown_event_policy),
    };

    let mi_defaults = OpenSipsConfig::default();
    let opensips = OpenSipsConfig {
        ip: mi_yaml
            .ip
            .or_else(|| env::string(env::MI_IP))
            .unwrap_or(mi_defaults.ip),
        port: pick(mi_yaml.port, env::MI_PORT)?.unwrap_or(mi_defaults.port),
        timeout_ms: pick(mi_yaml.timeout_ms, env::MI_TIMEOUT_MS)?
            .unwrap_or(mi_defaults.timeout_ms),
    };

    let ai_defaults = OpenAIConfig::default();
    let detect_defaults = TurnDetectionSettings::default();
    let max_tokens = match ai_yaml.max_tokens {
        Some(MaxTokensYaml::Number(n)) => Some(MaxOutputTokens::Limit(n)),
        Some(MaxTokensYaml::Text(text)) => Some(
            text.parse::<MaxOutputTokens>()
                .map_err(|e| format!("Invalid value for openai.max_tokens: {e}"))?,
        ),
        None => env::parse(env::OPENAI_MAX_TOKENS)?,
    };

    let openai = OpenAIConfig {
        api_key: ai_yaml
            .key
            .or_else(|| env::string(env::OPENAI_API_KEY))
            .map(Zeroizing::new),
        model: text(ai_yaml.model, env::OPENAI_API_MODEL).unwrap_or(ai_defaults.model),
        url: text(ai_yaml.url, env::OPENAI_URL),
        voice: text(ai_yaml.voice, env::OPENAI_VOICE).unwrap_or(ai_defaults.voice),
        instructions: text(ai_yaml.instructions, env::OPENAI_INSTRUCTIONS),
        welcome_message: text(ai_yaml.welcome_message, env::OPENAI_WELCOME_MSG),
        transfer_to: text(ai_yaml.transfer_to, env::OPENAI_TRANSFER_TO),
        transfer_by: text(ai_yaml.transfer_by, env::OPENAI_TRANSFER_BY),
        turn_detection: TurnDetectionSettings {
            detection_type: text(ai_yaml.turn_detection_type, env::OPENAI_TURN_DETECT_TYPE)
                .unwrap_or(detect_defaults.detection_type),
            silence_duration_ms: pick(
                ai_yaml.turn_detection_silence_ms,
                env::OPENAI_TURN_DETECT_SILENCE_MS,
            )?
            .unwrap_or(detect_defaults.silence_duration_ms),
            threshold: pick(
                ai_yaml.turn_detection_threshold,
                env::OPENAI_TURN_DETECT_THRESHOLD,
            )?
            .unwrap_or(detect_defaults.threshold),
            prefix_padding_ms: pick(
                ai_yaml.turn_detection_prefix_ms,
                env::OPENAI_TURN_DETECT_PREFIX_MS,
            )?
            .unwrap_or(detect_defaults.prefix_padding_ms),
        },
        temperature: pick(ai_yaml.temperature, env::OPENAI_TEMPERATURE)?
            .unwrap_or(ai_defaults.temperature),
        max_tokens: max_tokens.unwrap_or(ai_defaults.max_tokens),
    };

    Ok(GatewayConfig {
        engine,
        opensips,
        openai,
    })
}

fn text(yaml: Option<String>, var: &str) -> Option<String> {
    yaml.filter(|v| !v.is_empty()).or_else(|| env::string(var))
}

fn pick<T>(yaml: Option<T>, var: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match yaml {
        Some(value) => Ok(Some(value)),
        None => env::parse(var),
    }
}

fn pick_parsed<T>(yaml: Option<String>, key: &str, var: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match yaml {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {key}: {e}")),
        None => env::parse(var),
    }
}
