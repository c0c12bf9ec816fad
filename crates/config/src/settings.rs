//! Main settings module
//!
//! Settings are assembled from the process environment at startup. Optional
//! provider credentials stay `None` when unset; the affected operations then
//! fail per-call and are logged, the rest of the system keeps running.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::constants;

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value for {}: {:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

/// Gateway binding and webhook advertisement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port
    pub port: u16,
    /// Canonical WebSocket path the carrier connects to
    pub ws_path: String,
    /// Public base URL advertised to the carrier for webhooks
    pub public_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            ws_path: "/voicebot/ws".to_string(),
            public_base_url: None,
        }
    }
}

impl ServerConfig {
    fn from_env() -> Self {
        let default = Self::default();
        Self {
            port: env_parse("PORT", default.port),
            ws_path: env_string("WS_PATH").unwrap_or(default.ws_path),
            public_base_url: env_string("PUBLIC_BASE_URL"),
        }
    }
}

/// Credentials for the carrier's outbound-call REST API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarrierConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub subdomain: Option<String>,
    pub caller_id: Option<String>,
    pub app_id: Option<String>,
}

impl CarrierConfig {
    fn from_env() -> Self {
        Self {
            account_sid: env_string("CARRIER_ACCOUNT_SID"),
            auth_token: env_string("CARRIER_AUTH_TOKEN"),
            subdomain: env_string("CARRIER_SUBDOMAIN"),
            caller_id: env_string("CARRIER_CALLER_ID"),
            app_id: env_string("CARRIER_APP_ID"),
        }
    }

    /// Names of the required environment keys that are not set
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.account_sid.is_none() {
            missing.push("CARRIER_ACCOUNT_SID");
        }
        if self.auth_token.is_none() {
            missing.push("CARRIER_AUTH_TOKEN");
        }
        if self.subdomain.is_none() {
            missing.push("CARRIER_SUBDOMAIN");
        }
        if self.caller_id.is_none() {
            missing.push("CARRIER_CALLER_ID");
        }
        if self.app_id.is_none() {
            missing.push("CARRIER_APP_ID");
        }
        missing
    }
}

/// Speech-to-text provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    /// Default transcription language
    pub language: String,
    pub timeout: Duration,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.speech.example.com/v1/recognize".to_string(),
            language: "en".to_string(),
            timeout: Duration::from_secs(constants::SPEECH_TIMEOUT_SECS),
        }
    }
}

impl SttConfig {
    fn from_env() -> Self {
        let default = Self::default();
        Self {
            api_key: env_string("STT_API_KEY"),
            endpoint: env_string("STT_ENDPOINT").unwrap_or(default.endpoint),
            language: env_string("STT_LANGUAGE").unwrap_or(default.language),
            timeout: default.timeout,
        }
    }
}

/// Text-to-speech provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    /// Provider voice used when the caller supplies none (or an unknown alias)
    pub default_voice: String,
    pub timeout: Duration,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.speech.example.com/v1/synthesize".to_string(),
            default_voice: "meera".to_string(),
            timeout: Duration::from_secs(constants::SPEECH_TIMEOUT_SECS),
        }
    }
}

impl TtsConfig {
    fn from_env() -> Self {
        let default = Self::default();
        Self {
            api_key: env_string("TTS_API_KEY"),
            endpoint: env_string("TTS_ENDPOINT").unwrap_or(default.endpoint),
            default_voice: env_string("TTS_DEFAULT_VOICE").unwrap_or(default.default_voice),
            timeout: default.timeout,
        }
    }
}

/// LLM provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    /// Non-streaming endpoint (kept for completeness; the pipeline streams)
    pub endpoint: String,
    /// Server-sent-events streaming endpoint
    pub stream_endpoint: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
    /// Deadline for initial response headers only
    pub initial_response_timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.llm.example.com/v1/models/chat:generate".to_string(),
            stream_endpoint: "https://api.llm.example.com/v1/models/chat:streamGenerate"
                .to_string(),
            temperature: 0.7,
            max_output_tokens: 150,
            top_p: 1.0,
            top_k: 40,
            initial_response_timeout: Duration::from_secs(
                constants::LLM_INITIAL_RESPONSE_TIMEOUT_SECS,
            ),
        }
    }
}

impl LlmConfig {
    fn from_env() -> Self {
        let mut config = Self::default();
        config.api_key = env_string("LLM_API_KEY");
        if let Some(endpoint) = env_string("LLM_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(endpoint) = env_string("LLM_STREAM_ENDPOINT") {
            config.stream_endpoint = endpoint;
        }
        config
    }
}

/// Persona/knowledge store and caches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Persistence URI for the persona/document store backend
    pub database_uri: Option<String>,
    pub persona_cache_ttl: Duration,
    pub chunk_cache_ttl: Duration,
    pub chunk_target_chars: usize,
    pub chunk_overlap_chars: usize,
    pub retrieval_top_k: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            database_uri: None,
            persona_cache_ttl: Duration::from_secs(constants::PERSONA_CACHE_TTL_SECS),
            chunk_cache_ttl: Duration::from_secs(constants::CHUNK_CACHE_TTL_SECS),
            chunk_target_chars: constants::CHUNK_TARGET_CHARS,
            chunk_overlap_chars: constants::CHUNK_OVERLAP_CHARS,
            retrieval_top_k: constants::RETRIEVAL_TOP_K,
        }
    }
}

impl KnowledgeConfig {
    fn from_env() -> Self {
        Self {
            database_uri: env_string("DATABASE_URI"),
            ..Self::default()
        }
    }
}

/// Turn pipeline tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Samples above this absolute amplitude count as voiced
    pub silence_amplitude: i16,
    /// Buffers below this voiced ratio never reach STT
    pub min_voiced_ratio: f32,
    pub flush_min_chars: usize,
    pub flush_min_words: usize,
    pub flush_hard_limit_chars: usize,
    pub reply_max_chars: usize,
    pub history_window: usize,
    pub chunk_pacing: Duration,
    /// Fallback greeting from the environment
    pub greeting_text: Option<String>,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            silence_amplitude: constants::SILENCE_AMPLITUDE_THRESHOLD,
            min_voiced_ratio: constants::MIN_VOICED_RATIO,
            flush_min_chars: constants::FLUSH_MIN_CHARS,
            flush_min_words: constants::FLUSH_MIN_WORDS,
            flush_hard_limit_chars: constants::FLUSH_HARD_LIMIT_CHARS,
            reply_max_chars: constants::REPLY_MAX_CHARS,
            history_window: constants::HISTORY_WINDOW,
            chunk_pacing: Duration::from_millis(constants::CHUNK_PACING_MS),
            greeting_text: None,
        }
    }
}

impl TurnConfig {
    fn from_env() -> Self {
        let default = Self::default();
        Self {
            silence_amplitude: env_parse("SILENCE_AMPLITUDE_THRESHOLD", default.silence_amplitude),
            min_voiced_ratio: env_parse("MIN_VOICED_RATIO", default.min_voiced_ratio),
            greeting_text: env_string("GREETING_TEXT"),
            ..default
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub carrier: CarrierConfig,
    pub stt: SttConfig,
    pub tts: TtsConfig,
    pub llm: LlmConfig,
    pub knowledge: KnowledgeConfig,
    pub turn: TurnConfig,
}

impl Settings {
    /// Read settings from the process environment
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            carrier: CarrierConfig::from_env(),
            stt: SttConfig::from_env(),
            tts: TtsConfig::from_env(),
            llm: LlmConfig::from_env(),
            knowledge: KnowledgeConfig::from_env(),
            turn: TurnConfig::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.ws_path, "/voicebot/ws");
        assert_eq!(settings.llm.temperature, 0.7);
        assert_eq!(settings.llm.max_output_tokens, 150);
        assert_eq!(settings.llm.top_k, 40);
        assert_eq!(settings.turn.silence_amplitude, 100);
        assert_eq!(settings.turn.min_voiced_ratio, 0.05);
    }

    #[test]
    fn test_missing_carrier_keys_enumerated() {
        let carrier = CarrierConfig {
            account_sid: Some("AC1".to_string()),
            ..Default::default()
        };
        let missing = carrier.missing_keys();
        assert_eq!(missing.len(), 4);
        assert!(missing.contains(&"CARRIER_AUTH_TOKEN"));
        assert!(!missing.contains(&"CARRIER_ACCOUNT_SID"));
    }
}
