//! Configuration for the voicebot
//!
//! All configuration is read once at startup from the process environment.
//! Every tunable has a default so a bare environment still boots a working
//! server (external providers then fail per-call and are logged).

pub mod constants;
pub mod settings;

pub use settings::{
    CarrierConfig, KnowledgeConfig, LlmConfig, ServerConfig, Settings, SttConfig, TtsConfig,
    TurnConfig,
};
