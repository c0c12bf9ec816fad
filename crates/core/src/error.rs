//! Error types shared across the voicebot crates

use thiserror::Error;

/// Top-level error for the voicebot
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(String),

    /// Transient or permanent failure of an external speech service (STT/TTS)
    #[error("Speech service error: {0}")]
    Speech(String),

    /// Transient or permanent failure of the LLM provider
    #[error("Language model error: {0}")]
    Llm(String),

    #[error("Knowledge store error: {0}")]
    Knowledge(String),

    /// Unparseable or out-of-contract carrier frame
    #[error("Carrier protocol error: {0}")]
    Protocol(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, Error>;
