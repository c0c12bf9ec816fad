//! Streaming LLM client and prompt assembly

pub mod client;
pub mod prompt;

pub use client::LlmClient;
pub use prompt::{build_system_prompt, build_turn_prompt, context_block};

use thiserror::Error;

/// LLM client errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Request failed: {0}")]
    Network(String),

    #[error("Provider error: {0}")]
    Api(String),

    #[error("Initial response timed out")]
    Timeout,

    #[error("Client configuration: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}

impl From<LlmError> for voicebot_core::Error {
    fn from(err: LlmError) -> Self {
        voicebot_core::Error::Llm(err.to_string())
    }
}
