//! Cloud speech clients
//!
//! - [`SttClient`]: buffered-utterance transcription over HTTP
//! - [`TtsClient`]: text-to-PCM synthesis over HTTP
//!
//! Both carry a 30-second deadline and no internal retry; the turn pipeline
//! decides what a failed call means for the conversation.

pub mod stt;
pub mod tts;
pub mod voices;

pub use stt::SttClient;
pub use tts::TtsClient;
pub use voices::resolve_voice;

use thiserror::Error;

/// Speech client errors
#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Request failed: {0}")]
    Network(String),

    #[error("Provider error: {0}")]
    Api(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Empty text rejected")]
    EmptyText,

    #[error("Client configuration: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for SpeechError {
    fn from(err: reqwest::Error) -> Self {
        SpeechError::Network(err.to_string())
    }
}

impl From<SpeechError> for voicebot_core::Error {
    fn from(err: SpeechError) -> Self {
        voicebot_core::Error::Speech(err.to_string())
    }
}
