//! Service traits for pluggable speech and language-model backends
//!
//! The turn pipeline only sees these traits, which keeps the external
//! providers swappable and the pipeline testable with scripted mocks.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Speech-to-text over a buffered utterance
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe 16-bit LE mono PCM.
    ///
    /// Returns `Ok(None)` for empty input, a provider failure, or an empty
    /// transcript; the caller decides whether to skip the turn.
    async fn transcribe(
        &self,
        pcm: &[u8],
        sample_rate: u32,
        language: &str,
    ) -> Result<Option<String>>;
}

/// PCM produced by a TTS provider, at the provider's native rate
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    /// 16-bit LE mono PCM
    pub pcm: Vec<u8>,
    /// Rate the provider rendered at; the caller resamples if it differs
    /// from the session rate
    pub sample_rate: u32,
}

/// Text-to-speech synthesis
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthesize `text` with the given voice (provider default when `None`).
    ///
    /// `target_sample_rate` is a hint; the provider may render at a
    /// different rate, reported in the result.
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        target_sample_rate: u32,
    ) -> Result<SynthesizedAudio>;
}

/// One streamed increment of an LLM reply
#[derive(Debug, Clone)]
pub struct TokenDelta {
    /// Delta text; empty on the completion marker
    pub text: String,
    /// Set exactly once, after the last content delta
    pub is_complete: bool,
}

impl TokenDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_complete: false,
        }
    }

    pub fn complete() -> Self {
        Self {
            text: String::new(),
            is_complete: true,
        }
    }
}

/// Streaming large-language-model backend
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Stream a reply to `prompt`, sending each delta on `tx` followed by a
    /// single completion marker.
    ///
    /// Returns the accumulated full reply, or `Ok(None)` when the provider
    /// produced no text. A dropped receiver cancels generation; the text
    /// accumulated so far is still returned.
    async fn stream_reply(
        &self,
        prompt: &str,
        tx: mpsc::Sender<TokenDelta>,
    ) -> Result<Option<String>>;
}
