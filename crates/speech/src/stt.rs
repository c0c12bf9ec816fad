//! Speech-to-text client
//!
//! Wraps the buffered utterance in a WAV container and posts it to the
//! provider. A failed or empty transcription is reported as `None`, never as
//! an error: the turn pipeline simply skips the turn.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use voicebot_core::{audio, Result, SpeechToText};
use voicebot_config::SttConfig;

use crate::SpeechError;

/// Provider response: ranked alternatives per result segment
#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognizeResult>,
}

#[derive(Debug, Deserialize)]
struct RecognizeResult {
    #[serde(default)]
    alternatives: Vec<RecognizeAlternative>,
}

#[derive(Debug, Deserialize)]
struct RecognizeAlternative {
    #[serde(default)]
    transcript: String,
}

impl RecognizeResponse {
    /// The top alternative's transcript, trimmed; `None` when empty
    fn top_transcript(self) -> Option<String> {
        let text = self
            .results
            .into_iter()
            .next()?
            .alternatives
            .into_iter()
            .next()?
            .transcript;
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}

/// HTTP speech-to-text client
pub struct SttClient {
    client: Client,
    config: SttConfig,
}

impl SttClient {
    pub fn new(config: SttConfig) -> std::result::Result<Self, SpeechError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SpeechError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn recognize(&self, wav: Vec<u8>, language: &str) -> std::result::Result<Option<String>, SpeechError> {
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .query(&[("language", language)])
            .header(reqwest::header::CONTENT_TYPE, "audio/wav")
            .body(wav);

        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Api(format!("HTTP {}: {}", status, body)));
        }

        let parsed: RecognizeResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::InvalidResponse(e.to_string()))?;

        Ok(parsed.top_transcript())
    }
}

#[async_trait]
impl SpeechToText for SttClient {
    async fn transcribe(
        &self,
        pcm: &[u8],
        sample_rate: u32,
        language: &str,
    ) -> Result<Option<String>> {
        if pcm.is_empty() {
            return Ok(None);
        }

        let language = if language.is_empty() {
            self.config.language.as_str()
        } else {
            language
        };

        let wav = audio::pcm_to_wav(pcm, sample_rate)?;

        match self.recognize(wav, language).await {
            Ok(text) => Ok(text),
            Err(e) => {
                // Provider failures skip the turn rather than killing the call
                tracing::warn!(error = %e, "STT request failed");
                Ok(None)
            }
        }
    }
}
