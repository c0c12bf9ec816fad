//! Text-to-speech client
//!
//! Posts text to the provider and returns raw PCM at the provider's native
//! rate. Resampling to the session rate is the caller's job so that one
//! synthesis can be checked against the rate it was actually rendered at.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use voicebot_core::{Error, Result, SynthesizedAudio, TextToSpeech};
use voicebot_config::TtsConfig;

use crate::voices::resolve_voice;
use crate::SpeechError;

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice: &'a str,
    /// Requested output rate; the provider may answer at a different one
    sample_rate: u32,
}

#[derive(Debug, Deserialize)]
struct SynthesizeResponse {
    /// Base64-encoded 16-bit LE mono PCM
    audio: String,
    /// Rate the provider actually rendered at
    sample_rate: u32,
}

/// HTTP text-to-speech client
pub struct TtsClient {
    client: Client,
    config: TtsConfig,
}

impl TtsClient {
    pub fn new(config: TtsConfig) -> std::result::Result<Self, SpeechError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SpeechError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl TextToSpeech for TtsClient {
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        target_sample_rate: u32,
    ) -> Result<SynthesizedAudio> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SpeechError::EmptyText.into());
        }

        let voice = resolve_voice(voice, &self.config.default_voice);
        let body = SynthesizeRequest {
            text,
            voice,
            sample_rate: target_sample_rate,
        };

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Speech(format!("TTS request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Speech(format!("TTS HTTP {}: {}", status, body)));
        }

        let parsed: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| Error::Speech(format!("TTS response: {}", e)))?;

        let pcm = BASE64
            .decode(&parsed.audio)
            .map_err(|e| Error::Speech(format!("TTS payload: {}", e)))?;

        tracing::debug!(
            chars = text.len(),
            voice = %voice,
            pcm_bytes = pcm.len(),
            source_rate = parsed.sample_rate,
            "Synthesized speech"
        );

        Ok(SynthesizedAudio {
            pcm,
            sample_rate: parsed.sample_rate,
        })
    }
}
