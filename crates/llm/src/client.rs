//! Streaming LLM client
//!
//! Talks to the provider's server-sent-events endpoint. SSE frames arrive on
//! arbitrary byte boundaries, so bytes are accumulated and split on newlines
//! with the tail kept for the next read; a `data:` line that fails to parse
//! is a split frame and is skipped silently.
//!
//! The configured deadline covers initial response headers only. The stream
//! itself is bounded by the provider's token limit and finish reason.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use voicebot_core::{LanguageModel, Result, TokenDelta};
use voicebot_config::LlmConfig;

use crate::LlmError;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "topK")]
    top_k: u32,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<StreamCandidate>,
}

#[derive(Debug, Deserialize)]
struct StreamCandidate {
    #[serde(default)]
    content: Option<StreamContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamContent {
    #[serde(default)]
    parts: Vec<StreamPart>,
}

#[derive(Debug, Deserialize)]
struct StreamPart {
    #[serde(default)]
    text: String,
}

/// Accumulates stream bytes and yields complete lines.
///
/// SSE frames can be split mid-line across reads; the unterminated tail
/// stays buffered until the next push.
#[derive(Default)]
struct SseLineBuffer {
    buf: String,
}

impl SseLineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(bytes));

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }
}

/// Streaming SSE language-model client
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> std::result::Result<Self, LlmError> {
        // No total timeout on the client: the SSE stream may be long-lived.
        let client = Client::builder()
            .connect_timeout(config.initial_response_timeout)
            .build()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn build_request<'a>(&self, prompt: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
                top_p: self.config.top_p,
                top_k: self.config.top_k,
            },
        }
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn stream_reply(
        &self,
        prompt: &str,
        tx: mpsc::Sender<TokenDelta>,
    ) -> Result<Option<String>> {
        let body = self.build_request(prompt);

        let mut request = self.client.post(&self.config.stream_endpoint).json(&body);
        if let Some(ref key) = self.config.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response =
            tokio::time::timeout(self.config.initial_response_timeout, request.send())
                .await
                .map_err(|_| LlmError::Timeout)?
                .map_err(LlmError::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, text)).into());
        }

        let mut stream = response.bytes_stream();
        let mut lines = SseLineBuffer::default();
        let mut full = String::new();
        let mut completed = false;

        'read: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::Network(e.to_string()))?;

            for line in lines.push(&chunk) {
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data.is_empty() || data == "[DONE]" {
                    continue;
                }

                // Split frames arrive as unparseable JSON; skip silently
                let Ok(parsed) = serde_json::from_str::<StreamChunk>(data) else {
                    continue;
                };
                let Some(candidate) = parsed.candidates.into_iter().next() else {
                    continue;
                };

                if let Some(content) = candidate.content {
                    for part in content.parts {
                        if part.text.is_empty() {
                            continue;
                        }
                        full.push_str(&part.text);
                        if tx.send(TokenDelta::text(part.text)).await.is_err() {
                            // Receiver dropped: generation cancelled mid-turn
                            tracing::debug!("LLM delta receiver dropped, cancelling stream");
                            return Ok(non_empty(full));
                        }
                    }
                }

                if candidate.finish_reason.is_some() {
                    completed = true;
                    let _ = tx.send(TokenDelta::complete()).await;
                    break 'read;
                }
            }
        }

        if !completed {
            let _ = tx.send(TokenDelta::complete()).await;
        }

        Ok(non_empty(full))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_buffer_handles_split_frames() {
        let mut buf = SseLineBuffer::default();

        assert!(buf.push(b"data: {\"cand").is_empty());
        let lines = buf.push(b"idates\":[]}\r\ndata: [DONE]\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "data: {\"candidates\":[]}");
        assert_eq!(lines[1], "data: [DONE]");
    }

    #[test]
    fn test_line_buffer_keeps_tail() {
        let mut buf = SseLineBuffer::default();
        buf.push(b"data: partial");
        let lines = buf.push(b" end\n");
        assert_eq!(lines, vec!["data: partial end"]);
    }

    #[test]
    fn test_chunk_parsing() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"Hello"},{"text":" there"}]}}]}"#;
        let parsed: StreamChunk = serde_json::from_str(raw).unwrap();
        let candidate = &parsed.candidates[0];
        let texts: Vec<&str> = candidate
            .content
            .as_ref()
            .unwrap()
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect();
        assert_eq!(texts, vec!["Hello", " there"]);
        assert!(candidate.finish_reason.is_none());
    }

    #[test]
    fn test_finish_reason_parsed() {
        let raw = r#"{"candidates":[{"content":{"parts":[]},"finishReason":"STOP"}]}"#;
        let parsed: StreamChunk = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.candidates[0].finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_malformed_chunk_rejected() {
        assert!(serde_json::from_str::<StreamChunk>(r#"{"candidates":[{"#).is_err());
    }

    #[test]
    fn test_generation_config_wire_names() {
        let client = LlmClient::new(LlmConfig::default()).unwrap();
        let json = serde_json::to_string(&client.build_request("hi")).unwrap();
        assert!(json.contains("\"maxOutputTokens\":150"));
        assert!(json.contains("\"topK\":40"));
        assert!(json.contains("\"topP\":1.0") || json.contains("\"topP\":1"));
        assert!(json.contains("\"temperature\":0.7"));
    }
}
