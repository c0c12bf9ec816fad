//! Carrier WebSocket gateway
//!
//! One connection per call. The socket is split into an outbound writer
//! task fed by a frame channel (the pipeline's only path to the wire) and
//! the inbound loop below, which parses carrier events and dispatches them
//! to the session and turn pipeline.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use voicebot_carrier::{parse_event, CarrierEvent};
use voicebot_core::SampleRate;
use voicebot_knowledge::CallTranscript;
use voicebot_pipeline::{CallSession, PipelineServices, TurnPipeline};

use crate::state::AppState;

/// Query parameters on the carrier connection URL
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub call_id: Option<String>,
}

/// What the inbound loop should do after an event
#[derive(Debug, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Terminate,
}

/// Handle the WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn handle_socket(socket: WebSocket, state: AppState, query: WsQuery) {
    let sample_rate = match query.sample_rate {
        Some(rate) => SampleRate::from_u32(rate).unwrap_or_else(|| {
            tracing::warn!(rate, "Unsupported sample rate, defaulting to 8kHz");
            SampleRate::Hz8000
        }),
        None => SampleRate::Hz8000,
    };
    let call_id = query
        .call_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let session = Arc::new(CallSession::new(&call_id, sample_rate));
    state.registry.insert(Arc::clone(&session));
    tracing::info!(
        call_id = %call_id,
        sample_rate = sample_rate.as_u32(),
        "Carrier stream accepted"
    );

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: the single path from pipeline to wire; frame order on
    // the channel is frame order on the socket.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if ws_tx.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    let pipeline = TurnPipeline::new(
        Arc::clone(&session),
        PipelineServices {
            stt: Arc::clone(&state.stt),
            tts: Arc::clone(&state.tts),
            llm: Arc::clone(&state.llm),
            knowledge: Arc::clone(&state.knowledge),
        },
        state.settings.turn.clone(),
        state.settings.stt.language.clone(),
        state.settings.knowledge.retrieval_top_k,
        out_tx,
    );

    while let Some(message) = ws_rx.next().await {
        match message {
            Ok(Message::Text(text)) => match parse_event(&text) {
                Ok(event) => {
                    if dispatch_event(event, &pipeline).await == Disposition::Terminate {
                        break;
                    }
                }
                Err(e) => {
                    // Protocol violation: log and skip, the call continues
                    tracing::warn!(call_id = %session.call_id, error = %e, "Skipping unparseable frame");
                }
            },
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::warn!(call_id = %session.call_id, error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    // Teardown: cancel in-flight work, deregister, persist the transcript.
    // In-flight provider requests are abandoned; their bodies drain in the
    // background until their own timeouts expire.
    session.close();
    state.registry.remove(&session.call_id);
    record_transcript(&state, &session).await;
    drop(pipeline);
    writer.abort();

    tracing::info!(call_id = %session.call_id, "Session terminated");
}

/// Apply one parsed carrier event to the session and pipeline
pub async fn dispatch_event(event: CarrierEvent, pipeline: &Arc<TurnPipeline>) -> Disposition {
    let session = Arc::clone(pipeline.session());

    match event {
        event @ (CarrierEvent::Connected { .. } | CarrierEvent::Start { .. }) => {
            if let Some(params) = event.custom_parameters() {
                session.merge_custom_parameters(params);
            }
            if let Some(sid) = event.stream_sid() {
                if session.set_stream_sid(sid) {
                    spawn_greeting(pipeline);
                }
            }
            // Rebuild the persona prompt at session start
            let refresh = Arc::clone(pipeline);
            tokio::spawn(async move { refresh.ensure_system_message().await });
        }

        CarrierEvent::Media { stream_sid, media } => {
            if media.is_outbound_echo() {
                return Disposition::Continue;
            }
            // The first media frame may be the first carrier of the sid
            if let Some(sid) = stream_sid {
                if session.set_stream_sid(&sid) {
                    spawn_greeting(pipeline);
                }
            }
            match media.decode() {
                Ok(pcm) => {
                    session.push_inbound(&pcm);
                    pipeline.try_spawn_turn();
                }
                Err(e) => {
                    tracing::warn!(call_id = %session.call_id, error = %e, "Dropping bad media payload");
                }
            }
        }

        CarrierEvent::Stop { stop } => {
            let reason = stop.and_then(|s| s.reason);
            tracing::info!(call_id = %session.call_id, reason = ?reason, "Stop received");
            // Flush whatever audio is still buffered, then terminate
            pipeline.flush_residual().await;
            return Disposition::Terminate;
        }

        CarrierEvent::Mark { mark } => {
            tracing::debug!(
                call_id = %session.call_id,
                mark = ?mark.map(|m| m.name),
                "Mark acknowledged by carrier"
            );
        }

        CarrierEvent::Clear => {
            tracing::info!(call_id = %session.call_id, "Barge-in requested");
            session.request_barge_in();
        }

        CarrierEvent::Unknown => {
            tracing::warn!(call_id = %session.call_id, "Skipping unknown event");
        }
    }

    Disposition::Continue
}

/// Greeting runs once, on whichever event first pinned the stream sid
fn spawn_greeting(pipeline: &Arc<TurnPipeline>) {
    let pipeline = Arc::clone(pipeline);
    tokio::spawn(async move { pipeline.send_greeting().await });
}

async fn record_transcript(state: &AppState, session: &Arc<CallSession>) {
    let turns = session.history_turns();
    if turns.is_empty() {
        return;
    }
    let transcript = CallTranscript {
        call_id: session.call_id.clone(),
        direction: session
            .custom_parameter("direction")
            .unwrap_or_else(|| "inbound".to_string()),
        turns,
        duration_secs: session.age().as_secs(),
        status: "completed".to_string(),
    };
    if let Err(e) = state.transcripts.record(transcript).await {
        tracing::warn!(call_id = %session.call_id, error = %e, "Transcript persistence failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use voicebot_carrier::encode_payload;
    use voicebot_config::{KnowledgeConfig, TurnConfig};
    use voicebot_core::{
        LanguageModel, Result, SpeechToText, SynthesizedAudio, TextToSpeech, TokenDelta,
    };
    use voicebot_knowledge::{InMemoryDocumentStore, InMemoryPersonaStore, KnowledgeService};

    struct NullStt;
    #[async_trait]
    impl SpeechToText for NullStt {
        async fn transcribe(&self, _: &[u8], _: u32, _: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    struct NullTts;
    #[async_trait]
    impl TextToSpeech for NullTts {
        async fn synthesize(&self, _: &str, _: Option<&str>, _: u32) -> Result<SynthesizedAudio> {
            Ok(SynthesizedAudio {
                pcm: vec![0u8; 3200],
                sample_rate: 8000,
            })
        }
    }

    struct NullLlm;
    #[async_trait]
    impl LanguageModel for NullLlm {
        async fn stream_reply(
            &self,
            _: &str,
            tx: tokio::sync::mpsc::Sender<TokenDelta>,
        ) -> Result<Option<String>> {
            let _ = tx.send(TokenDelta::complete()).await;
            Ok(None)
        }
    }

    fn pipeline() -> (Arc<TurnPipeline>, mpsc::Receiver<String>) {
        let session = Arc::new(CallSession::new("CA-test", SampleRate::Hz8000));
        let knowledge = Arc::new(KnowledgeService::new(
            Arc::new(InMemoryPersonaStore::new()),
            Arc::new(InMemoryDocumentStore::new()),
            KnowledgeConfig::default(),
        ));
        let (out_tx, out_rx) = mpsc::channel(64);
        let pipeline = TurnPipeline::new(
            session,
            PipelineServices {
                stt: Arc::new(NullStt),
                tts: Arc::new(NullTts),
                llm: Arc::new(NullLlm),
                knowledge,
            },
            TurnConfig::default(),
            "en".to_string(),
            3,
            out_tx,
        );
        (pipeline, out_rx)
    }

    #[tokio::test]
    async fn test_outbound_echo_discarded() {
        let (pipeline, _rx) = pipeline();
        let session = Arc::clone(pipeline.session());
        session.set_stream_sid("S1");

        let event = CarrierEvent::Media {
            stream_sid: Some("S1".to_string()),
            media: voicebot_carrier::MediaPayload {
                payload: encode_payload(&[1u8; 640]),
                track: Some("outbound".to_string()),
            },
        };

        assert_eq!(dispatch_event(event, &pipeline).await, Disposition::Continue);
        assert_eq!(session.inbound_len(), 0, "echo must not enter the buffer");
    }

    #[tokio::test]
    async fn test_inbound_media_buffers() {
        let (pipeline, _rx) = pipeline();
        let session = Arc::clone(pipeline.session());
        session.set_stream_sid("S1");

        let event = CarrierEvent::Media {
            stream_sid: None,
            media: voicebot_carrier::MediaPayload {
                payload: encode_payload(&[1u8; 640]),
                track: Some("inbound".to_string()),
            },
        };

        dispatch_event(event, &pipeline).await;
        assert_eq!(session.inbound_len(), 640);
    }

    #[tokio::test]
    async fn test_clear_sets_barge_in() {
        let (pipeline, _rx) = pipeline();
        dispatch_event(CarrierEvent::Clear, &pipeline).await;
        assert!(pipeline.session().barge_in_pending());
    }

    #[tokio::test]
    async fn test_stop_terminates() {
        let (pipeline, _rx) = pipeline();
        let disposition = dispatch_event(CarrierEvent::Stop { stop: None }, &pipeline).await;
        assert_eq!(disposition, Disposition::Terminate);
    }

    #[tokio::test]
    async fn test_start_merges_params_and_pins_sid() {
        let (pipeline, _rx) = pipeline();
        let session = Arc::clone(pipeline.session());

        let mut params = HashMap::new();
        params.insert("voice".to_string(), "nova".to_string());
        let event = CarrierEvent::Start {
            stream_sid: Some("S9".to_string()),
            start: Some(voicebot_carrier::StartPayload {
                stream_sid: None,
                call_sid: None,
                custom_parameters: Some(params),
            }),
        };

        dispatch_event(event, &pipeline).await;
        assert_eq!(session.stream_sid().as_deref(), Some("S9"));
        assert_eq!(session.custom_parameter("voice").as_deref(), Some("nova"));
    }
}
