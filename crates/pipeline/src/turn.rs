//! The per-turn pipeline
//!
//! A turn runs as three stages with no shared locks on the hot path:
//!
//! 1. an LLM producer task pushing deltas onto a channel,
//! 2. the token-buffer loop draining it and enqueuing sentence fragments,
//! 3. a single writer task consuming the fragment queue in FIFO order,
//!    synthesizing each fragment and streaming paced media frames.
//!
//! Barge-in is polled at every chunk boundary, between fragments, and before
//! each flush; `stop`/socket-close is observed through the closed outbound
//! channel.

use std::sync::Arc;
use tokio::sync::mpsc;

use voicebot_carrier::{encode_payload, media_frame, mark_frame, REPLY_DONE_MARK};
use voicebot_config::{constants, TurnConfig};
use voicebot_core::{audio, Error, LanguageModel, SpeechToText, TextToSpeech, TurnRole};
use voicebot_knowledge::KnowledgeService;
use voicebot_llm::prompt;

use crate::session::CallSession;
use crate::text;

/// External services a turn needs
#[derive(Clone)]
pub struct PipelineServices {
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub llm: Arc<dyn LanguageModel>,
    pub knowledge: Arc<KnowledgeService>,
}

/// One fragment queued for synthesis
struct TtsJob {
    text: String,
    /// The final job of a turn additionally emits the reply-done mark
    is_final: bool,
}

/// Orchestrates turns for one session
pub struct TurnPipeline {
    session: Arc<CallSession>,
    services: PipelineServices,
    config: TurnConfig,
    /// Transcription language when the caller did not specify one
    default_language: String,
    retrieval_top_k: usize,
    /// Serialized frames destined for the carrier socket
    out_tx: mpsc::Sender<String>,
}

impl TurnPipeline {
    pub fn new(
        session: Arc<CallSession>,
        services: PipelineServices,
        config: TurnConfig,
        default_language: String,
        retrieval_top_k: usize,
        out_tx: mpsc::Sender<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            session,
            services,
            config,
            default_language,
            retrieval_top_k,
            out_tx,
        })
    }

    pub fn session(&self) -> &Arc<CallSession> {
        &self.session
    }

    fn language(&self) -> String {
        self.session
            .custom_parameter("language")
            .unwrap_or_else(|| self.default_language.clone())
    }

    fn voice(&self) -> Option<String> {
        self.session.custom_parameter("voice")
    }

    /// Spawn a turn when the inbound buffer has crossed the threshold
    pub fn try_spawn_turn(self: &Arc<Self>) {
        if !self.session.should_trigger_turn() {
            return;
        }
        if !self.session.begin_turn() {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_turn().await;
            this.session.end_turn();
        });
    }

    /// Run one turn over whatever is buffered, regardless of the threshold.
    /// Used for the residual flush on `stop`. No-op when a turn is in flight.
    pub async fn flush_residual(&self) {
        if !self.session.begin_turn() {
            return;
        }
        self.run_turn().await;
        self.session.end_turn();
    }

    /// Install or refresh the persona system prompt for this session
    pub async fn ensure_system_message(&self) {
        let params = self.session.custom_parameters_snapshot();
        let system = if params.is_empty() {
            self.services.knowledge.load_persona("default").await
        } else {
            prompt::build_system_prompt(&params)
        };
        self.session.set_system_message(system);
    }

    async fn run_turn(&self) {
        let pcm = self.session.take_inbound();

        // A pending barge-in consumes this turn: the buffered audio belongs
        // to the interruption, not a fresh utterance.
        if self.session.clear_barge_in() {
            tracing::debug!(call_id = %self.session.call_id, "Turn aborted by pending barge-in");
            return;
        }
        if pcm.is_empty() {
            return;
        }

        let ratio = audio::voiced_ratio(&pcm, self.config.silence_amplitude);
        if ratio < self.config.min_voiced_ratio {
            tracing::debug!(
                call_id = %self.session.call_id,
                voiced_ratio = ratio,
                "Silence gate: skipping turn"
            );
            return;
        }

        let user_text = match self
            .services
            .stt
            .transcribe(&pcm, self.session.sample_rate.as_u32(), &self.language())
            .await
        {
            Ok(Some(text)) => text,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(call_id = %self.session.call_id, error = %e, "STT failed, skipping turn");
                return;
            }
        };

        tracing::info!(call_id = %self.session.call_id, text = %user_text, "Transcribed utterance");

        self.session.push_user(&user_text);
        self.ensure_system_message().await;

        let chunks = self
            .services
            .knowledge
            .relevant_chunks(&user_text, self.retrieval_top_k)
            .await;
        let context = prompt::context_block(&chunks);

        let prompt_text = {
            let history = self.session.history_snapshot();
            let system = history.system_text().unwrap_or_default().to_string();
            let recent = history.recent_dialogue(self.config.history_window);
            // The current utterance was just appended; it terminates the
            // prompt explicitly rather than appearing in the window.
            let prior = match recent.last() {
                Some(turn) if turn.role == TurnRole::User && turn.text == user_text => {
                    &recent[..recent.len() - 1]
                }
                _ => &recent[..],
            };
            prompt::build_turn_prompt(&system, context.as_deref(), prior, &user_text)
        };

        if let Some(reply) = self.stream_reply_to_carrier(&prompt_text).await {
            let reply = text::postprocess_reply(&reply, self.config.reply_max_chars);
            if !reply.is_empty() {
                self.session.push_assistant(reply);
            }
        }
    }

    /// Stream the LLM reply out as ordered TTS fragments.
    ///
    /// Returns the full accumulated reply text (also on cancellation), or
    /// `None` when the provider failed or produced nothing.
    async fn stream_reply_to_carrier(&self, prompt_text: &str) -> Option<String> {
        let (tok_tx, mut tok_rx) = mpsc::channel(64);
        let llm = Arc::clone(&self.services.llm);
        let prompt_owned = prompt_text.to_string();
        let llm_task =
            tokio::spawn(async move { llm.stream_reply(&prompt_owned, tok_tx).await });

        let (job_tx, job_rx) = mpsc::channel::<TtsJob>(16);
        let writer = self.spawn_writer(job_rx);

        let mut buffer = String::new();
        let mut aborted = false;

        while let Some(delta) = tok_rx.recv().await {
            if self.session.barge_in_pending() {
                aborted = true;
                break;
            }

            if delta.is_complete {
                let tail = buffer.trim().to_string();
                buffer.clear();
                let _ = job_tx.send(TtsJob { text: tail, is_final: true }).await;
                break;
            }

            buffer.push_str(&delta.text);
            while let Some(cut) = text::flush_boundary(
                &buffer,
                self.config.flush_min_chars,
                self.config.flush_min_words,
                self.config.flush_hard_limit_chars,
            ) {
                let fragment = buffer[..cut].trim().to_string();
                buffer = buffer[cut..].trim_start().to_string();
                if fragment.is_empty() {
                    continue;
                }
                if self.session.barge_in_pending() {
                    aborted = true;
                    break;
                }
                if job_tx
                    .send(TtsJob { text: fragment, is_final: false })
                    .await
                    .is_err()
                {
                    aborted = true;
                    break;
                }
            }
            if aborted {
                break;
            }
        }

        if aborted {
            buffer.clear();
        }

        // Dropping the receiver cancels a still-running LLM stream; closing
        // the job queue lets the writer drain and exit.
        drop(tok_rx);
        drop(job_tx);
        let _ = writer.await;

        match llm_task.await {
            Ok(Ok(full)) => full,
            Ok(Err(e)) => {
                tracing::warn!(call_id = %self.session.call_id, error = %e, "LLM stream failed");
                None
            }
            Err(e) => {
                tracing::warn!(call_id = %self.session.call_id, error = %e, "LLM task panicked");
                None
            }
        }
    }

    /// The single writer task: strict FIFO over enqueued fragments
    fn spawn_writer(&self, mut job_rx: mpsc::Receiver<TtsJob>) -> tokio::task::JoinHandle<()> {
        let session = Arc::clone(&self.session);
        let tts = Arc::clone(&self.services.tts);
        let out_tx = self.out_tx.clone();
        let config = self.config.clone();
        let voice = self.voice();

        tokio::spawn(async move {
            let mut halted = false;
            while let Some(job) = job_rx.recv().await {
                if halted || session.barge_in_pending() || out_tx.is_closed() {
                    // Drain without streaming; the final mark is suppressed
                    halted = true;
                    continue;
                }

                if !job.text.is_empty() {
                    match stream_fragment(&session, &tts, &out_tx, &config, voice.as_deref(), &job.text)
                        .await
                    {
                        Ok(true) => {}
                        Ok(false) => halted = true,
                        Err(e) => {
                            tracing::warn!(
                                call_id = %session.call_id,
                                error = %e,
                                "Fragment synthesis failed, aborting reply audio"
                            );
                            halted = true;
                        }
                    }
                }

                if job.is_final && !halted {
                    if let Some(sid) = session.stream_sid() {
                        let _ = out_tx.send(mark_frame(&sid, REPLY_DONE_MARK)).await;
                    }
                }
            }
        })
    }

    /// Greeting flow, run once the stream sid is first known
    pub async fn send_greeting(&self) {
        if !self.session.greeting_begin() {
            return;
        }

        let greeting = greeting_text(
            self.session.custom_parameter("greeting"),
            self.config.greeting_text.clone(),
        );
        let sequences_before = self.session.sequence_count();

        match stream_fragment(
            &self.session,
            &self.services.tts,
            &self.out_tx,
            &self.config,
            self.voice().as_deref(),
            &greeting,
        )
        .await
        {
            Ok(true) => {
                if let Some(sid) = self.session.stream_sid() {
                    let _ = self.out_tx.send(mark_frame(&sid, REPLY_DONE_MARK)).await;
                }
                self.session.greeting_done();
                tracing::info!(call_id = %self.session.call_id, "Greeting sent");
            }
            Ok(false) => {
                // Preempted mid-stream; do not repeat the greeting
                self.session.greeting_done();
            }
            Err(e) => {
                tracing::warn!(call_id = %self.session.call_id, error = %e, "Greeting failed");
                if self.session.sequence_count() == sequences_before {
                    self.session.greeting_revert();
                } else {
                    self.session.greeting_done();
                }
                // Keep the carrier from dropping a silent call
                self.stream_keepalive_silence(1000).await;
            }
        }
    }

    /// Stream zeros as a keepalive after a failed greeting
    async fn stream_keepalive_silence(&self, duration_ms: u64) {
        let Some(sid) = self.session.stream_sid() else { return };
        let pcm = audio::silence(self.session.sample_rate.as_u32(), duration_ms);
        if let Err(e) = stream_pcm(&self.session, &self.out_tx, &self.config, &sid, &pcm).await {
            tracing::debug!(call_id = %self.session.call_id, error = %e, "Keepalive failed");
        }
    }
}

/// Resolve the greeting text: custom parameter, environment default, literal
/// fallback; strip a `GREETING_TEXT=` prefix and surrounding quotes.
fn greeting_text(custom: Option<String>, configured: Option<String>) -> String {
    let raw = custom
        .or(configured)
        .unwrap_or_else(|| constants::FALLBACK_GREETING.to_string());
    normalize_greeting(&raw)
}

/// Strip a `GREETING_TEXT=` prefix and one layer of surrounding quotes
pub(crate) fn normalize_greeting(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("GREETING_TEXT=") {
        text = rest.trim();
    }
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            text = text[1..text.len() - 1].trim();
        }
    }
    text.to_string()
}

/// Synthesize one fragment and stream it as paced media frames.
///
/// Returns `Ok(true)` when every chunk went out, `Ok(false)` when streaming
/// stopped early (barge-in, closed socket, inactive session).
async fn stream_fragment(
    session: &Arc<CallSession>,
    tts: &Arc<dyn TextToSpeech>,
    out_tx: &mpsc::Sender<String>,
    config: &TurnConfig,
    voice: Option<&str>,
    fragment: &str,
) -> Result<bool, Error> {
    let Some(stream_sid) = session.stream_sid() else {
        return Err(Error::Session("stream_sid not yet known".to_string()));
    };

    let session_rate = session.sample_rate.as_u32();
    let synthesized = tts.synthesize(fragment, voice, session_rate).await?;

    let pcm = if synthesized.sample_rate != session_rate {
        audio::resample(&synthesized.pcm, synthesized.sample_rate, session_rate)
    } else {
        synthesized.pcm
    };

    stream_pcm(session, out_tx, config, &stream_sid, &pcm).await
}

/// Stream raw PCM as ordered, paced media frames
async fn stream_pcm(
    session: &Arc<CallSession>,
    out_tx: &mpsc::Sender<String>,
    config: &TurnConfig,
    stream_sid: &str,
    pcm: &[u8],
) -> Result<bool, Error> {
    let chunks = audio::chunk(pcm, session.sample_rate.chunk_size_bytes())?;

    for chunk in chunks {
        if out_tx.is_closed() || session.barge_in_pending() || !session.is_active() {
            return Ok(false);
        }
        let sequence = session.next_sequence();
        let frame = media_frame(stream_sid, sequence, &encode_payload(chunk));
        if out_tx.send(frame).await.is_err() {
            return Ok(false);
        }
        tokio::time::sleep(config.chunk_pacing).await;
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_greeting() {
        assert_eq!(normalize_greeting("Hi."), "Hi.");
        assert_eq!(normalize_greeting("GREETING_TEXT=\"Namaste!\""), "Namaste!");
        assert_eq!(normalize_greeting("'Hello there'"), "Hello there");
        assert_eq!(normalize_greeting("  \"Hi.\"  "), "Hi.");
        // Mismatched quotes are left alone
        assert_eq!(normalize_greeting("\"Hi.'"), "\"Hi.'");
    }

    #[test]
    fn test_greeting_text_precedence() {
        assert_eq!(
            greeting_text(Some("Hi.".into()), Some("env greeting".into())),
            "Hi."
        );
        assert_eq!(
            greeting_text(None, Some("env greeting".into())),
            "env greeting"
        );
        assert_eq!(greeting_text(None, None), constants::FALLBACK_GREETING);
    }
}
