//! Shared application state

use std::sync::Arc;

use voicebot_config::Settings;
use voicebot_core::{LanguageModel, SpeechToText, TextToSpeech};
use voicebot_knowledge::{KnowledgeService, TranscriptStore};

use crate::registry::SessionRegistry;

/// Process-wide state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<SessionRegistry>,
    pub knowledge: Arc<KnowledgeService>,
    pub transcripts: Arc<dyn TranscriptStore>,
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub llm: Arc<dyn LanguageModel>,
    /// Client for the carrier REST API
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        stt: Arc<dyn SpeechToText>,
        tts: Arc<dyn TextToSpeech>,
        llm: Arc<dyn LanguageModel>,
        knowledge: Arc<KnowledgeService>,
        transcripts: Arc<dyn TranscriptStore>,
    ) -> Self {
        Self {
            settings,
            registry: Arc::new(SessionRegistry::new()),
            knowledge,
            transcripts,
            stt,
            tts,
            llm,
            http: reqwest::Client::new(),
        }
    }
}
