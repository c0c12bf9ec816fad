//! Core types for the voicebot
//!
//! This crate provides the foundational pieces used across all other crates:
//! - Audio codec helpers (PCM/WAV framing, resampling, chunking)
//! - Conversation history types
//! - Service traits for pluggable STT/TTS/LLM backends
//! - Error types

pub mod audio;
pub mod conversation;
pub mod error;
pub mod traits;

pub use audio::SampleRate;
pub use conversation::{ConversationHistory, Turn, TurnRole};
pub use error::{Error, Result};
pub use traits::{LanguageModel, SpeechToText, SynthesizedAudio, TextToSpeech, TokenDelta};
