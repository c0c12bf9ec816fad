//! Default values for tunables
//!
//! The silence-gate numbers are empirical; they are defaults here rather
//! than hard-coded in the pipeline so deployments can adjust them.

/// Samples with absolute amplitude above this count as voiced (out of 32767)
pub const SILENCE_AMPLITUDE_THRESHOLD: i16 = 100;

/// Minimum voiced-sample ratio for a buffer to reach STT
pub const MIN_VOICED_RATIO: f32 = 0.05;

/// Token buffer: flush once the buffer exceeds this many characters...
pub const FLUSH_MIN_CHARS: usize = 50;

/// ...and holds at least this many words
pub const FLUSH_MIN_WORDS: usize = 8;

/// Length-based flushes cut at the last space before this character position
pub const FLUSH_HARD_LIMIT_CHARS: usize = 100;

/// Assistant replies are truncated to this many characters
pub const REPLY_MAX_CHARS: usize = 300;

/// Non-system turns included in the linearized prompt
pub const HISTORY_WINDOW: usize = 10;

/// Pause between outbound media chunks, to pace the carrier
pub const CHUNK_PACING_MS: u64 = 10;

/// Persona cache lifetime
pub const PERSONA_CACHE_TTL_SECS: u64 = 300;

/// Knowledge-chunk cache lifetime
pub const CHUNK_CACHE_TTL_SECS: u64 = 600;

/// Target knowledge chunk size in characters
pub const CHUNK_TARGET_CHARS: usize = 1000;

/// Overlap between consecutive knowledge chunks
pub const CHUNK_OVERLAP_CHARS: usize = 200;

/// Knowledge chunks retrieved per turn
pub const RETRIEVAL_TOP_K: usize = 3;

/// STT/TTS request deadline
pub const SPEECH_TIMEOUT_SECS: u64 = 30;

/// LLM deadline for initial response headers; the stream itself is unbounded
pub const LLM_INITIAL_RESPONSE_TIMEOUT_SECS: u64 = 10;

/// Sessions with no inbound media for this long are reaped
pub const SESSION_IDLE_TIMEOUT_SECS: u64 = 600;

/// Maximum accepted knowledge document size
pub const MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

/// Greeting used when neither custom parameters nor the environment supply one
pub const FALLBACK_GREETING: &str = "Hello! How can I help you today?";

/// Persona seeded into an empty store on first load
pub const FALLBACK_PERSONA: &str = "You are a friendly and concise voice assistant. \
Answer briefly, in one or two short sentences, as if speaking on a phone call. \
If you do not know something, say so plainly.";
