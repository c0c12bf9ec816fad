//! Persona and knowledge-base store
//!
//! Persona documents feed the system prompt; knowledge documents are chunked
//! on ingest and retrieved per turn with a deterministic keyword scorer.
//! Both sides are cached in-process with TTL snapshots that any admin write
//! invalidates.

pub mod chunker;
pub mod retriever;
pub mod service;
pub mod store;

pub use chunker::chunk_text;
pub use retriever::rank_chunks;
pub use service::KnowledgeService;
pub use store::{
    CallTranscript, DocumentStore, DocumentSummary, InMemoryDocumentStore, InMemoryPersonaStore,
    InMemoryTranscriptStore, KnowledgeDocument, PersonaRecord, PersonaStore, TranscriptStore,
};

use thiserror::Error;

/// Knowledge store errors
#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<KnowledgeError> for voicebot_core::Error {
    fn from(err: KnowledgeError) -> Self {
        voicebot_core::Error::Knowledge(err.to_string())
    }
}
