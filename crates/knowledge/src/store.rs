//! Persona, document and transcript stores
//!
//! Storage is behind traits so the backing database stays swappable; the
//! in-memory implementations below are the default and are what the tests
//! run against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use voicebot_core::Turn;

use crate::KnowledgeError;

/// A named persona document; one record is designated "default"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaRecord {
    pub id: String,
    pub name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An uploaded knowledge document with its pre-computed chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub filename: String,
    pub mimetype: String,
    pub content: String,
    pub chunks: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// Listing view of a document, without the content body
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub filename: String,
    pub mimetype: String,
    pub content_length: usize,
    pub chunk_count: usize,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&KnowledgeDocument> for DocumentSummary {
    fn from(doc: &KnowledgeDocument) -> Self {
        Self {
            id: doc.id.clone(),
            filename: doc.filename.clone(),
            mimetype: doc.mimetype.clone(),
            content_length: doc.content.len(),
            chunk_count: doc.chunks.len(),
            uploaded_at: doc.uploaded_at,
        }
    }
}

/// Record of a finished call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTranscript {
    pub call_id: String,
    pub direction: String,
    pub turns: Vec<Turn>,
    pub duration_secs: u64,
    pub status: String,
}

/// Persona persistence
#[async_trait]
pub trait PersonaStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<PersonaRecord>, KnowledgeError>;
    async fn upsert(&self, name: &str, content: &str) -> Result<PersonaRecord, KnowledgeError>;
}

/// Knowledge document persistence
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, doc: KnowledgeDocument) -> Result<(), KnowledgeError>;
    async fn get(&self, id: &str) -> Result<Option<KnowledgeDocument>, KnowledgeError>;
    async fn delete(&self, id: &str) -> Result<bool, KnowledgeError>;
    /// All documents in upload order
    async fn all(&self) -> Result<Vec<KnowledgeDocument>, KnowledgeError>;
}

/// Per-call transcript persistence
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn record(&self, transcript: CallTranscript) -> Result<(), KnowledgeError>;
}

/// In-memory persona store
#[derive(Default)]
pub struct InMemoryPersonaStore {
    records: RwLock<HashMap<String, PersonaRecord>>,
}

impl InMemoryPersonaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersonaStore for InMemoryPersonaStore {
    async fn get(&self, name: &str) -> Result<Option<PersonaRecord>, KnowledgeError> {
        Ok(self.records.read().get(name).cloned())
    }

    async fn upsert(&self, name: &str, content: &str) -> Result<PersonaRecord, KnowledgeError> {
        let now = Utc::now();
        let mut records = self.records.write();
        let record = records
            .entry(name.to_string())
            .and_modify(|r| {
                r.content = content.to_string();
                r.updated_at = now;
            })
            .or_insert_with(|| PersonaRecord {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_string(),
                content: content.to_string(),
                created_at: now,
                updated_at: now,
            });
        Ok(record.clone())
    }
}

/// In-memory document store, kept in upload order
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<Vec<KnowledgeDocument>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(&self, doc: KnowledgeDocument) -> Result<(), KnowledgeError> {
        self.documents.write().push(doc);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<KnowledgeDocument>, KnowledgeError> {
        Ok(self.documents.read().iter().find(|d| d.id == id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool, KnowledgeError> {
        let mut documents = self.documents.write();
        let before = documents.len();
        documents.retain(|d| d.id != id);
        Ok(documents.len() < before)
    }

    async fn all(&self) -> Result<Vec<KnowledgeDocument>, KnowledgeError> {
        Ok(self.documents.read().clone())
    }
}

/// In-memory transcript store holding a bounded recent window
pub struct InMemoryTranscriptStore {
    transcripts: RwLock<Vec<CallTranscript>>,
    capacity: usize,
}

impl Default for InMemoryTranscriptStore {
    fn default() -> Self {
        Self {
            transcripts: RwLock::new(Vec::new()),
            capacity: 100,
        }
    }
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recent(&self) -> Vec<CallTranscript> {
        self.transcripts.read().clone()
    }
}

#[async_trait]
impl TranscriptStore for InMemoryTranscriptStore {
    async fn record(&self, transcript: CallTranscript) -> Result<(), KnowledgeError> {
        let mut transcripts = self.transcripts.write();
        if transcripts.len() >= self.capacity {
            transcripts.remove(0);
        }
        transcripts.push(transcript);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_persona_upsert_preserves_identity() {
        let store = InMemoryPersonaStore::new();

        let first = store.upsert("default", "v1").await.unwrap();
        let second = store.upsert("default", "v2").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.content, "v2");
        assert!(second.updated_at >= first.created_at);

        let loaded = store.get("default").await.unwrap().unwrap();
        assert_eq!(loaded.content, "v2");
    }

    #[tokio::test]
    async fn test_document_lifecycle() {
        let store = InMemoryDocumentStore::new();
        let doc = KnowledgeDocument {
            id: "d1".to_string(),
            filename: "faq.md".to_string(),
            mimetype: "text/markdown".to_string(),
            content: "body".to_string(),
            chunks: vec!["body".to_string()],
            uploaded_at: Utc::now(),
        };

        store.insert(doc).await.unwrap();
        assert!(store.get("d1").await.unwrap().is_some());
        assert_eq!(store.all().await.unwrap().len(), 1);

        assert!(store.delete("d1").await.unwrap());
        assert!(!store.delete("d1").await.unwrap());
        assert!(store.get("d1").await.unwrap().is_none());
    }
}
