//! Knowledge service: stores plus in-process caches
//!
//! Caches are timestamped snapshots guarded by `parking_lot::RwLock`;
//! invalidation is a single `None` store. Cache writes only happen on admin
//! mutations and cache reads never touch the store inside the TTL, so the
//! per-turn hot path stays off the database.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use voicebot_config::{constants, KnowledgeConfig};

use crate::chunker::chunk_text;
use crate::retriever::rank_chunks;
use crate::store::{DocumentStore, KnowledgeDocument, PersonaRecord, PersonaStore};
use crate::KnowledgeError;

/// Persona and knowledge retrieval facade used by the turn pipeline
pub struct KnowledgeService {
    personas: Arc<dyn PersonaStore>,
    documents: Arc<dyn DocumentStore>,
    config: KnowledgeConfig,
    persona_cache: RwLock<HashMap<String, (Instant, String)>>,
    chunk_cache: RwLock<Option<(Instant, Arc<Vec<String>>)>>,
}

impl KnowledgeService {
    pub fn new(
        personas: Arc<dyn PersonaStore>,
        documents: Arc<dyn DocumentStore>,
        config: KnowledgeConfig,
    ) -> Self {
        Self {
            personas,
            documents,
            config,
            persona_cache: RwLock::new(HashMap::new()),
            chunk_cache: RwLock::new(None),
        }
    }

    /// Fetch a persona's content, seeding the built-in fallback on first use.
    ///
    /// Store failures fall back to the built-in persona without caching, so
    /// a recovered store is picked up on the next call.
    pub async fn load_persona(&self, name: &str) -> String {
        if let Some((cached_at, content)) = self.persona_cache.read().get(name) {
            if cached_at.elapsed() < self.config.persona_cache_ttl {
                return content.clone();
            }
        }

        let content = match self.personas.get(name).await {
            Ok(Some(record)) => record.content,
            Ok(None) => {
                tracing::info!(persona = %name, "Seeding persona from built-in fallback");
                match self
                    .personas
                    .upsert(name, constants::FALLBACK_PERSONA)
                    .await
                {
                    Ok(record) => record.content,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to seed persona");
                        return constants::FALLBACK_PERSONA.to_string();
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, persona = %name, "Persona fetch failed");
                return constants::FALLBACK_PERSONA.to_string();
            }
        };

        self.persona_cache
            .write()
            .insert(name.to_string(), (Instant::now(), content.clone()));
        content
    }

    /// The stored persona record, without cache interaction
    pub async fn persona_record(
        &self,
        name: &str,
    ) -> Result<Option<PersonaRecord>, KnowledgeError> {
        self.personas.get(name).await
    }

    /// Upsert a persona and invalidate its cache entry
    pub async fn update_persona(
        &self,
        name: &str,
        content: &str,
    ) -> Result<PersonaRecord, KnowledgeError> {
        let record = self.personas.upsert(name, content).await?;
        self.persona_cache.write().remove(name);
        Ok(record)
    }

    /// Chunk and store an uploaded document; invalidates the chunk cache
    pub async fn ingest_document(
        &self,
        filename: &str,
        mimetype: &str,
        content: String,
    ) -> Result<KnowledgeDocument, KnowledgeError> {
        let chunks = chunk_text(
            &content,
            self.config.chunk_target_chars,
            self.config.chunk_overlap_chars,
        );

        let doc = KnowledgeDocument {
            id: uuid::Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            mimetype: mimetype.to_string(),
            content,
            chunks,
            uploaded_at: chrono::Utc::now(),
        };

        self.documents.insert(doc.clone()).await?;
        *self.chunk_cache.write() = None;

        tracing::info!(
            document = %doc.filename,
            chunks = doc.chunks.len(),
            "Ingested knowledge document"
        );
        Ok(doc)
    }

    /// Delete a document; invalidates the chunk cache when something was removed
    pub async fn delete_document(&self, id: &str) -> Result<bool, KnowledgeError> {
        let deleted = self.documents.delete(id).await?;
        if deleted {
            *self.chunk_cache.write() = None;
        }
        Ok(deleted)
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<KnowledgeDocument>, KnowledgeError> {
        self.documents.get(id).await
    }

    pub async fn list_documents(&self) -> Result<Vec<KnowledgeDocument>, KnowledgeError> {
        self.documents.all().await
    }

    /// The flat chunk sequence over all documents, cached with TTL
    async fn chunks(&self) -> Arc<Vec<String>> {
        if let Some((cached_at, chunks)) = self.chunk_cache.read().as_ref() {
            if cached_at.elapsed() < self.config.chunk_cache_ttl {
                return chunks.clone();
            }
        }

        let chunks: Vec<String> = match self.documents.all().await {
            Ok(docs) => docs.into_iter().flat_map(|d| d.chunks).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Chunk rebuild failed, retrieval disabled this turn");
                return Arc::new(Vec::new());
            }
        };

        let chunks = Arc::new(chunks);
        *self.chunk_cache.write() = Some((Instant::now(), chunks.clone()));
        chunks
    }

    /// Top-k knowledge chunks for a query (empty when nothing scores)
    pub async fn relevant_chunks(&self, query: &str, k: usize) -> Vec<String> {
        let chunks = self.chunks().await;
        rank_chunks(&chunks, query, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryDocumentStore, InMemoryPersonaStore};

    fn service() -> KnowledgeService {
        KnowledgeService::new(
            Arc::new(InMemoryPersonaStore::new()),
            Arc::new(InMemoryDocumentStore::new()),
            KnowledgeConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_persona_seeded_on_first_load() {
        let svc = service();
        let persona = svc.load_persona("default").await;
        assert_eq!(persona, constants::FALLBACK_PERSONA);

        // Seeded record is now persisted
        let record = svc.personas.get("default").await.unwrap().unwrap();
        assert_eq!(record.content, constants::FALLBACK_PERSONA);
    }

    #[tokio::test]
    async fn test_update_invalidates_persona_cache() {
        let svc = service();
        let _ = svc.load_persona("default").await; // warm the cache

        svc.update_persona("default", "You are Priya from support.")
            .await
            .unwrap();

        let persona = svc.load_persona("default").await;
        assert!(persona.contains("Priya"));
    }

    #[tokio::test]
    async fn test_document_write_invalidates_chunk_cache() {
        let svc = service();
        assert!(svc.relevant_chunks("whatsapp pricing", 3).await.is_empty());

        let doc = svc
            .ingest_document(
                "pricing.md",
                "text/markdown",
                "WhatsApp bulk messaging pricing: Rs 0.30 per message.".to_string(),
            )
            .await
            .unwrap();

        let top = svc.relevant_chunks("whatsapp pricing", 3).await;
        assert_eq!(top.len(), 1);
        assert!(top[0].contains("WhatsApp bulk messaging pricing"));

        svc.delete_document(&doc.id).await.unwrap();
        assert!(svc.relevant_chunks("whatsapp pricing", 3).await.is_empty());
    }

    #[tokio::test]
    async fn test_retrieval_ranks_across_documents() {
        let svc = service();
        svc.ingest_document("a.txt", "text/plain", "SMS campaigns and pricing.".to_string())
            .await
            .unwrap();
        svc.ingest_document(
            "b.txt",
            "text/plain",
            "whatsapp pricing is volume based.".to_string(),
        )
        .await
        .unwrap();

        let top = svc.relevant_chunks("whatsapp pricing", 1).await;
        assert_eq!(top.len(), 1);
        assert!(top[0].contains("whatsapp"));
    }
}
