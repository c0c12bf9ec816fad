//! Persona and knowledge-document admin endpoints
//!
//! Thin JSON layer over the knowledge service. Uploads accept text and
//! markdown read as UTF-8; binary formats whose text extraction lives
//! outside this service are rejected with 415.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use voicebot_config::constants;
use voicebot_knowledge::{DocumentSummary, PersonaRecord};

use crate::state::AppState;

fn persona_json(record: &PersonaRecord) -> Value {
    json!({
        "id": record.id,
        "name": record.name,
        "content": record.content,
        "content_length": record.content.len(),
        "created_at": record.created_at,
        "updated_at": record.updated_at,
    })
}

/// GET /api/persona
pub async fn get_persona(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    // Seeds the fallback persona on a fresh store
    let _ = state.knowledge.load_persona("default").await;

    match state.knowledge.persona_record("default").await {
        Ok(Some(record)) => (StatusCode::OK, Json(persona_json(&record))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "persona not found" })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePersonaRequest {
    #[serde(default = "default_persona_name")]
    pub name: String,
    pub content: String,
}

fn default_persona_name() -> String {
    "default".to_string()
}

/// PUT /api/persona
pub async fn update_persona(
    State(state): State<AppState>,
    Json(request): Json<UpdatePersonaRequest>,
) -> (StatusCode, Json<Value>) {
    if request.content.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "content must not be empty" })),
        );
    }

    match state
        .knowledge
        .update_persona(&request.name, &request.content)
        .await
    {
        Ok(record) => {
            tracing::info!(persona = %record.name, bytes = record.content.len(), "Persona updated");
            (StatusCode::OK, Json(persona_json(&record)))
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

/// Mimetypes whose content we read directly as UTF-8
fn is_text_mimetype(mimetype: &str, filename: &str) -> bool {
    mimetype.starts_with("text/")
        || filename.ends_with(".md")
        || filename.ends_with(".txt")
        || filename.ends_with(".markdown")
}

/// POST /api/documents (multipart, field `file`)
pub async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("document.txt").to_string();
        let mimetype = field
            .content_type()
            .unwrap_or("text/plain")
            .to_string();

        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": format!("upload read failed: {}", e) })),
                )
            }
        };

        if data.len() > constants::MAX_DOCUMENT_BYTES {
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({ "error": "document exceeds 10 MB" })),
            );
        }

        if !is_text_mimetype(&mimetype, &filename) {
            return (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                Json(json!({
                    "error": format!("text extraction for {} is not available here", mimetype),
                })),
            );
        }

        let content = String::from_utf8_lossy(&data).into_owned();
        if content.trim().is_empty() {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "document is empty" })),
            );
        }

        return match state
            .knowledge
            .ingest_document(&filename, &mimetype, content)
            .await
        {
            Ok(doc) => (
                StatusCode::CREATED,
                Json(json!(DocumentSummary::from(&doc))),
            ),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            ),
        };
    }

    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "multipart field `file` is required" })),
    )
}

/// GET /api/documents
pub async fn list_documents(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.knowledge.list_documents().await {
        Ok(docs) => {
            let summaries: Vec<DocumentSummary> = docs.iter().map(DocumentSummary::from).collect();
            (
                StatusCode::OK,
                Json(json!({ "documents": summaries, "count": summaries.len() })),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

/// GET /api/documents/:id
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.knowledge.get_document(&id).await {
        Ok(Some(doc)) => (StatusCode::OK, Json(json!(doc))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "document not found" })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

/// DELETE /api/documents/:id
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> StatusCode {
    match state.knowledge.delete_document(&id).await {
        Ok(true) => StatusCode::NO_CONTENT,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => {
            tracing::warn!(document = %id, error = %e, "Document delete failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
