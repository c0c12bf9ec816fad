//! Voicebot server entry point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use voicebot_config::{constants, Settings};
use voicebot_knowledge::{
    InMemoryDocumentStore, InMemoryPersonaStore, InMemoryTranscriptStore, KnowledgeService,
};
use voicebot_llm::LlmClient;
use voicebot_server::{create_router, AppState};
use voicebot_speech::{SttClient, TtsClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let settings = Arc::new(Settings::from_env());
    tracing::info!(
        port = settings.server.port,
        ws_path = %settings.server.ws_path,
        stt_configured = settings.stt.api_key.is_some(),
        tts_configured = settings.tts.api_key.is_some(),
        llm_configured = settings.llm.api_key.is_some(),
        "Configuration loaded"
    );

    if settings.knowledge.database_uri.is_some() {
        // The persistent store backend is deployed as a sidecar service; this
        // build keeps personas and documents in memory.
        tracing::warn!("DATABASE_URI set, but this build uses the in-memory store backend");
    }

    let knowledge = Arc::new(KnowledgeService::new(
        Arc::new(InMemoryPersonaStore::new()),
        Arc::new(InMemoryDocumentStore::new()),
        settings.knowledge.clone(),
    ));

    let stt = Arc::new(SttClient::new(settings.stt.clone())?);
    let tts = Arc::new(TtsClient::new(settings.tts.clone())?);
    let llm = Arc::new(LlmClient::new(settings.llm.clone())?);

    let state = AppState::new(
        Arc::clone(&settings),
        stt,
        tts,
        llm,
        knowledge,
        Arc::new(InMemoryTranscriptStore::new()),
    );

    // Reap sessions whose carrier vanished without a stop event
    let _reaper = state.registry.start_reaper(
        Duration::from_secs(constants::SESSION_IDLE_TIMEOUT_SECS),
        Duration::from_secs(60),
    );

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "voicebot=info,tower_http=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}
