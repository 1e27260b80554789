mod audio;
mod config;
mod errors;
mod interview;
mod leveling;
mod models;
mod performance;
mod question_client;
mod routes;
mod state;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::audio::AudioBackends;
use crate::config::Config;
use crate::interview::InterviewRegistry;
use crate::performance::store::{JsonFileProfileStore, RedisProfileStore};
use crate::performance::ProfileStore;
use crate::question_client::{HttpQuestionService, QuestionService};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting interview coach v{}", env!("CARGO_PKG_VERSION"));

    // Question service
    let questions: Arc<dyn QuestionService> = Arc::new(
        HttpQuestionService::new(
            &config.question_service_url,
            config.question_service_timeout,
            config.question_service_max_retries,
        )
        .context("Failed to build question service client")?,
    );
    info!("Question service client initialized ({})", config.question_service_url);

    // Profile store
    let profiles: Arc<dyn ProfileStore> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str()).context("Invalid REDIS_URL")?;
            info!("Profiles stored in Redis");
            Arc::new(RedisProfileStore::new(client))
        }
        None => {
            info!("Profiles stored under {}", config.profile_dir.display());
            Arc::new(JsonFileProfileStore::new(config.profile_dir.clone()))
        }
    };

    let state = AppState {
        config: config.clone(),
        questions,
        profiles,
        interviews: Arc::new(InterviewRegistry::new()),
        audio: AudioBackends::unsupported(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
