//! banter server binary — the entry point for the voice-message exchange
//! core.
//!
//! Starts an axum HTTP server with structured logging, database
//! initialization, the reply pipeline worker, and graceful shutdown on
//! SIGTERM/SIGINT.
//!
//! The external-service adapters (whisper STT, the agent backend, piper
//! TTS) are constructed once here and live for the whole process; nothing
//! else in the system reaches for them directly.

use banter_pipeline::Pipeline;
use banter_server::{app, config, AppState};
use banter_voice::{ChatAgent, PiperTts, WhisperStt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("BANTER_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // Initialize database
    let pool = banter_db::create_pool(
        &config.database.path,
        banter_db::DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool — check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied = banter_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    // Audio artifacts directory, served under /audio/
    let audio_dir = config.tts.audio_dir.clone();
    std::fs::create_dir_all(&audio_dir)
        .expect("failed to create audio directory — check tts.audio_dir in config");

    // Adapters: constructed once, shared for the process lifetime.
    let transcriber = Arc::new(WhisperStt::new(config.stt.clone()));
    let synthesizer = Arc::new(PiperTts::new(config.tts.clone()));
    let agent = Arc::new(
        ChatAgent::new(config.agent.clone())
            .expect("failed to configure agent backend — set agent.url in config"),
    );

    // Reply pipeline worker
    let (pipeline, pipeline_handle) = Pipeline::spawn(
        pool.clone(),
        agent,
        synthesizer,
        config.pipeline.clone().into(),
    );

    // Build application
    let state = AppState {
        pool,
        pipeline,
        transcriber,
        audio_dir,
    };
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting banter server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address — is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Dropping the state closed the pipeline queue; let the worker finish
    // any turn it was mid-way through.
    if let Err(e) = pipeline_handle.await {
        tracing::warn!(error = %e, "pipeline worker did not shut down cleanly");
    }

    tracing::info!("banter server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
