//! # Speech Ingest Backend - Main Application Entry Point
//!
//! HTTP service that accepts uploaded voice recordings, normalizes them into
//! canonical WAV, and returns a transcript from a remote speech-recognition
//! backend.
//!
//! ## Application Architecture:
//! - **config**: Layered configuration (defaults, config.toml, environment variables)
//! - **audio**: Format sniffing, ffmpeg transcoding and WAV repackaging
//! - **transcription**: Recognition client, pipeline orchestrator and result types
//! - **state**: Shared configuration, pipeline and metrics
//! - **health**: Health and metrics endpoints
//! - **middleware**: Request logging and per-endpoint metrics
//! - **handlers**: Upload and configuration endpoints
//! - **error**: HTTP error responses
//!
//! ## Startup order:
//! 1. Load `.env`, initialize tracing
//! 2. Load and validate configuration
//! 3. Build the transcoder and recognizer, inject them into the pipeline
//! 4. Serve until SIGINT/SIGTERM, then stop gracefully

mod audio;
mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod state;
mod transcription;

use crate::audio::FfmpegTranscoder;
use crate::config::AppConfig;
use crate::state::AppState;
use crate::transcription::{HttpRecognizer, TranscriptionPipeline};
use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer, ResponseError};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set once a termination signal arrives.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting speech-ingest-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    info!(
        endpoint = %config.recognizer.endpoint,
        language = %config.recognizer.language,
        ffmpeg = %config.transcoder.ffmpeg_path,
        "Recognition pipeline configured"
    );

    let pipeline = build_pipeline(&config)?;
    let app_state = AppState::new(config.clone(), pipeline);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers()?;

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Responses pass through these in reverse order.
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/speech-to-text", web::post().to(handlers::speech_to_text)),
            )
            .route("/health", web::get().to(health::health_check))
            .default_service(web::to(not_found))
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Construct the transcoder and recognizer from configuration and inject
/// them into the pipeline.
fn build_pipeline(config: &AppConfig) -> Result<TranscriptionPipeline> {
    let transcoder = FfmpegTranscoder::new(
        &config.transcoder.ffmpeg_path,
        &config.transcoder.scratch_dir,
        config.audio,
    );
    let recognizer = HttpRecognizer::from_config(&config.recognizer)?;

    Ok(TranscriptionPipeline::new(
        config.audio,
        Arc::new(transcoder),
        Arc::new(recognizer),
    ))
}

async fn not_found(req: actix_web::HttpRequest) -> HttpResponse {
    error::AppError::NotFound(format!("No route for {} {}", req.method(), req.path())).error_response()
}

/// `RUST_LOG` controls the filter; defaults to debug for this crate.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "speech_ingest_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to initialize tracing")?;

    Ok(())
}

/// Flip `SHUTDOWN_SIGNAL` on SIGTERM or SIGINT.
fn setup_signal_handlers() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });

    Ok(())
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
