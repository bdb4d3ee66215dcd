//! HTTP API server for integration with other systems.
//!
//! Exposes transcript acquisition over REST. One endpoint pool is shared by
//! every request so a retired proxy stays retired across calls.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::endpoint::EndpointPool;
use crate::error::SkriftError;
use crate::orchestrator::{AcquireOptions, Orchestrator};
use crate::transcription::{AcquisitionAttempt, TranscriptExport};
use crate::video::VideoReference;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Shared application state.
struct AppState {
    orchestrator: Orchestrator,
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    if let Err(e) = preflight::check(Operation::Serve) {
        Output::warning(&format!("{}", e));
        Output::info("Run 'skrift doctor' for detailed diagnostics.");
    }

    let pool = Arc::new(EndpointPool::from_settings(&settings.endpoints));
    let endpoint_count = pool.active_count();
    let direct = pool.is_direct();
    let orchestrator = Orchestrator::new(settings, pool)?;

    let state = Arc::new(AppState { orchestrator });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/transcribe", post(transcribe))
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Skrift API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    if direct {
        Output::kv("Egress", "direct");
    } else {
        Output::kv("Egress", &format!("{} endpoint(s)", endpoint_count));
    }
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Transcribe", "POST /transcribe");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    tracing::info!(%addr, "API server started");
    axum::serve(listener, app).await?;

    Ok(())
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct TranscribeRequest {
    /// Video URL or bare video ID
    video_url: String,
    /// Caption languages in priority order; configured defaults when absent
    #[serde(default)]
    language_preferences: Vec<String>,
    #[serde(default = "default_refine")]
    refine: bool,
}

fn default_refine() -> bool {
    true
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attempts: Vec<AcquisitionAttempt>,
}

impl ErrorResponse {
    fn from_error(err: SkriftError) -> (StatusCode, Self) {
        match err {
            SkriftError::InvalidInput(_) => (
                StatusCode::BAD_REQUEST,
                Self {
                    error: err.to_string(),
                    attempts: Vec::new(),
                },
            ),
            SkriftError::TotalAcquisitionFailure {
                video_id,
                reason,
                attempts,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Self {
                    error: format!("Transcript acquisition failed for {}: {}", video_id, reason),
                    attempts,
                },
            ),
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Self {
                    error: other.to_string(),
                    attempts: Vec::new(),
                },
            ),
        }
    }
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn transcribe(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TranscribeRequest>,
) -> impl IntoResponse {
    let video = match VideoReference::parse(&req.video_url) {
        Ok(v) => v,
        Err(e) => {
            let (status, body) = ErrorResponse::from_error(e);
            return (status, Json(body)).into_response();
        }
    };

    let options = AcquireOptions {
        refine: req.refine,
        with_metadata: true,
    };

    match state
        .orchestrator
        .acquire(&video, &req.language_preferences, options)
        .await
    {
        Ok(acquisition) => Json(TranscriptExport::from(&acquisition)).into_response(),
        Err(e) => {
            tracing::warn!(video_id = %video, error = %e, "Transcribe request failed");
            let (status, body) = ErrorResponse::from_error(e);
            (status, Json(body)).into_response()
        }
    }
}
