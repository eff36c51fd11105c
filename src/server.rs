//! HTTP server wrapper for the book generator engine (§6 "External
//! interfaces"): a REST façade over `run_pipeline`, plus a `/ws/:job_id`
//! route that streams `GenerationState` updates as they happen instead
//! of requiring callers to poll `/api/jobs/:job_id`.
//!
//! Adapted from the teacher's job-store pattern (`JobStatus` keyed by
//! job id in a shared map); the status payload itself is now the C11
//! `GenerationState` record rather than a hand-mutated struct, so the
//! REST and WebSocket views can never disagree.

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use axum::body::Body;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use book_generator::state::{BroadcastObserver, GenerationState, GenerationStateManager, LoggingObserver};
use book_generator::{run_pipeline, BookArtifact, Config, GenerationRequest};

const BROADCAST_CAPACITY: usize = 64;

struct JobEntry {
    state: Arc<GenerationStateManager>,
    broadcast: Arc<BroadcastObserver>,
}

type JobStore = Arc<RwLock<HashMap<String, JobEntry>>>;

struct AppState {
    jobs: JobStore,
    config: Config,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub subject: String,
    pub genre: Option<String>,
    pub profile: Option<String>,
    pub style: Option<String>,
    pub model: Option<String>,
    pub output_format: Option<String>,
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub job_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "book_generator_server=info,tower_http=info".into()),
        )
        .init();

    dotenvy::dotenv().ok();

    let port = env::var("PORT").unwrap_or_else(|_| "8081".to_string());
    let config = Config::from_env().unwrap_or_default();

    let state = Arc::new(AppState { jobs: Arc::new(RwLock::new(HashMap::new())), config });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_prometheus))
        .route("/api/generate", post(start_generation))
        .route("/api/jobs/:job_id", get(get_job_status))
        .route("/api/jobs/:job_id/cancel", post(cancel_job))
        .route("/ws/:job_id", get(ws_handler))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse().unwrap();
    tracing::info!("book generator server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy".to_string(), version: env!("CARGO_PKG_VERSION").to_string() })
}

/// Prometheus exposition format for homelab monitoring.
async fn metrics_prometheus(State(state): State<Arc<AppState>>) -> Response {
    let jobs = state.jobs.read().await;
    let active = jobs.len();
    let body = format!(
        "# HELP book_generator_up Service is running (1 = up).\n\
         # TYPE book_generator_up gauge\n\
         book_generator_up 1\n\
         # HELP book_generator_active_jobs Jobs tracked since process start.\n\
         # TYPE book_generator_active_jobs gauge\n\
         book_generator_active_jobs {}\n",
        active
    );
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8; version=0.0.4")
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from(body))
        .unwrap()
}

async fn start_generation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, (StatusCode, String)> {
    let job_id = Uuid::new_v4().to_string();
    let book_id = Uuid::new_v4().to_string();

    let manager = Arc::new(GenerationStateManager::new());
    manager.subscribe(Arc::new(LoggingObserver));
    let (broadcast, _first_receiver) = BroadcastObserver::new(BROADCAST_CAPACITY);
    let broadcast = Arc::new(broadcast);
    manager.subscribe(broadcast.clone());

    {
        let mut jobs = state.jobs.write().await;
        jobs.insert(job_id.clone(), JobEntry { state: manager.clone(), broadcast });
    }

    let config = state.config.clone();
    let generation_request = GenerationRequest {
        subject: request.subject,
        profile: request.profile.unwrap_or_else(|| "general audience".to_string()),
        style: request.style.unwrap_or_else(|| config.writing_style.clone()),
        genre: request.genre.unwrap_or_else(|| config.genre.clone()),
        model: request.model,
        output_format: request.output_format,
        output_path: request.output_path,
    };

    tokio::spawn(async move {
        let job_book_id = book_id;
        match run_pipeline(config, generation_request, job_book_id.clone(), manager).await {
            Ok(artifact) => log_completed(&job_book_id, &artifact),
            Err(err) => tracing::error!(book_id = %job_book_id, error = %err, "generation failed"),
        }
    });

    Ok(Json(GenerateResponse {
        job_id,
        status: "started".to_string(),
        message: "book generation started; poll /api/jobs/:job_id or connect to /ws/:job_id".to_string(),
    }))
}

fn log_completed(book_id: &str, artifact: &BookArtifact) {
    tracing::info!(book_id, chapters = artifact.chapters.len(), title = %artifact.title, "book generation completed");
}

async fn get_job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<GenerationState>, (StatusCode, String)> {
    let jobs = state.jobs.read().await;
    jobs.get(&job_id)
        .map(|entry| Json(entry.state.current()))
        .ok_or((StatusCode::NOT_FOUND, "job not found".to_string()))
}

/// Marks the job `ERROR` if it is still running. There is no dedicated
/// cancellation state in the transition table (§4.11); `Error` is legal
/// from any non-terminal state and carries the message downstream the
/// same way a provider failure would.
async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<GenerationState>, (StatusCode, String)> {
    let jobs = state.jobs.read().await;
    let entry = jobs.get(&job_id).ok_or((StatusCode::NOT_FOUND, "job not found".to_string()))?;
    let state = entry.state.fail("cancelled by user");
    Ok(Json(state))
}

async fn ws_handler(State(state): State<Arc<AppState>>, Path(job_id): Path<String>, ws: WebSocketUpgrade) -> Response {
    let jobs = state.jobs.read().await;
    match jobs.get(&job_id) {
        Some(entry) => {
            let receiver = entry.broadcast.subscribe();
            let current = entry.state.current();
            ws.on_upgrade(move |socket| stream_job_updates(socket, current, receiver))
        }
        None => Response::builder().status(StatusCode::NOT_FOUND).body(Body::from("job not found")).unwrap(),
    }
}

async fn stream_job_updates(
    mut socket: WebSocket,
    current: GenerationState,
    mut receiver: tokio::sync::broadcast::Receiver<GenerationState>,
) {
    if let Ok(text) = serde_json::to_string(&current) {
        if socket.send(Message::Text(text)).await.is_err() {
            return;
        }
    }

    loop {
        match receiver.recv().await {
            Ok(update) => {
                let Ok(text) = serde_json::to_string(&update) else { continue };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
                if update.status.is_terminal() {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}
