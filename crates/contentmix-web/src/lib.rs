//! HTTP front end for contentmix.
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /?count=N&offset=M` | Streamed JSON array of merged content |
//! | `GET /health` | Liveness and provider count |
//!
//! The response status and headers are committed before the first provider
//! answers. A provider failure mid-stream therefore closes the array early
//! instead of changing the status. Chunks pass through a bounded channel, so
//! a slow reader slows the fetches down instead of growing a buffer.

pub mod error;
pub mod sink;

use std::collections::HashMap;
use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use contentmix_core::config::ENV_CONFIG_PATH;
use contentmix_core::{BatchFetchEngine, ContentQuery, MixConfig, ProviderRegistry, RequestCursor};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

pub use crate::error::ServerError;
pub use crate::sink::{ChunkSink, CHUNK_BUFFER};

#[derive(Clone)]
pub struct AppState {
    engine: Arc<BatchFetchEngine>,
}

impl AppState {
    pub fn new(engine: BatchFetchEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// Validates the provider mix and builds sample-backed clients for it.
    pub fn from_config(config: &MixConfig) -> Result<Self, ServerError> {
        let registry = ProviderRegistry::from_config(config)?;
        Ok(Self::new(BatchFetchEngine::with_config(
            Arc::new(registry),
            config.engine_config(),
        )))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(content_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Resolves the effective configuration: file (flag, then `CONTENTMIX_CONFIG`)
/// or defaults, then environment overrides, then the `--bind` flag.
pub fn load_config(path: Option<&Path>, bind: Option<&str>) -> Result<MixConfig, ServerError> {
    let env_path = std::env::var(ENV_CONFIG_PATH).ok();
    let path = path.or_else(|| env_path.as_deref().map(Path::new));

    let config = match path {
        Some(path) => {
            info!("loading config from {}", path.display());
            MixConfig::load(path)?
        }
        None => MixConfig::default(),
    };

    let mut config = config.apply_env()?;
    if let Some(bind) = bind {
        config.bind = bind.to_owned();
    }
    Ok(config)
}

/// Validates the registry, binds, and serves until Ctrl-C.
pub async fn serve(config: MixConfig) -> Result<(), ServerError> {
    let state = AppState::from_config(&config)?;
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind.clone(),
            source,
        })?;

    info!(
        providers = config.providers.len(),
        abort_policy = config.abort_policy.as_str(),
        "content mix server listening on {}",
        config.bind
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!("failed to install Ctrl-C handler: {error}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

async fn content_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    method: Method,
    uri: Uri,
) -> Response {
    info!("{} {}", method, uri);

    let query = ContentQuery::parse_lenient(
        params.get("count").map(String::as_str),
        params.get("offset").map(String::as_str),
    );
    debug!(count = query.count, offset = query.offset, "content request");

    let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
    let engine = Arc::clone(&state.engine);

    tokio::spawn(async move {
        let mut sink = ChunkSink::new(tx);
        sink.open().await;

        let mut cursor = RequestCursor::from(query);
        if let Err(error) = engine.run(&mut cursor, &mut sink).await {
            warn!(
                code = error.code(),
                written = sink.written(),
                "closing response early: {error}"
            );
        }

        sink.close().await;
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "providers": state.engine.registry().len(),
    }))
}
