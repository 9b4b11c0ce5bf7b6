//! HTTP serving layer
//!
//! Routes, relative to one stream:
//! - `/{stream}/playlist.m3u8`: synthesized master playlist
//! - `/{stream}/main/subplaylist/{variant_id}`: synthesized media playlist
//! - `/{stream}/main/subplaylist/segment/{segment_id}`: forwarded segment
//!
//! The relative paths written by the renderer resolve to exactly these routes.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use hlsmerge_core::{AggregationEngine, EngineStatsSnapshot};

use crate::error::{AppError, AppResult};

const M3U8_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

#[derive(Clone)]
pub struct AppState {
    streams: Arc<HashMap<String, Arc<AggregationEngine>>>,
    client: reqwest::Client,
}

impl AppState {
    pub fn new(engines: &[Arc<AggregationEngine>], client: reqwest::Client) -> Self {
        let streams = engines
            .iter()
            .map(|engine| (engine.name().to_string(), Arc::clone(engine)))
            .collect();

        Self {
            streams: Arc::new(streams),
            client,
        }
    }

    fn engine(&self, stream: &str) -> AppResult<&Arc<AggregationEngine>> {
        self.streams
            .get(stream)
            .ok_or_else(|| AppError::not_found(format!("Unknown stream {stream}")))
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/{stream}/playlist.m3u8", get(get_manifest))
        .route("/{stream}/stats", get(get_stats))
        .route("/{stream}/main/subplaylist/{variant_id}", get(get_variant))
        .route(
            "/{stream}/main/subplaylist/segment/{segment_id}",
            get(get_segment),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    address: &str,
    state: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

async fn health_check() -> impl IntoResponse {
    "OK"
}

fn playlist_response(body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, M3U8_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

async fn get_manifest(
    Path(stream): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let engine = state.engine(&stream)?;
    Ok(playlist_response(engine.synthesize_manifest()))
}

async fn get_variant(
    Path((stream, variant_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let engine = state.engine(&stream)?;
    let playlist = engine
        .get_variant_playlist(&variant_id)
        .ok_or_else(|| AppError::not_found(format!("Unknown variant {variant_id}")))?;
    Ok(playlist_response(playlist))
}

async fn get_segment(
    Path((stream, segment_id)): Path<(String, String)>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let engine = state.engine(&stream)?;
    let address = engine
        .resolve_segment_alias(&segment_id)
        .ok_or_else(|| AppError::not_found(format!("Unknown segment {segment_id}")))?;

    Ok(hlsmerge_proxy::forward_segment(&state.client, &address, &headers).await?)
}

async fn get_stats(
    Path(stream): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Json<EngineStatsSnapshot>> {
    let engine = state.engine(&stream)?;
    Ok(Json(engine.stats()))
}
