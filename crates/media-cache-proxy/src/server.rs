//! HTTP server for the media cache proxy
//!
//! Provides /health, /track and /cache endpoints.

use crate::downloader::HttpDownloader;
use crate::types::{content_type_for, CacheListing, HealthResponse, TrackQuery};
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use media_cache::{FetchOrigin, MediaCache};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use url::Url;

/// Shared state for the HTTP server
pub struct ServerState {
    pub cache: MediaCache,
    pub downloader: HttpDownloader,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(cache: MediaCache, downloader: HttpDownloader) -> Self {
        Self {
            cache,
            downloader,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/track", get(get_track))
        .route("/cache", get(list_cache).delete(clear_cache))
        .route("/cache/track", axum::routing::delete(evict_track))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Validate the `url` query parameter as an absolute http(s) URL
fn source_url(query: &TrackQuery) -> Result<String, Response> {
    let Some(raw) = query.url.as_deref().filter(|u| !u.is_empty()) else {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Missing url query parameter",
        ));
    };

    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(raw.to_string()),
        _ => Err(error_response(StatusCode::BAD_REQUEST, "Invalid source url")),
    }
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let cache_stats = state.cache.stats().await;
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        degraded: state.cache.is_degraded(),
        cache: cache_stats,
    })
}

/// Serve a track from the cache, downloading it on a miss
///
/// When the cache cannot produce the track, the client is redirected to the
/// source so playback still starts.
async fn get_track(State(state): State<SharedState>, Query(query): Query<TrackQuery>) -> Response {
    let url = match source_url(&query) {
        Ok(url) => url,
        Err(response) => return response,
    };

    let downloader = state.downloader.clone();
    let result = state
        .cache
        .fetch_with_origin(&url, move |source| async move { downloader.fetch(&source).await })
        .await;

    match result {
        Ok((entry, origin)) => {
            let cache_header = match origin {
                FetchOrigin::Cache => "HIT",
                FetchOrigin::Downloaded => "MISS",
            };

            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type_for(&entry.display_name))
                .header(header::CACHE_CONTROL, "private, max-age=86400")
                .header("X-Cache", cache_header)
                .body(Body::from(entry.payload))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(e) => {
            warn!(url = %url, error = %e, "Cache unavailable for track, redirecting to source");
            Redirect::temporary(&url).into_response()
        }
    }
}

/// List cache occupancy and entry metadata
async fn list_cache(State(state): State<SharedState>) -> Json<CacheListing> {
    let stats = state.cache.stats().await;
    let entries = state.cache.entries().await;
    Json(CacheListing { stats, entries })
}

/// Clear the whole cache
async fn clear_cache(State(state): State<SharedState>) -> StatusCode {
    state.cache.clear().await;
    StatusCode::NO_CONTENT
}

/// Evict a single track
async fn evict_track(State(state): State<SharedState>, Query(query): Query<TrackQuery>) -> Response {
    let url = match source_url(&query) {
        Ok(url) => url,
        Err(response) => return response,
    };

    if state.cache.evict(&url).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, "Track not cached")
    }
}
