mod error;
pub mod images;
pub mod owner;
pub mod realtime;
pub mod state;
pub mod stream;

use std::time::Duration;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use error::ApiResult;
pub use owner::{Owner, OWNER_HEADER};
pub use state::AppState;

const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.server.cors_origins);
    let storage = &state.config.storage;

    Router::new()
        .route("/health", get(health))
        .route("/realtime", post(realtime::live_stream))
        .route("/realtime/replay", post(realtime::replay_stream))
        .route("/realtime/start", post(realtime::start))
        .route("/realtime/stop", post(realtime::stop))
        .route("/realtime-status", get(realtime::status))
        .route("/images-list", get(realtime::session_images))
        .route("/images", get(images::list))
        .route("/images/{id}", get(images::details).delete(images::delete))
        .route("/realtime-images/{id}", get(images::details))
        .route(
            "/upload",
            post(images::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .nest_service("/uploads", ServeDir::new(&storage.upload_dir))
        .nest_service("/outputs", ServeDir::new(&storage.output_dir))
        .nest_service("/realtime-files", ServeDir::new(&state.config.ingest.staging_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let status = state.manager.status();
    Json(json!({
        "status": "ok",
        "worker": status.state,
    }))
}

/// Origins that fail to parse are logged and skipped.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Ignoring invalid CORS origin '{}': {}", origin, err);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(OWNER_HEADER)])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
