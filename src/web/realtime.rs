use axum::extract::State;
use axum::response::Response;
use axum::Json;
use bytes::Bytes;
use tracing::info;

use crate::engine::StartOutcome;
use crate::messages::{ApiKeyRequest, ImageListResponse, MessageResponse, StatusResponse};

use super::error::ApiResult;
use super::owner::Owner;
use super::state::AppState;
use super::stream::ndjson_response;

/// `POST /realtime`: attach to the running worker or cold-start one, then
/// stream results until the client disconnects.
pub async fn live_stream(
    State(state): State<AppState>,
    Owner(owner): Owner,
    body: Bytes,
) -> ApiResult<Response> {
    let api_key = ApiKeyRequest::parse_key(&body)?;
    let (mode, _session) = state.responder.open_live(&api_key, &owner).await?;
    info!(target: "stream", %owner, ?mode, "Streaming realtime results");

    let responder = state.responder.clone();
    Ok(ndjson_response(
        &state.shutdown,
        state.config.stream.channel_capacity,
        move |sink, cancel| async move { responder.run_live(sink, cancel).await },
    ))
}

/// `POST /realtime/replay`: one pass over the staged images.
pub async fn replay_stream(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> ApiResult<Response> {
    let responder = state.responder.clone();
    Ok(ndjson_response(
        &state.shutdown,
        state.config.stream.channel_capacity,
        move |sink, cancel| async move { responder.run_replay(&owner, sink, cancel).await },
    ))
}

pub async fn start(
    State(state): State<AppState>,
    Owner(owner): Owner,
    body: Bytes,
) -> ApiResult<Json<MessageResponse>> {
    let api_key = ApiKeyRequest::parse_key(&body)?;
    let message = match state.manager.start(&api_key, &owner).await? {
        StartOutcome::Started => "Realtime processing started",
        StartOutcome::AlreadyRunning => "Realtime processing already running",
    };
    Ok(Json(MessageResponse::new(message)))
}

pub async fn stop(
    State(state): State<AppState>,
    _owner: Owner,
    body: Bytes,
) -> ApiResult<Json<MessageResponse>> {
    let api_key = ApiKeyRequest::parse_key(&body)?;
    state.manager.stop(&api_key).await?;
    Ok(Json(MessageResponse::new("Realtime processing stopped")))
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.manager.status();
    Json(StatusResponse {
        is_running: status.is_running(),
        api_key: status.api_key,
    })
}

/// `GET /images-list`: filenames processed for the caller since their
/// current session began.
pub async fn session_images(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> ApiResult<Json<ImageListResponse>> {
    let images = state.sessions.current_images(&owner).await?;
    Ok(Json(ImageListResponse { images }))
}
