use axum::extract::{Multipart, Path, State};
use axum::Json;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::LandwatchError;
use crate::messages::{ImageDetails, ImageSummary, MessageResponse, UploadResponse};
use crate::services::{ImageOrigin, ImageRecord};
use crate::utils::staging::{is_allowed_extension, sanitize_filename};

use super::error::ApiResult;
use super::owner::Owner;
use super::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> ApiResult<Json<Vec<ImageSummary>>> {
    let records = state.store.list_by_owner(&owner).await?;
    Ok(Json(records.iter().map(ImageSummary::from).collect()))
}

/// Records belonging to someone else are reported as missing.
async fn owned_record(state: &AppState, owner: &str, id: &str) -> ApiResult<ImageRecord> {
    let not_found = || LandwatchError::NotFound(format!("Image {}", id));
    let id = Uuid::parse_str(id).map_err(|_| not_found())?;
    match state.store.get(id).await? {
        Some(record) if record.owner == owner => Ok(record),
        _ => Err(not_found()),
    }
}

pub async fn details(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> ApiResult<Json<ImageDetails>> {
    let record = owned_record(&state, &owner, &id).await?;
    Ok(Json(ImageDetails::from_record(&record)))
}

pub async fn delete(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let record = owned_record(&state, &owner, &id).await?;

    match tokio::fs::remove_file(&record.original_path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!("Could not remove {}: {}", record.original_path.display(), err),
    }
    state
        .pipeline
        .archive(record.source)
        .remove(&record.filename)
        .await?;
    state.store.delete(record.id).await?;

    info!(%owner, image = %record.id, "Deleted image");
    Ok(Json(MessageResponse::new("Image deleted successfully")))
}

/// `POST /upload`: store the `file` part and run it through detection
/// before answering.
pub async fn upload(
    State(state): State<AppState>,
    Owner(owner): Owner,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut upload: Option<(String, Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| LandwatchError::Config(format!("Malformed upload: {}", err)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| LandwatchError::Config(format!("Malformed upload: {}", err)))?;
        upload = Some((filename, bytes));
        break;
    }

    let Some((filename, bytes)) = upload else {
        return Err(LandwatchError::Config("No file part".to_string()));
    };
    if filename.is_empty() {
        return Err(LandwatchError::Config("No selected file".to_string()));
    }
    if !is_allowed_extension(&filename, &state.config.ingest.allowed_extensions) {
        return Err(LandwatchError::Config("File type not allowed".to_string()));
    }
    let filename = sanitize_filename(&filename)?;

    tokio::fs::create_dir_all(&state.upload_dir).await?;
    let path = state.upload_dir.join(filename);
    tokio::fs::write(&path, &bytes).await?;

    let processed = match state
        .pipeline
        .process(filename, &path, bytes, &owner, ImageOrigin::Uploaded)
        .await
    {
        Ok(processed) => processed,
        Err(err) => {
            // A rejected upload leaves nothing behind.
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                warn!("Could not remove {}: {}", path.display(), remove_err);
            }
            return Err(err);
        }
    };

    Ok(Json(UploadResponse {
        message: "File uploaded and processed successfully".to_string(),
        image_id: processed.record_id,
    }))
}
