use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::manager;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub format: Option<String>,
}

#[derive(Serialize)]
pub struct DownloadStarted {
    pub success: bool,
    pub message: String,
    #[serde(rename = "downloadId")]
    pub download_id: Uuid,
}

fn failure(message: impl std::fmt::Display) -> Json<Value> {
    Json(json!({ "success": false, "message": message.to_string() }))
}

pub async fn start_download(
    State(state): State<SharedState>,
    Json(req): Json<DownloadRequest>,
) -> Result<Json<DownloadStarted>, Json<Value>> {
    match manager::start_download(state, req.url, req.format).await {
        Ok(id) => Ok(Json(DownloadStarted {
            success: true,
            message: "Download started".to_string(),
            download_id: id,
        })),
        Err(e) => Err(failure(e)),
    }
}

pub async fn get_progress(
    State(state): State<SharedState>,
    Path(download_id): Path<String>,
) -> Json<Value> {
    let Some(id) = parse_id(&download_id) else {
        return failure(AppError::JobNotFound);
    };
    match manager::poll_progress(&state, id).await {
        Some(progress) => Json(json!({ "success": true, "progress": progress })),
        None => failure("Download job not found"),
    }
}

pub async fn cancel_download(
    State(state): State<SharedState>,
    Path(download_id): Path<String>,
) -> Json<Value> {
    let Some(id) = parse_id(&download_id) else {
        return failure(AppError::JobNotFound);
    };
    match manager::cancel_download(state, id).await {
        Ok(()) => Json(json!({ "success": true, "message": "Download cancelled" })),
        Err(e) => failure(e),
    }
}

/// Ids arrive as opaque path strings; anything that is not a uuid is simply
/// an unknown job.
fn parse_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw).ok()
}
