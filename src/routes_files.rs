use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_util::io::ReaderStream;
use tracing::{error, info};

use crate::error::AppError;
use crate::files;
use crate::manager;
use crate::state::SharedState;

fn failure(message: impl std::fmt::Display) -> Json<Value> {
    Json(json!({ "success": false, "message": message.to_string() }))
}

pub async fn list_downloads(State(state): State<SharedState>) -> Json<Value> {
    match files::list_videos(&state.config.downloads_dir) {
        Ok(files) => Json(json!({ "success": true, "files": files })),
        Err(e) => {
            error!("failed to list downloads: {e}");
            failure(format!("Failed to list videos: {e}"))
        }
    }
}

pub async fn check_video(
    State(state): State<SharedState>,
    Path(filename): Path<String>,
) -> Json<Value> {
    let Some(actual) = manager::resolve_file(&state, &filename) else {
        return failure(AppError::FileNotFound);
    };
    let path = state.config.downloads_dir.join(&actual);
    match tokio::fs::metadata(&path).await {
        Ok(meta) => {
            let modified: DateTime<Utc> = meta.modified().map(Into::into).unwrap_or_else(|_| Utc::now());
            Json(json!({
                "success": true,
                "filename": actual,
                "size": meta.len(),
                "sizeFormatted": files::format_file_size(meta.len()),
                "lastModified": modified.to_rfc3339(),
                "isComplete": true,
            }))
        }
        Err(_) => failure(AppError::FileNotFound),
    }
}

pub async fn delete_video(
    State(state): State<SharedState>,
    Path(filename): Path<String>,
) -> Json<Value> {
    let Some(actual) = manager::resolve_file(&state, &filename) else {
        return failure(AppError::FileNotFound);
    };
    let path = state.config.downloads_dir.join(&actual);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => {
            info!(file = %actual, "deleted video");
            Json(json!({ "success": true, "message": "Video deleted" }))
        }
        Err(e) => failure(format!("Failed to delete file: {e}")),
    }
}

/// How a request maps onto the file's bytes.
#[derive(Debug, PartialEq, Eq)]
pub enum RangePlan {
    Full,
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

/// Plans a `Range: bytes=S-E` request over a file of `total` bytes.
/// Open-ended ranges run to EOF; malformed headers fall back to the full
/// file; a start at or past EOF cannot be satisfied.
pub fn plan_range(header: Option<&str>, total: u64) -> RangePlan {
    let Some(value) = header else {
        return RangePlan::Full;
    };
    let Some(spec) = value.trim().strip_prefix("bytes=") else {
        return RangePlan::Full;
    };
    let Some((start_raw, end_raw)) = spec.split_once('-') else {
        return RangePlan::Full;
    };
    let start_raw = start_raw.trim();
    let end_raw = end_raw.trim();

    // Suffix form `bytes=-N`: the last N bytes of the file.
    if start_raw.is_empty() {
        let Ok(suffix) = end_raw.parse::<u64>() else {
            return RangePlan::Full;
        };
        if suffix == 0 || total == 0 {
            return RangePlan::Unsatisfiable;
        }
        return RangePlan::Partial {
            start: total.saturating_sub(suffix),
            end: total - 1,
        };
    }

    let Ok(start) = start_raw.parse::<u64>() else {
        return RangePlan::Full;
    };

    let end = if end_raw.is_empty() {
        total.saturating_sub(1)
    } else {
        match end_raw.parse::<u64>() {
            Ok(e) => e.min(total.saturating_sub(1)),
            Err(_) => return RangePlan::Full,
        }
    };

    if total == 0 || start >= total || start > end {
        return RangePlan::Unsatisfiable;
    }
    RangePlan::Partial { start, end }
}

pub async fn stream_video(
    State(state): State<SharedState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(actual) = manager::resolve_file(&state, &filename) else {
        return (StatusCode::NOT_FOUND, "File not found").into_response();
    };
    let path = state.config.downloads_dir.join(&actual);

    let meta = match tokio::fs::metadata(&path).await {
        Ok(meta) => meta,
        Err(_) => return (StatusCode::NOT_FOUND, "File not found").into_response(),
    };
    let total = meta.len();
    let content_type = files::content_type(&actual);

    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());

    match plan_range(range_header, total) {
        RangePlan::Unsatisfiable => (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{total}"))],
        )
            .into_response(),

        RangePlan::Partial { start, end } => {
            let len = end - start + 1;
            let mut file = match tokio::fs::File::open(&path).await {
                Ok(f) => f,
                Err(e) => {
                    error!(file = %actual, "failed to open for streaming: {e}");
                    return (StatusCode::INTERNAL_SERVER_ERROR, AppError::StreamIo(e).to_string())
                        .into_response();
                }
            };
            if let Err(e) = file.seek(SeekFrom::Start(start)).await {
                error!(file = %actual, "failed to seek: {e}");
                return (StatusCode::INTERNAL_SERVER_ERROR, AppError::StreamIo(e).to_string())
                    .into_response();
            }

            info!(file = %actual, start, end, total, "serving range");
            let body = Body::from_stream(ReaderStream::new(file.take(len)));
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, len)
                .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{total}"))
                .header(header::ACCEPT_RANGES, "bytes")
                .body(body)
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }

        RangePlan::Full => {
            let file = match tokio::fs::File::open(&path).await {
                Ok(f) => f,
                Err(e) => {
                    error!(file = %actual, "failed to open for streaming: {e}");
                    return (StatusCode::INTERNAL_SERVER_ERROR, AppError::StreamIo(e).to_string())
                        .into_response();
                }
            };
            info!(file = %actual, total, "serving full file");
            let body = Body::from_stream(ReaderStream::new(file));
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, total)
                .header(header::ACCEPT_RANGES, "bytes")
                .body(body)
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}
