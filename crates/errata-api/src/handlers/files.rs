//! Serving stored uploads and crops.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};

use errata_core::{content_type_for, resolve_within};

use crate::auth::RequireAuth;
use crate::{ApiError, AppState};

/// `GET /uploads/*path`. Paths escaping the upload directory are rejected.
pub async fn serve_upload(
    State(state): State<AppState>,
    _auth: RequireAuth,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let full = resolve_within(&state.config.upload_dir, &path)?;
    let data = match tokio::fs::read(&full).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("File not found".to_string()))
        }
        Err(e) => return Err(ApiError::Internal(format!("Failed to read file: {}", e))),
    };
    let content_type = content_type_for(&full, &data);
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "private, max-age=3600"),
        ],
        data,
    ))
}
