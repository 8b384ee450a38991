//! `POST /api/upload` -- stores a single multipart file under the
//! operator-configured uploads directory and hands back a retrieval URL.
//! Grounded in the teacher's `extract_file_bytes` pattern in
//! `http/races.rs`: read the first field's bytes, reject anything absent
//! or oversized, no attempt to parse the payload itself.

use axum::extract::{Multipart, State};
use axum::Json;
use chrono::Utc;
use hub_protocol::UploadResponse;
use tokio::fs;
use uuid::Uuid;

use crate::error::HubError;
use crate::repo::files;
use crate::state::AppState;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, HubError> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| HubError::BadRequest(format!("multipart error: {e}")))?
        .ok_or_else(|| HubError::BadRequest("no file uploaded".into()))?;

    let name = field
        .file_name()
        .map(str::to_owned)
        .unwrap_or_else(|| "upload".to_owned());
    let content_type = field.content_type().map(str::to_owned);

    let bytes = field
        .bytes()
        .await
        .map_err(|e| HubError::BadRequest(format!("failed to read file: {e}")))?;
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(HubError::BadRequest("file exceeds 10 MiB limit".into()));
    }

    let file_id = Uuid::new_v4();
    fs::create_dir_all(&state.config.uploads_dir)
        .await
        .map_err(|_| HubError::Internal)?;
    let path = std::path::Path::new(&state.config.uploads_dir).join(file_id.to_string());
    fs::write(&path, &bytes).await.map_err(|_| HubError::Internal)?;

    files::insert(
        &state.pool,
        file_id,
        &name,
        bytes.len() as i64,
        content_type.as_deref(),
        Utc::now(),
    )
    .await?;

    Ok(Json(UploadResponse {
        url: format!("{}/api/files/{file_id}", state.config.public_url),
        name,
        size: bytes.len() as u64,
    }))
}
