//! `GET /api/files/:file_id` -- serves a file previously stored by
//! `POST /api/upload`. `file_id` is parsed as a `Uuid` before it ever
//! touches a path join, so a path-traversal payload simply fails to parse
//! instead of needing a manual `..`/`/` blocklist.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::error::HubError;
use crate::repo::files;
use crate::state::AppState;

pub async fn get_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Response, HubError> {
    let file_id = Uuid::parse_str(&file_id).map_err(|_| HubError::NotFound)?;
    let meta = files::get(&state.pool, file_id)
        .await?
        .ok_or(HubError::NotFound)?;

    let path = std::path::Path::new(&state.config.uploads_dir).join(file_id.to_string());
    let file = File::open(&path).await.map_err(|_| HubError::NotFound)?;
    let body = Body::from_stream(ReaderStream::new(file));

    let content_type = meta.content_type.unwrap_or_else(|| "application/octet-stream".to_owned());
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", meta.name.replace('"', "")),
            ),
        ],
        body,
    )
        .into_response())
}
