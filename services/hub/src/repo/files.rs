use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::HubError;

pub struct FileMeta {
    pub file_id: Uuid,
    pub name: String,
    pub size: i64,
    pub content_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub async fn insert(
    pool: &PgPool,
    file_id: Uuid,
    name: &str,
    size: i64,
    content_type: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), HubError> {
    sqlx::query(
        "INSERT INTO uploaded_files (file_id, name, size, content_type, created_at) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(file_id)
    .bind(name)
    .bind(size)
    .bind(content_type)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get(pool: &PgPool, file_id: Uuid) -> Result<Option<FileMeta>, HubError> {
    let row = sqlx::query("SELECT * FROM uploaded_files WHERE file_id = $1")
        .bind(file_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| FileMeta {
        file_id: row.get("file_id"),
        name: row.get("name"),
        size: row.get("size"),
        content_type: row.get("content_type"),
        created_at: row.get("created_at"),
    }))
}
