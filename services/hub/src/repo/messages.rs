use chrono::{DateTime, Utc};
use hub_core::{Message, MessageStatus};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::HubError;

fn status_to_str(status: MessageStatus) -> &'static str {
    match status {
        MessageStatus::Pending => "pending",
        MessageStatus::Delivered => "delivered",
        MessageStatus::Read => "read",
    }
}

fn status_from_str(s: &str) -> MessageStatus {
    match s {
        "delivered" => MessageStatus::Delivered,
        "read" => MessageStatus::Read,
        _ => MessageStatus::Pending,
    }
}

fn row_to_message(row: &sqlx::postgres::PgRow) -> Message {
    let seq: i64 = row.get("seq");
    Message {
        id: row.get("id"),
        convo_id: row.get("convo_id"),
        from_address: row.get("from_address"),
        to_address: row.get("to_address"),
        content: row.get("content"),
        media_type: row.get("media_type"),
        seq: seq.max(0) as u64,
        server_timestamp: row.get("server_timestamp"),
        status: status_from_str(row.get("status")),
    }
}

/// Appends a message to `convo_id`'s ledger with the next monotonic `seq`.
///
/// Invariant I1 (dense, strictly increasing `seq` per conversation) is
/// enforced by taking a Postgres advisory lock keyed on the conversation id
/// for the duration of the transaction, so two concurrent `msg:send`
/// frames for the same conversation serialize instead of racing on the
/// read-increment-write of `last_message_seq`. The `UNIQUE(convo_id, seq)`
/// constraint on `messages` is defense in depth if that lock is ever
/// bypassed (e.g. a future admin backfill tool).
pub async fn append(
    pool: &PgPool,
    convo_id: Uuid,
    from_address: &str,
    to_address: &str,
    content: &str,
    media_type: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Message, HubError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(convo_id)
        .execute(&mut *tx)
        .await?;

    let next_seq: i64 = sqlx::query_scalar(
        "UPDATE conversations SET last_message_seq = last_message_seq + 1 WHERE id = $1 RETURNING last_message_seq",
    )
    .bind(convo_id)
    .fetch_one(&mut *tx)
    .await?;

    let id = Uuid::new_v4();
    let row = sqlx::query(
        r"
        INSERT INTO messages (id, convo_id, from_address, to_address, content, media_type, seq, server_timestamp, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending')
        RETURNING *
        ",
    )
    .bind(id)
    .bind(convo_id)
    .bind(from_address)
    .bind(to_address)
    .bind(content)
    .bind(media_type)
    .bind(next_seq)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row_to_message(&row))
}

pub async fn mark_delivered(pool: &PgPool, message_id: Uuid) -> Result<(), HubError> {
    sqlx::query("UPDATE messages SET status = 'delivered' WHERE id = $1 AND status = 'pending'")
        .bind(message_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_read_up_to(
    pool: &PgPool,
    convo_id: Uuid,
    reader_address: &str,
    up_to_seq: u64,
) -> Result<(), HubError> {
    sqlx::query(
        r"
        UPDATE messages SET status = 'read'
        WHERE convo_id = $1 AND to_address = $2 AND seq <= $3 AND status != 'read'
        ",
    )
    .bind(convo_id)
    .bind(reader_address)
    .bind(up_to_seq as i64)
    .execute(pool)
    .await?;
    Ok(())
}

/// Offline/cross-device catch-up: every message still `pending` for
/// `to_address` across every conversation, oldest first. Delivered to a
/// connection right after registration, before anything else goes out.
pub async fn get_pending_for_address(
    pool: &PgPool,
    to_address: &str,
) -> Result<Vec<Message>, HubError> {
    let rows = sqlx::query(
        "SELECT * FROM messages WHERE to_address = $1 AND status = 'pending' ORDER BY seq ASC",
    )
    .bind(to_address)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(row_to_message).collect())
}

/// For `GET /api/messages/:convo_id?limit=N&before=ts`: the `limit` most
/// recent messages older than `before` (server milliseconds), newest first.
/// `before = None` starts from the most recent message.
pub async fn list_before(
    pool: &PgPool,
    convo_id: Uuid,
    before_millis: Option<i64>,
    limit: i64,
) -> Result<Vec<Message>, HubError> {
    let rows = match before_millis {
        Some(before) => {
            let cutoff = DateTime::from_timestamp_millis(before).unwrap_or_else(Utc::now);
            sqlx::query(
                "SELECT * FROM messages WHERE convo_id = $1 AND server_timestamp < $2 ORDER BY seq DESC LIMIT $3",
            )
            .bind(convo_id)
            .bind(cutoff)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query("SELECT * FROM messages WHERE convo_id = $1 ORDER BY seq DESC LIMIT $2")
                .bind(convo_id)
                .bind(limit)
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows.iter().map(row_to_message).collect())
}

pub fn status_wire_name(status: MessageStatus) -> &'static str {
    status_to_str(status)
}
