use chrono::{DateTime, Utc};
use hub_core::{direct_conversation_id, Conversation, ConversationKind};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::HubError;

fn kind_to_str(kind: ConversationKind) -> &'static str {
    match kind {
        ConversationKind::Direct => "direct",
        ConversationKind::Group => "group",
    }
}

fn kind_from_str(s: &str) -> ConversationKind {
    match s {
        "group" => ConversationKind::Group,
        _ => ConversationKind::Direct,
    }
}

fn row_to_conversation(row: &sqlx::postgres::PgRow) -> Conversation {
    let last_message_seq: i64 = row.get("last_message_seq");
    Conversation {
        id: row.get("id"),
        kind: kind_from_str(row.get("kind")),
        participants: row.get("participants"),
        created_at: row.get("created_at"),
        last_message_seq: last_message_seq.max(0) as u64,
    }
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Conversation>, HubError> {
    let row = sqlx::query("SELECT * FROM conversations WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(row_to_conversation))
}

/// Returns the direct conversation for `(a, b)`, creating its row the first
/// time the pair exchanges anything. The id is always `direct_conversation_id`
/// -- never a fresh `Uuid::new_v4` -- so both participants agree on it
/// without a prior `convo:create` round trip.
pub async fn get_or_create_direct(
    pool: &PgPool,
    a: &str,
    b: &str,
    now: DateTime<Utc>,
) -> Result<Conversation, HubError> {
    let id = direct_conversation_id(a, b);
    let participants = {
        let mut p = vec![a.to_string(), b.to_string()];
        p.sort();
        p
    };
    let row = sqlx::query(
        r"
        INSERT INTO conversations (id, kind, participants, created_at, last_message_seq)
        VALUES ($1, 'direct', $2, $3, 0)
        ON CONFLICT (id) DO UPDATE SET id = conversations.id
        RETURNING *
        ",
    )
    .bind(id)
    .bind(&participants)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(row_to_conversation(&row))
}

pub async fn create_group(
    pool: &PgPool,
    participants: Vec<String>,
    now: DateTime<Utc>,
) -> Result<Conversation, HubError> {
    let id = Uuid::new_v4();
    let row = sqlx::query(
        r"
        INSERT INTO conversations (id, kind, participants, created_at, last_message_seq)
        VALUES ($1, 'group', $2, $3, 0)
        RETURNING *
        ",
    )
    .bind(id)
    .bind(&participants)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(row_to_conversation(&row))
}

pub async fn remove_participant(
    pool: &PgPool,
    convo_id: Uuid,
    address: &str,
) -> Result<(), HubError> {
    sqlx::query(
        "UPDATE conversations SET participants = array_remove(participants, $2) WHERE id = $1",
    )
    .bind(convo_id)
    .bind(address)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_for_address(pool: &PgPool, address: &str) -> Result<Vec<Conversation>, HubError> {
    let rows = sqlx::query(
        "SELECT * FROM conversations WHERE $1 = ANY(participants) ORDER BY created_at DESC",
    )
    .bind(address)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(row_to_conversation).collect())
}

pub fn kind_wire_name(kind: ConversationKind) -> &'static str {
    kind_to_str(kind)
}
