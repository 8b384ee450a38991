//! `GET /api/messages/:convo_id?limit=N&before=ts` -- paginated conversation
//! history, newest-first.

use axum::extract::{Path, Query, State};
use axum::Json;
use hub_protocol::MessageWire;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::HubError;
use crate::repo::messages;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    limit: Option<i64>,
    before: Option<i64>,
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(convo_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<MessageWire>>, HubError> {
    let convo_id = Uuid::parse_str(&convo_id).map_err(|_| HubError::BadRequest("bad convo id".into()))?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let rows = messages::list_before(&state.pool, convo_id, query.before, limit).await?;
    Ok(Json(
        rows.iter()
            .map(|msg| MessageWire {
                id: msg.id.to_string(),
                convo_id: msg.convo_id.to_string(),
                from_address: msg.from_address.clone(),
                to_address: msg.to_address.clone(),
                content: msg.content.clone(),
                media_type: msg.media_type.clone(),
                seq: msg.seq,
                server_timestamp: msg.server_timestamp.timestamp_millis(),
                status: messages::status_wire_name(msg.status).to_owned(),
            })
            .collect(),
    ))
}
