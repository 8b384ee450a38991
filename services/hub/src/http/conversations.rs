//! `GET /api/conversations/:address` -- every conversation `address`
//! currently participates in, newest first.

use axum::extract::{Path, State};
use axum::Json;
use hub_protocol::ConversationWire;

use crate::error::HubError;
use crate::repo::conversations;
use crate::state::AppState;

pub async fn list_conversations(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Vec<ConversationWire>>, HubError> {
    let convos = conversations::list_for_address(&state.pool, &address).await?;
    Ok(Json(
        convos
            .iter()
            .map(|c| ConversationWire {
                id: c.id.to_string(),
                kind: conversations::kind_wire_name(c.kind).to_owned(),
                participants: c.participants.clone(),
                created_at: c.created_at.timestamp_millis(),
                last_message_seq: c.last_message_seq,
            })
            .collect(),
    ))
}
