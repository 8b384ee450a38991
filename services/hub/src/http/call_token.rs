//! `POST /api/call-session-token` -- §4.6. The request body is itself a
//! signed envelope: there's no standing HTTP session, so address ownership
//! is proven the same way it is on the WebSocket, by Ed25519 signature,
//! rather than inventing a bearer-token scheme for this one endpoint.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use hub_protocol::{CallSessionTokenResponse, CallTokenEnvelope};
use rand::RngCore;

use crate::config::TurnMode;
use crate::envelope::verify_envelope;
use crate::error::HubError;
use crate::http::ice;
use crate::repo::{call_tokens, identities};
use crate::state::AppState;

fn random_nonce() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub async fn issue_call_session_token(
    State(state): State<AppState>,
    Json(envelope): Json<CallTokenEnvelope>,
) -> Result<Json<CallSessionTokenResponse>, HubError> {
    verify_envelope(&envelope, &state.nonces).await?;

    let now = Utc::now();
    let address = &envelope.payload.address;
    let identity =
        identities::get_or_register(&state.pool, address, &envelope.from_pubkey, now).await?;

    let nonce = random_nonce();
    let allow_turn = identity.plan.is_paid() && state.config.turn_mode == TurnMode::Custom;
    let token = call_tokens::issue(
        &state.pool,
        address,
        envelope.payload.target_address.as_deref(),
        identity.plan,
        allow_turn,
        true,
        &nonce,
        now,
    )
    .await?;

    state.events.log(format!("call-token issued for {address} (plan {:?})", identity.plan));

    let ice_servers = ice::build_ice_servers(&state.config, identity.plan);

    Ok(Json(CallSessionTokenResponse {
        token: format!("{}:{nonce}", token.token),
        nonce,
        issued_at: token.issued_at.timestamp_millis(),
        expires_at: token.expires_at.timestamp_millis(),
        server_time: now.timestamp_millis(),
        plan: token.plan,
        allow_turn: token.allow_turn,
        allow_video: token.allow_video,
        turn_configured: state.config.turn_mode == TurnMode::Custom,
        ice_servers,
    }))
}
