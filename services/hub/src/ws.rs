//! The signaling router: one task pair (reader + writer) per connection.
//! The reader verifies every inbound envelope, dispatches it against the
//! call/message/policy state, and the writer drains whatever lands in the
//! connection's `OutboundFrame` channel back onto the socket.

use axum::extract::ws::{Message as WsFrame, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use hub_core::policy::PolicyDecision;
use hub_protocol::{
    error_codes, CallIncoming, ConversationWire, ErrorMessage, MessageWire, ServerEvent, WsEnvelope,
    WsMessage,
};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::call::{active_call, policy_gather};
use crate::envelope::verify_envelope;
use crate::error::HubError;
use crate::registry::{Connection, OutboundFrame};
use crate::repo::{call_tokens, conversations, identities, messages, policy, usage_counters};
use crate::ringing::RingState;
use crate::state::AppState;

/// A connection that sends nothing for this long is dropped. Generous enough
/// to tolerate a client that's only ever a listener between calls -- `ping`
/// frames are the expected keepalive, not a hard requirement.
const CONNECTION_IDLE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

pub async fn handle_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(64);
    let connection_id = state.next_connection_id();
    let connection = Connection::new(connection_id, tx);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let encoded = match frame {
                OutboundFrame::Event(event) => serde_json::to_string(&event),
                OutboundFrame::Relay(envelope) => serde_json::to_string(&envelope),
            };
            let Ok(text) = encoded else { continue };
            if sink.send(WsFrame::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut registered_address: Option<String> = None;

    loop {
        let next = tokio::time::timeout(CONNECTION_IDLE_TIMEOUT, stream.next()).await;
        let frame = match next {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(_))) | Ok(None) | Err(_) => break,
        };
        match frame {
            WsFrame::Text(text) => {
                dispatch_text(&state, &connection, &mut registered_address, &text).await;
            }
            WsFrame::Close(_) => break,
            WsFrame::Ping(_) | WsFrame::Pong(_) | WsFrame::Binary(_) => {}
        }
    }

    if let Some(address) = &registered_address {
        state.connections.unregister(address, connection_id).await;
    }
    writer.abort();
}

async fn dispatch_text(
    state: &AppState,
    connection: &Connection,
    registered_address: &mut Option<String>,
    text: &str,
) {
    let envelope: WsEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(_) => {
            send_error(connection, error_codes::BAD_SIGNATURE, "malformed envelope", false).await;
            return;
        }
    };

    if let Err(err) = verify_envelope(&envelope, &state.nonces).await {
        send_error(connection, err.wire_code(), &err.to_string(), false).await;
        return;
    }

    connection.touch();
    if let Some(address) = registered_address.as_deref() {
        state.connections.touch(address).await;
        if address != envelope.from_address && !matches!(envelope.payload, WsMessage::Register(_)) {
            send_error(
                connection,
                error_codes::NOT_REGISTERED,
                "connection is bound to a different address",
                false,
            )
            .await;
            return;
        }
    }

    let from_address = envelope.from_address.clone();
    let now = Utc::now();

    if !matches!(envelope.payload, WsMessage::Register(_)) {
        if let Err(err) = require_registered(registered_address.as_deref()) {
            send_error(connection, err.wire_code(), &err.to_string(), false).await;
            return;
        }
    }

    let result = match envelope.payload {
        WsMessage::Register(_) => {
            handle_register(state, connection, registered_address, &from_address, &envelope.from_pubkey, now).await
        }
        WsMessage::CallInit(ref init) => handle_call_init(state, connection, &from_address, init, now).await,
        WsMessage::CallAccept(ref accept) => handle_call_accept(state, connection, &from_address, accept, now).await,
        WsMessage::CallReject(ref reject) => handle_call_reject(state, connection, &from_address, reject, now).await,
        WsMessage::CallEnd(ref end) => handle_call_end(state, connection, &from_address, end, now).await,
        WsMessage::WebrtcOffer(_) | WsMessage::WebrtcAnswer(_) | WsMessage::WebrtcIce(_) => {
            relay_webrtc(state, connection, &from_address, &envelope).await
        }
        WsMessage::MsgSend(ref send) => handle_msg_send(state, connection, &from_address, send, now).await,
        WsMessage::MsgRead(ref read) => handle_msg_read(state, connection, &from_address, read).await,
        WsMessage::MsgTyping(_) => relay_typing(state, &from_address, &envelope).await,
        WsMessage::GroupCreate(ref create) => handle_group_create(state, connection, &from_address, create, now).await,
        WsMessage::GroupLeave(ref leave) => handle_group_leave(state, &from_address, leave).await,
        WsMessage::GroupRemoveMember(ref remove) => handle_group_remove_member(state, &from_address, remove).await,
        WsMessage::Policy(ref family) => handle_policy_family(state, connection, &from_address, family).await,
        WsMessage::Pass(ref family) => handle_pass_family(state, connection, &from_address, family).await,
        WsMessage::Block(ref family) => handle_block_family(state, connection, &from_address, family).await,
        WsMessage::Routing(_) | WsMessage::Wallet(_) => {
            connection.send_event(ServerEvent::Success { in_reply_to: None }).await;
            Ok(())
        }
        WsMessage::Ping(_) => {
            connection.send_event(ServerEvent::Pong {}).await;
            Ok(())
        }
        WsMessage::Pong(_) => Ok(()),
        WsMessage::Unknown { .. } => Err(HubError::UnknownMessageType),
    };

    if let Err(err) = result {
        send_error(connection, err.wire_code(), &err.to_string(), matches!(err, HubError::Database(_))).await;
    }
}

async fn send_error(connection: &Connection, code: &'static str, message: &str, retryable: bool) {
    connection
        .send_event(ServerEvent::Error(ErrorMessage::new(code, message, retryable)))
        .await;
}

async fn handle_register(
    state: &AppState,
    connection: &Connection,
    registered_address: &mut Option<String>,
    address: &str,
    public_key: &str,
    now: DateTime<Utc>,
) -> Result<(), HubError> {
    identities::get_or_register(&state.pool, address, public_key, now).await?;
    if let Some(displaced) = state.connections.register(address, connection.clone()).await {
        if displaced.id() != connection.id() {
            displaced.send_event(ServerEvent::Error(ErrorMessage::new(
                error_codes::NOT_REGISTERED,
                "superseded by a newer connection",
                false,
            )))
            .await;
        }
    }
    *registered_address = Some(address.to_owned());

    let pending = messages::get_pending_for_address(&state.pool, address).await?;
    for msg in &pending {
        connection.send_event(ServerEvent::MsgIncoming(to_message_wire(msg))).await;
        messages::mark_delivered(&state.pool, msg.id).await?;
    }

    connection.send_event(ServerEvent::Success { in_reply_to: None }).await;
    Ok(())
}

fn require_registered(registered: Option<&str>) -> Result<(), HubError> {
    if registered.is_none() {
        return Err(HubError::NotRegistered);
    }
    Ok(())
}

async fn handle_call_init(
    state: &AppState,
    connection: &Connection,
    caller_address: &str,
    init: &hub_protocol::CallInit,
    now: DateTime<Utc>,
) -> Result<(), HubError> {
    // `call_session_token` is `<token-uuid>:<nonce>` -- the opaque credential
    // issued by `/api/call-session-token`. The uuid identifies the row, the
    // nonce is the secret whose hash the row stores.
    let (token_part, nonce_part) = init
        .call_session_token
        .split_once(':')
        .ok_or(HubError::TokenNotFound)?;
    let token = Uuid::parse_str(token_part).map_err(|_| HubError::TokenNotFound)?;
    let token_record = match call_tokens::verify_and_consume(&state.pool, token, nonce_part, "ws", now).await {
        Ok(record) => {
            state.events.log(format!("call-token used by {caller_address}"));
            record
        }
        Err(err) => {
            state.events.log(format!("call-token rejected for {caller_address}: {err}"));
            return Err(err);
        }
    };
    if token_record.user_address != caller_address {
        return Err(HubError::AddressMismatch);
    }
    if let Some(scoped_target) = &token_record.target_address {
        if scoped_target != &init.target_address {
            return Err(HubError::AddressMismatch);
        }
    }
    let callee_address = init.target_address.clone();

    let attempt = policy_gather::gather(
        &state.pool,
        &state.connections,
        state.payment_gate.as_ref(),
        caller_address,
        &callee_address,
        false,
        false,
        false,
        None,
        now,
    )
    .await?;

    usage_counters::get_or_create(&state.pool, caller_address, now).await?;
    usage_counters::increment_call_attempts(&state.pool, caller_address, now).await?;

    let decision = hub_core::policy::evaluate(&attempt);
    match decision {
        PolicyDecision::Block { reason, add_to_blocklist } => {
            state.events.log(format!("call blocked: {caller_address} -> {callee_address} ({reason})"));
            usage_counters::increment_failed_starts(&state.pool, caller_address, now).await?;
            if add_to_blocklist {
                policy::add_to_blocklist(&state.pool, &callee_address, caller_address).await?;
            }
            if reason == "dnd" {
                connection.send_event(ServerEvent::CallDnd {}).await;
            } else {
                connection
                    .send_event(ServerEvent::CallBlocked { reason: reason.to_owned() })
                    .await;
            }
        }
        PolicyDecision::AutoReply { message } => {
            state.events.log(format!("call auto-replied: {caller_address} -> {callee_address}"));
            let msg = messages::append(
                &state.pool,
                hub_core::direct_conversation_id(caller_address, &callee_address),
                &callee_address,
                caller_address,
                &message,
                Some("system/autoreply"),
                now,
            )
            .await?;
            connection
                .send_event(ServerEvent::MsgIncoming(to_message_wire(&msg)))
                .await;
            connection.send_event(ServerEvent::CallUnavailable {}).await;
        }
        PolicyDecision::Ring { .. } | PolicyDecision::Request => {
            state.events.log(format!("call ringing: {caller_address} -> {callee_address}"));
            policy::record_ring_attempt(&state.pool, &callee_address, caller_address, now).await?;

            let (is_request, is_unknown, consume_pass) = match decision {
                PolicyDecision::Ring { is_unknown, consume_pass } => (false, is_unknown, consume_pass),
                _ => (true, true, None),
            };

            let call_session_id = Uuid::new_v4();
            let caller_plan = attempt.caller_plan;
            let callee_plan = attempt.callee_plan;
            state
                .rings
                .insert(
                    call_session_id,
                    RingState {
                        caller_address: caller_address.to_owned(),
                        callee_address: callee_address.clone(),
                        caller_plan,
                        callee_plan,
                        video: init.video,
                        consume_pass,
                        rung_at: now,
                    },
                )
                .await;

            let incoming = CallIncoming {
                call_session_id: call_session_id.to_string(),
                from_address: caller_address.to_owned(),
                video: init.video,
                is_unknown,
            };

            match state.connections.get(&callee_address).await {
                Some(callee_conn) => {
                    let event = if is_request {
                        ServerEvent::CallRequest(incoming)
                    } else {
                        ServerEvent::CallIncoming(incoming)
                    };
                    callee_conn.send_event(event).await;
                    connection
                        .send_event(ServerEvent::CallRinging {
                            call_session_id: call_session_id.to_string(),
                        })
                        .await;
                }
                None => {
                    state.rings.remove(call_session_id).await;
                    return Err(HubError::RecipientOffline);
                }
            }
        }
    }
    Ok(())
}

async fn handle_call_accept(
    state: &AppState,
    connection: &Connection,
    callee_address: &str,
    accept: &hub_protocol::CallAccept,
    now: DateTime<Utc>,
) -> Result<(), HubError> {
    let call_session_id = Uuid::parse_str(&accept.call_session_id).map_err(|_| HubError::BadRequest("bad call id".into()))?;
    let ring = state.rings.remove(call_session_id).await.ok_or(HubError::NotFound)?;
    if ring.callee_address != callee_address {
        return Err(HubError::AddressMismatch);
    }

    if let Some(pass_id) = &ring.consume_pass {
        policy::consume_invite_pass(&state.pool, pass_id).await?;
    }

    let call = active_call::start(
        &state.pool,
        call_session_id,
        &ring.caller_address,
        &ring.callee_address,
        ring.caller_plan,
        ring.callee_plan,
        now,
    )
    .await?;

    usage_counters::get_or_create(&state.pool, &ring.caller_address, now).await?;
    usage_counters::increment_calls_started(&state.pool, &ring.caller_address, now).await?;

    if let Some(caller_conn) = state.connections.get(&ring.caller_address).await {
        caller_conn
            .send_event(ServerEvent::CallConnecting {
                call_session_id: call.call_session_id.to_string(),
            })
            .await;
    }
    connection
        .send_event(ServerEvent::CallConnecting {
            call_session_id: call.call_session_id.to_string(),
        })
        .await;
    Ok(())
}

async fn handle_call_reject(
    state: &AppState,
    connection: &Connection,
    callee_address: &str,
    reject: &hub_protocol::CallReject,
    now: DateTime<Utc>,
) -> Result<(), HubError> {
    let call_session_id = Uuid::parse_str(&reject.call_session_id).map_err(|_| HubError::BadRequest("bad call id".into()))?;
    let ring = state.rings.remove(call_session_id).await.ok_or(HubError::NotFound)?;
    if ring.callee_address != callee_address {
        return Err(HubError::AddressMismatch);
    }

    policy::mark_last_ring_rejected(&state.pool, &ring.callee_address, &ring.caller_address).await?;
    usage_counters::get_or_create(&state.pool, &ring.caller_address, now).await?;
    usage_counters::increment_failed_starts(&state.pool, &ring.caller_address, now).await?;

    if let Some(caller_conn) = state.connections.get(&ring.caller_address).await {
        caller_conn
            .send_event(ServerEvent::CallBlocked {
                reason: reject.reason.clone().unwrap_or_else(|| "rejected".to_owned()),
            })
            .await;
    }
    connection.send_event(ServerEvent::Success { in_reply_to: None }).await;
    Ok(())
}

async fn handle_call_end(
    state: &AppState,
    connection: &Connection,
    address: &str,
    end: &hub_protocol::CallEnd,
    now: DateTime<Utc>,
) -> Result<(), HubError> {
    let call_session_id = Uuid::parse_str(&end.call_session_id).map_err(|_| HubError::BadRequest("bad call id".into()))?;

    if let Some(call) = crate::repo::active_calls::get(&state.pool, call_session_id).await? {
        if call.caller_address != address && call.callee_address != address {
            return Err(HubError::AddressMismatch);
        }
        active_call::end(&state.pool, &call, now).await?;
        let event = ServerEvent::CallEnded {
            call_session_id: call.call_session_id.to_string(),
            reason: "ended".to_owned(),
        };
        for peer in [&call.caller_address, &call.callee_address] {
            if peer != address {
                if let Some(conn) = state.connections.get(peer).await {
                    conn.send_event(event.clone()).await;
                }
            }
        }
        connection.send_event(ServerEvent::Success { in_reply_to: None }).await;
        return Ok(());
    }

    if let Some(ring) = state.rings.remove(call_session_id).await {
        if ring.caller_address != address && ring.callee_address != address {
            return Err(HubError::AddressMismatch);
        }
        let other = if ring.caller_address == address { &ring.callee_address } else { &ring.caller_address };
        if let Some(conn) = state.connections.get(other).await {
            conn.send_event(ServerEvent::CallUnavailable {}).await;
        }
        connection.send_event(ServerEvent::Success { in_reply_to: None }).await;
        return Ok(());
    }

    Err(HubError::NotFound)
}

/// Forwards a WebRTC signaling envelope verbatim to the other side of the
/// call -- the hub never inspects or re-signs SDP/ICE payloads.
async fn relay_webrtc(
    state: &AppState,
    connection: &Connection,
    from_address: &str,
    envelope: &WsEnvelope,
) -> Result<(), HubError> {
    let call_session_id_str = match &envelope.payload {
        WsMessage::WebrtcOffer(o) => &o.call_session_id,
        WsMessage::WebrtcAnswer(a) => &a.call_session_id,
        WsMessage::WebrtcIce(i) => &i.call_session_id,
        _ => unreachable!(),
    };
    let call_session_id = Uuid::parse_str(call_session_id_str).map_err(|_| HubError::BadRequest("bad call id".into()))?;

    let other = if let Some(call) = crate::repo::active_calls::get(&state.pool, call_session_id).await? {
        if call.caller_address == from_address {
            call.callee_address
        } else if call.callee_address == from_address {
            call.caller_address
        } else {
            return Err(HubError::AddressMismatch);
        }
    } else if let Some(ring) = state.rings.get(call_session_id).await {
        if ring.caller_address == from_address {
            ring.callee_address
        } else if ring.callee_address == from_address {
            ring.caller_address
        } else {
            return Err(HubError::AddressMismatch);
        }
    } else {
        return Err(HubError::NotFound);
    };

    match state.connections.get(&other).await {
        Some(conn) => {
            conn.send_relay(envelope.clone()).await;
            if matches!(envelope.payload, WsMessage::WebrtcIce(_)) {
                crate::repo::active_calls::mark_relay_used(&state.pool, call_session_id)
                    .await
                    .ok();
            }
            connection.send_event(ServerEvent::Success { in_reply_to: None }).await;
            Ok(())
        }
        None => Err(HubError::RecipientOffline),
    }
}

/// Typing indicators have no `ServerEvent` variant -- ephemeral, unpersisted,
/// best-effort. Dropped silently if the recipient isn't connected.
async fn relay_typing(state: &AppState, _from_address: &str, envelope: &WsEnvelope) -> Result<(), HubError> {
    let WsMessage::MsgTyping(typing) = &envelope.payload else {
        unreachable!()
    };
    let convo_id = Uuid::parse_str(&typing.convo_id).map_err(|_| HubError::BadRequest("bad convo id".into()))?;
    if let Some(convo) = conversations::get(&state.pool, convo_id).await? {
        for participant in &convo.participants {
            if participant != &envelope.from_address {
                if let Some(conn) = state.connections.get(participant).await {
                    conn.send_relay(envelope.clone()).await;
                }
            }
        }
    }
    Ok(())
}

fn to_message_wire(msg: &hub_core::Message) -> MessageWire {
    MessageWire {
        id: msg.id.to_string(),
        convo_id: msg.convo_id.to_string(),
        from_address: msg.from_address.clone(),
        to_address: msg.to_address.clone(),
        content: msg.content.clone(),
        media_type: msg.media_type.clone(),
        seq: msg.seq,
        server_timestamp: msg.server_timestamp.timestamp_millis(),
        status: messages::status_wire_name(msg.status).to_owned(),
    }
}

fn to_conversation_wire(convo: &hub_core::Conversation) -> ConversationWire {
    ConversationWire {
        id: convo.id.to_string(),
        kind: conversations::kind_wire_name(convo.kind).to_owned(),
        participants: convo.participants.clone(),
        created_at: convo.created_at.timestamp_millis(),
        last_message_seq: convo.last_message_seq,
    }
}

async fn handle_msg_send(
    state: &AppState,
    connection: &Connection,
    from_address: &str,
    send: &hub_protocol::MsgSend,
    now: DateTime<Utc>,
) -> Result<(), HubError> {
    let convo_id = match &send.convo_id {
        Some(id) => Uuid::parse_str(id).map_err(|_| HubError::BadRequest("bad convo id".into()))?,
        None => conversations::get_or_create_direct(&state.pool, from_address, &send.to_address, now)
            .await?
            .id,
    };

    let msg = messages::append(
        &state.pool,
        convo_id,
        from_address,
        &send.to_address,
        &send.content,
        send.media_type.as_deref(),
        now,
    )
    .await?;

    if let Some(recipient) = state.connections.get(&send.to_address).await {
        recipient.send_event(ServerEvent::MsgIncoming(to_message_wire(&msg))).await;
        messages::mark_delivered(&state.pool, msg.id).await?;
    }

    connection.send_event(ServerEvent::Success { in_reply_to: send.client_message_id.clone() }).await;
    Ok(())
}

async fn handle_msg_read(
    state: &AppState,
    connection: &Connection,
    from_address: &str,
    read: &hub_protocol::MsgRead,
) -> Result<(), HubError> {
    let convo_id = Uuid::parse_str(&read.convo_id).map_err(|_| HubError::BadRequest("bad convo id".into()))?;
    messages::mark_read_up_to(&state.pool, convo_id, from_address, read.up_to_seq).await?;

    if let Some(convo) = conversations::get(&state.pool, convo_id).await? {
        for participant in &convo.participants {
            if participant != from_address {
                if let Some(conn) = state.connections.get(participant).await {
                    conn.send_event(ServerEvent::MsgRead {
                        convo_id: read.convo_id.clone(),
                        up_to_seq: read.up_to_seq,
                        by_address: from_address.to_owned(),
                    })
                    .await;
                }
            }
        }
    }
    connection.send_event(ServerEvent::Success { in_reply_to: None }).await;
    Ok(())
}

async fn handle_group_create(
    state: &AppState,
    connection: &Connection,
    from_address: &str,
    create: &hub_protocol::GroupCreate,
    now: DateTime<Utc>,
) -> Result<(), HubError> {
    let mut participants = create.participants.clone();
    if !participants.iter().any(|p| p == from_address) {
        participants.push(from_address.to_owned());
    }
    let convo = conversations::create_group(&state.pool, participants.clone(), now).await?;
    let wire = to_conversation_wire(&convo);
    for participant in &participants {
        if let Some(conn) = state.connections.get(participant).await {
            conn.send_event(ServerEvent::GroupCreated(wire.clone())).await;
        }
    }
    connection.send_event(ServerEvent::Success { in_reply_to: None }).await;
    Ok(())
}

async fn handle_group_leave(
    state: &AppState,
    from_address: &str,
    leave: &hub_protocol::GroupLeave,
) -> Result<(), HubError> {
    let convo_id = Uuid::parse_str(&leave.convo_id).map_err(|_| HubError::BadRequest("bad convo id".into()))?;
    let convo = conversations::get(&state.pool, convo_id).await?.ok_or(HubError::NotFound)?;
    conversations::remove_participant(&state.pool, convo_id, from_address).await?;
    for participant in &convo.participants {
        if participant != from_address {
            if let Some(conn) = state.connections.get(participant).await {
                conn.send_event(ServerEvent::GroupMemberLeft {
                    convo_id: leave.convo_id.clone(),
                    member_address: from_address.to_owned(),
                })
                .await;
            }
        }
    }
    Ok(())
}

async fn handle_group_remove_member(
    state: &AppState,
    from_address: &str,
    remove: &hub_protocol::GroupRemoveMember,
) -> Result<(), HubError> {
    let convo_id = Uuid::parse_str(&remove.convo_id).map_err(|_| HubError::BadRequest("bad convo id".into()))?;
    let convo = conversations::get(&state.pool, convo_id).await?.ok_or(HubError::NotFound)?;
    if !convo.participants.iter().any(|p| p == from_address) {
        return Err(HubError::AddressMismatch);
    }
    conversations::remove_participant(&state.pool, convo_id, &remove.member_address).await?;
    for participant in &convo.participants {
        if let Some(conn) = state.connections.get(participant).await {
            conn.send_event(ServerEvent::GroupMemberLeft {
                convo_id: remove.convo_id.clone(),
                member_address: remove.member_address.clone(),
            })
            .await;
        }
    }
    Ok(())
}

async fn handle_policy_family(
    state: &AppState,
    connection: &Connection,
    from_address: &str,
    family: &hub_protocol::FamilyMessage,
) -> Result<(), HubError> {
    match family.kind.as_str() {
        "policy:set" => {
            let mut record = policy::get_policy_record(&state.pool, from_address).await?;
            if let Some(v) = family.fields.get("allow_calls_from").and_then(|v| v.as_str()) {
                record.allow_calls_from = match v {
                    "anyone" => hub_core::policy::AllowCallsFrom::Anyone,
                    "invite_only" => hub_core::policy::AllowCallsFrom::InviteOnly,
                    _ => hub_core::policy::AllowCallsFrom::Contacts,
                };
            }
            if let Some(v) = family.fields.get("unknown_caller_behavior").and_then(|v| v.as_str()) {
                record.unknown_caller_behavior = match v {
                    "ring_unknown" => hub_core::policy::UnknownCallerBehavior::RingUnknown,
                    "request" => hub_core::policy::UnknownCallerBehavior::Request,
                    _ => hub_core::policy::UnknownCallerBehavior::Block,
                };
            }
            if let Some(v) = family.fields.get("max_rings_per_sender").and_then(|v| v.as_u64()) {
                record.max_rings_per_sender = v as u32;
            }
            if let Some(v) = family.fields.get("auto_block_after_rejections").and_then(|v| v.as_u64()) {
                record.auto_block_after_rejections = v as u32;
            }
            policy::upsert_policy_record(&state.pool, &record).await?;
            connection.send_event(ServerEvent::Success { in_reply_to: None }).await;
            Ok(())
        }
        _ => Err(HubError::UnknownMessageType),
    }
}

async fn handle_pass_family(
    state: &AppState,
    connection: &Connection,
    from_address: &str,
    family: &hub_protocol::FamilyMessage,
) -> Result<(), HubError> {
    match family.kind.as_str() {
        "pass:create" => {
            let pass_id = Uuid::new_v4().to_string();
            let kind = match family.fields.get("kind").and_then(|v| v.as_str()) {
                Some("unlimited") => "unlimited",
                _ => "limited",
            };
            let uses = family.fields.get("uses").and_then(|v| v.as_i64()).unwrap_or(1) as i32;
            policy::create_invite_pass(&state.pool, &pass_id, from_address, kind, uses).await?;
            connection.send_event(ServerEvent::Success { in_reply_to: Some(pass_id) }).await;
            Ok(())
        }
        "pass:use" => {
            let Some(pass_id) = family.fields.get("pass_id").and_then(|v| v.as_str()) else {
                return Err(HubError::BadRequest("missing pass_id".into()));
            };
            policy::consume_invite_pass(&state.pool, pass_id).await?;
            connection
                .send_event(ServerEvent::PassUsed {
                    pass_id: pass_id.to_owned(),
                    by_address: from_address.to_owned(),
                })
                .await;
            Ok(())
        }
        _ => Err(HubError::UnknownMessageType),
    }
}

async fn handle_block_family(
    state: &AppState,
    connection: &Connection,
    from_address: &str,
    family: &hub_protocol::FamilyMessage,
) -> Result<(), HubError> {
    let Some(blocked_address) = family.fields.get("address").and_then(|v| v.as_str()) else {
        return Err(HubError::BadRequest("missing address".into()));
    };
    match family.kind.as_str() {
        "block:add" => policy::add_to_blocklist(&state.pool, from_address, blocked_address).await?,
        "block:remove" => policy::remove_from_blocklist(&state.pool, from_address, blocked_address).await?,
        _ => return Err(HubError::UnknownMessageType),
    }
    connection.send_event(ServerEvent::Success { in_reply_to: None }).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_idle_timeout_is_positive() {
        assert!(CONNECTION_IDLE_TIMEOUT > std::time::Duration::from_secs(0));
    }

    #[test]
    fn family_kind_dispatch_is_case_sensitive() {
        assert_ne!("policy:set", "Policy:Set");
    }
}
