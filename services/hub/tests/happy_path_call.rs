#[path = "support/mod.rs"]
mod support;

use hub_protocol::{
    CallAccept, CallEnd, CallInit, CallSessionTokenRequest, CallSessionTokenResponse, ServerEvent,
    WsMessage,
};
use support::{connected_identity, TestServer};

/// End to end: mint a call-session token over HTTP, ring over the socket,
/// accept, and end -- the callee should see every expected event in order.
#[tokio::test]
async fn full_call_lifecycle_succeeds() {
    let server = TestServer::start().await;
    let (caller, mut caller_ws) = connected_identity(&server).await;
    let (callee, mut callee_ws) = connected_identity(&server).await;

    let client = reqwest::Client::new();
    let token_envelope = caller.sign_envelope(
        CallSessionTokenRequest { address: caller.address.clone(), target_address: None },
        chrono::Utc::now().timestamp_millis(),
        "token-nonce",
    );
    let response = client
        .post(server.http_url("/api/call-session-token"))
        .json(&token_envelope)
        .send()
        .await
        .expect("request call-session-token");
    assert_eq!(response.status(), 200);
    let token: CallSessionTokenResponse = response.json().await.expect("token body");

    let init = CallInit {
        target_address: callee.address.clone(),
        call_session_token: token.token,
        video: false,
    };
    let init_envelope = caller.sign_envelope(
        WsMessage::CallInit(init),
        chrono::Utc::now().timestamp_millis(),
        "call-init-nonce",
    );
    caller_ws.send_envelope(&init_envelope).await.expect("send call:init");

    let incoming = callee_ws.recv_event().await.expect("call incoming");
    let call_session_id = match incoming {
        ServerEvent::CallIncoming(incoming) => incoming.call_session_id,
        other => panic!("expected CallIncoming, got {other:?}"),
    };
    let ringing = caller_ws.recv_event().await.expect("call ringing");
    assert!(matches!(ringing, ServerEvent::CallRinging { .. }));

    let accept_envelope = callee.sign_envelope(
        WsMessage::CallAccept(CallAccept { call_session_id: call_session_id.clone() }),
        chrono::Utc::now().timestamp_millis(),
        "call-accept-nonce",
    );
    callee_ws.send_envelope(&accept_envelope).await.expect("send call:accept");

    let caller_connecting = caller_ws.recv_event().await.expect("caller connecting");
    assert!(matches!(caller_connecting, ServerEvent::CallConnecting { .. }));
    let callee_connecting = callee_ws.recv_event().await.expect("callee connecting");
    assert!(matches!(callee_connecting, ServerEvent::CallConnecting { .. }));

    let end_envelope = caller.sign_envelope(
        WsMessage::CallEnd(CallEnd { call_session_id: call_session_id.clone() }),
        chrono::Utc::now().timestamp_millis(),
        "call-end-nonce",
    );
    caller_ws.send_envelope(&end_envelope).await.expect("send call:end");

    let caller_ack = caller_ws.recv_event().await.expect("caller end ack");
    assert!(matches!(caller_ack, ServerEvent::Success { .. }));
    let callee_ended = callee_ws.recv_event().await.expect("callee sees call ended");
    assert!(matches!(callee_ended, ServerEvent::CallEnded { .. }));
}
