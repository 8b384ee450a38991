#[path = "support/mod.rs"]
mod support;

use hub_protocol::{CallInit, CallSessionTokenRequest, CallSessionTokenResponse, ServerEvent, WsMessage};
use support::{connected_identity, TestServer};

/// A caller who is not an approved contact and holds no invite pass is
/// blocked under the default policy (`allow_calls_from = contacts`,
/// `unknown_caller_behavior = block`) -- no setup beyond two fresh
/// identities is required to exercise the gate.
#[tokio::test]
async fn non_contact_caller_without_pass_is_blocked() {
    let server = TestServer::start().await;
    let (caller, mut caller_ws) = connected_identity(&server).await;
    let (callee, _callee_ws) = connected_identity(&server).await;

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
    let token: CallSessionTokenResponse = response.json().await.expect("token body");

    let init_envelope = caller.sign_envelope(
        WsMessage::CallInit(CallInit {
            target_address: callee.address.clone(),
            call_session_token: token.token,
            video: false,
        }),
        chrono::Utc::now().timestamp_millis(),
        "call-init-nonce",
    );
    caller_ws.send_envelope(&init_envelope).await.expect("send call:init");

    let response = caller_ws.recv_event().await.expect("blocked response");
    match response {
        ServerEvent::CallBlocked { reason } => assert_eq!(reason, "not_approved_contact"),
        other => panic!("expected CallBlocked, got {other:?}"),
    }
}
