#[path = "support/mod.rs"]
mod support;

use hub::repo::usage_counters;
use hub_protocol::{CallInit, CallSessionTokenRequest, CallSessionTokenResponse, ServerEvent, WsMessage};
use support::{connected_identity, TestServer};

/// A free-tier caller who has already hit the daily-calls cap is blocked
/// with `limit_daily_calls`, even against a callee who would otherwise
/// accept unconditionally -- the quota check runs ahead of the contact gate.
#[tokio::test]
async fn caller_over_daily_calls_cap_is_blocked() {
    let server = TestServer::start().await;
    let (caller, mut caller_ws) = connected_identity(&server).await;
    let (callee, _callee_ws) = connected_identity(&server).await;

    let now = chrono::Utc::now();
    let mut usage = usage_counters::get_or_create(&server.state.pool, &caller.address, now)
        .await
        .expect("seed usage counter");
    for _ in 0..5 {
        usage.increment_calls_started(now);
    }
    usage_counters::save(&server.state.pool, &usage).await.expect("persist usage counter");

    let client = reqwest::Client::new();
    let token_envelope = caller.sign_envelope(
        CallSessionTokenRequest { address: caller.address.clone(), target_address: None },
        now.timestamp_millis(),
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
        ServerEvent::CallBlocked { reason } => assert_eq!(reason, "limit_daily_calls"),
        other => panic!("expected CallBlocked, got {other:?}"),
    }
}
