#[path = "support/mod.rs"]
mod support;

use chrono::Duration;
use hub::repo::active_calls;
use hub_core::{ActiveCall, Plan};
use hub_test_utils::TestIdentity;
use sqlx::Row;
use support::TestServer;
use uuid::Uuid;

/// A call whose both heartbeats are older than the stale threshold is
/// swept: removed from `active_calls` and archived into `call_history`.
/// Exercises the same query `call::sweeper::run` polls, without waiting out
/// its real interval loop.
#[tokio::test]
async fn stale_call_is_archived_on_sweep() {
    let server = TestServer::start().await;
    let caller = TestIdentity::generate();
    let callee = TestIdentity::generate();
    let now = chrono::Utc::now();

    seed_identity(&server, &caller.address).await;
    seed_identity(&server, &callee.address).await;

    let stale_heartbeat = now - Duration::seconds(120);
    let call = ActiveCall {
        call_session_id: Uuid::new_v4(),
        caller_address: caller.address.clone(),
        callee_address: callee.address.clone(),
        caller_tier: Plan::Free,
        callee_tier: Plan::Free,
        started_at: stale_heartbeat,
        last_heartbeat_caller: stale_heartbeat,
        last_heartbeat_callee: stale_heartbeat,
        max_duration_seconds: None,
        relay_used: false,
    };
    active_calls::insert(&server.state.pool, &call).await.expect("insert active call");

    let stale = active_calls::all_stale_or_expired(&server.state.pool, now)
        .await
        .expect("query stale calls");
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].call_session_id, call.call_session_id);

    active_calls::end_and_archive(&server.state.pool, &stale[0], now)
        .await
        .expect("archive stale call");

    assert!(active_calls::get(&server.state.pool, call.call_session_id)
        .await
        .expect("lookup after archive")
        .is_none());

    let archived = sqlx::query("SELECT * FROM call_history WHERE call_session_id = $1")
        .bind(call.call_session_id)
        .fetch_one(&server.state.pool)
        .await
        .expect("archived row exists");
    let caller_address: String = archived.get("caller_address");
    assert_eq!(caller_address, caller.address);
}

async fn seed_identity(server: &TestServer, address: &str) {
    sqlx::query("INSERT INTO identities (address, public_key) VALUES ($1, $2)")
        .bind(address)
        .bind("unused")
        .execute(&server.state.pool)
        .await
        .expect("seed identity");
}
