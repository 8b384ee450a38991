use std::time::Duration as StdDuration;

use chrono::Utc;
use hub_protocol::ServerEvent;
use sqlx::PgPool;
use tokio::time::interval;

use crate::call::active_call;
use crate::nonce_memo::NonceMemo;
use crate::registry::ConnectionRegistry;
use crate::repo::{active_calls, call_tokens};

const SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(10);

/// Background loop: forcibly ends stale or duration-capped active calls,
/// prunes expired call-session tokens, and prunes the replay-nonce memo.
/// Runs until the process exits; errors are logged and the loop continues --
/// one failed sweep shouldn't take the hub down.
pub async fn run(pool: PgPool, connections: ConnectionRegistry, nonces: NonceMemo) {
    let mut ticker = interval(SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        let now = Utc::now();

        match active_calls::all_stale_or_expired(&pool, now).await {
            Ok(calls) => {
                for call in calls {
                    let reason = if call.exceeded_duration_cap(now) {
                        "duration_cap"
                    } else {
                        "stale"
                    };
                    if let Err(err) = active_call::end(&pool, &call, now).await {
                        tracing::error!(call_session_id = %call.call_session_id, %err, "failed to archive swept call");
                        continue;
                    }
                    let event = ServerEvent::CallEnded {
                        call_session_id: call.call_session_id.to_string(),
                        reason: reason.to_owned(),
                    };
                    for address in [&call.caller_address, &call.callee_address] {
                        if let Some(conn) = connections.get(address).await {
                            conn.send_event(event.clone()).await;
                        }
                    }
                }
            }
            Err(err) => tracing::error!(%err, "failed to list stale active calls"),
        }

        if let Err(err) = call_tokens::prune_expired(&pool, now).await {
            tracing::error!(%err, "failed to prune expired call tokens");
        }

        nonces.prune(now).await;
    }
}
