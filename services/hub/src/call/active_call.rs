use chrono::{DateTime, Utc};
use hub_core::{effective_max_duration_seconds, participant_max_duration_seconds, ActiveCall, Plan};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::HubError;
use crate::repo::{active_calls, usage_counters};

const MONTHLY_SECONDS_CAP: i64 = 3 * 60 * 60;

async fn remaining_monthly_seconds(
    pool: &PgPool,
    address: &str,
    now: DateTime<Utc>,
) -> Result<(i64, bool), HubError> {
    let mut counter = usage_counters::get_or_create(pool, address, now).await?;
    counter.roll_windows(now);
    let remaining = (MONTHLY_SECONDS_CAP - counter.seconds_used_month).max(0);
    Ok((remaining, counter.relay_penalty_active(now)))
}

/// Starts a new active-call row, computing each participant's duration cap
/// from their plan, relay-penalty status, and remaining monthly seconds, and
/// taking the tighter of the two as the call's effective cap.
pub async fn start(
    pool: &PgPool,
    call_session_id: Uuid,
    caller_address: &str,
    callee_address: &str,
    caller_plan: Plan,
    callee_plan: Plan,
    now: DateTime<Utc>,
) -> Result<ActiveCall, HubError> {
    let (caller_remaining, caller_relay_penalty) =
        remaining_monthly_seconds(pool, caller_address, now).await?;
    let (callee_remaining, callee_relay_penalty) =
        remaining_monthly_seconds(pool, callee_address, now).await?;

    let caller_cap = participant_max_duration_seconds(caller_plan, caller_relay_penalty, caller_remaining);
    let callee_cap = participant_max_duration_seconds(callee_plan, callee_relay_penalty, callee_remaining);
    let max_duration_seconds = effective_max_duration_seconds(caller_cap, callee_cap);

    let call = ActiveCall {
        call_session_id,
        caller_address: caller_address.to_string(),
        callee_address: callee_address.to_string(),
        caller_tier: caller_plan,
        callee_tier: callee_plan,
        started_at: now,
        last_heartbeat_caller: now,
        last_heartbeat_callee: now,
        max_duration_seconds,
        relay_used: false,
    };
    active_calls::insert(pool, &call).await?;
    Ok(call)
}

/// Ends `call`, archiving it and recording seconds used against both
/// participants' monthly counters.
pub async fn end(pool: &PgPool, call: &ActiveCall, ended_at: DateTime<Utc>) -> Result<(), HubError> {
    let elapsed = call.elapsed_seconds(ended_at);

    usage_counters::get_or_create(pool, &call.caller_address, ended_at).await?;
    usage_counters::add_seconds_used(pool, &call.caller_address, ended_at, elapsed).await?;
    if call.relay_used {
        usage_counters::increment_relay_calls(pool, &call.caller_address, ended_at).await?;
    }

    usage_counters::get_or_create(pool, &call.callee_address, ended_at).await?;
    usage_counters::add_seconds_used(pool, &call.callee_address, ended_at, elapsed).await?;
    if call.relay_used {
        usage_counters::increment_relay_calls(pool, &call.callee_address, ended_at).await?;
    }

    active_calls::end_and_archive(pool, call, ended_at).await
}
