use chrono::{DateTime, Utc};
use hub_core::ActiveCall;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::identities::{plan_from_str, plan_to_str};
use crate::error::HubError;

fn row_to_active_call(row: &sqlx::postgres::PgRow) -> ActiveCall {
    ActiveCall {
        call_session_id: row.get("call_session_id"),
        caller_address: row.get("caller_address"),
        callee_address: row.get("callee_address"),
        caller_tier: plan_from_str(row.get("caller_tier")),
        callee_tier: plan_from_str(row.get("callee_tier")),
        started_at: row.get("started_at"),
        last_heartbeat_caller: row.get("last_heartbeat_caller"),
        last_heartbeat_callee: row.get("last_heartbeat_callee"),
        max_duration_seconds: row.get("max_duration_seconds"),
        relay_used: row.get("relay_used"),
    }
}

/// Invariant I5: at most one active-call row per participant for free-tier
/// users. Checked here, before insert, rather than relying on a DB
/// constraint that would need to span both `caller_address` and
/// `callee_address` columns.
pub async fn has_active_call(pool: &PgPool, address: &str) -> Result<bool, HubError> {
    let row = sqlx::query(
        "SELECT EXISTS (SELECT 1 FROM active_calls WHERE caller_address = $1 OR callee_address = $1) AS present",
    )
    .bind(address)
    .fetch_one(pool)
    .await?;
    Ok(row.get("present"))
}

pub async fn insert(pool: &PgPool, call: &ActiveCall) -> Result<(), HubError> {
    sqlx::query(
        r"
        INSERT INTO active_calls (
            call_session_id, caller_address, callee_address, caller_tier, callee_tier,
            started_at, last_heartbeat_caller, last_heartbeat_callee, max_duration_seconds, relay_used
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ",
    )
    .bind(call.call_session_id)
    .bind(&call.caller_address)
    .bind(&call.callee_address)
    .bind(plan_to_str(call.caller_tier))
    .bind(plan_to_str(call.callee_tier))
    .bind(call.started_at)
    .bind(call.last_heartbeat_caller)
    .bind(call.last_heartbeat_callee)
    .bind(call.max_duration_seconds)
    .bind(call.relay_used)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get(pool: &PgPool, call_session_id: Uuid) -> Result<Option<ActiveCall>, HubError> {
    let row = sqlx::query("SELECT * FROM active_calls WHERE call_session_id = $1")
        .bind(call_session_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(row_to_active_call))
}

pub async fn heartbeat(
    pool: &PgPool,
    call_session_id: Uuid,
    address: &str,
    now: DateTime<Utc>,
) -> Result<(), HubError> {
    sqlx::query(
        r"
        UPDATE active_calls SET
            last_heartbeat_caller = CASE WHEN caller_address = $2 THEN $3 ELSE last_heartbeat_caller END,
            last_heartbeat_callee = CASE WHEN callee_address = $2 THEN $3 ELSE last_heartbeat_callee END
        WHERE call_session_id = $1
        ",
    )
    .bind(call_session_id)
    .bind(address)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_relay_used(pool: &PgPool, call_session_id: Uuid) -> Result<(), HubError> {
    sqlx::query("UPDATE active_calls SET relay_used = true WHERE call_session_id = $1")
        .bind(call_session_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn all_stale_or_expired(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Vec<ActiveCall>, HubError> {
    let rows = sqlx::query("SELECT * FROM active_calls").fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(row_to_active_call)
        .filter(|call| call.is_stale(now) || call.exceeded_duration_cap(now))
        .collect())
}

/// Ends a call and archives it to `call_history`, in one transaction so a
/// call is never left active with no historical record or vice versa.
pub async fn end_and_archive(
    pool: &PgPool,
    call: &ActiveCall,
    ended_at: DateTime<Utc>,
) -> Result<(), HubError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM active_calls WHERE call_session_id = $1")
        .bind(call.call_session_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        r"
        INSERT INTO call_history (
            call_session_id, caller_address, callee_address, started_at, ended_at,
            seconds_caller, seconds_callee, relay_used
        )
        VALUES ($1, $2, $3, $4, $5, $6, $6, $7)
        ",
    )
    .bind(call.call_session_id)
    .bind(&call.caller_address)
    .bind(&call.callee_address)
    .bind(call.started_at)
    .bind(ended_at)
    .bind(call.elapsed_seconds(ended_at))
    .bind(call.relay_used)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}
