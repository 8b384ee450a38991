use chrono::{DateTime, Duration, Utc};
use hub_core::policy::{AllowCallsFrom, ContactOverrideMode, PolicyRecord, UnknownCallerBehavior};
use sqlx::{PgPool, Row};

use crate::error::HubError;

/// Same rolling-window shape as the relay penalty in `hub_core::usage_counter`:
/// the auto-block threshold counts rejections in the trailing 24h rather than
/// forever, so a caller who was blocked once a month ago isn't punished
/// indefinitely.
const REJECTION_WINDOW: Duration = Duration::hours(24);

fn allow_calls_from_to_str(v: AllowCallsFrom) -> &'static str {
    match v {
        AllowCallsFrom::Anyone => "anyone",
        AllowCallsFrom::Contacts => "contacts",
        AllowCallsFrom::InviteOnly => "invite_only",
    }
}

fn allow_calls_from_from_str(s: &str) -> AllowCallsFrom {
    match s {
        "anyone" => AllowCallsFrom::Anyone,
        "invite_only" => AllowCallsFrom::InviteOnly,
        _ => AllowCallsFrom::Contacts,
    }
}

fn unknown_caller_behavior_from_str(s: &str) -> UnknownCallerBehavior {
    match s {
        "ring_unknown" => UnknownCallerBehavior::RingUnknown,
        "request" => UnknownCallerBehavior::Request,
        _ => UnknownCallerBehavior::Block,
    }
}

fn unknown_caller_behavior_to_str(v: UnknownCallerBehavior) -> &'static str {
    match v {
        UnknownCallerBehavior::Block => "block",
        UnknownCallerBehavior::RingUnknown => "ring_unknown",
        UnknownCallerBehavior::Request => "request",
    }
}

fn contact_override_mode_from_str(s: &str) -> ContactOverrideMode {
    match s {
        "always" => ContactOverrideMode::Always,
        "one_time" => ContactOverrideMode::OneTime,
        "scheduled" => ContactOverrideMode::Scheduled,
        _ => ContactOverrideMode::Blocked,
    }
}

fn default_policy(user_address: &str) -> PolicyRecord {
    PolicyRecord {
        user_address: user_address.to_string(),
        allow_calls_from: AllowCallsFrom::Contacts,
        unknown_caller_behavior: UnknownCallerBehavior::Block,
        max_rings_per_sender: 5,
        ring_window_minutes: 10,
        auto_block_after_rejections: 3,
    }
}

pub async fn get_policy_record(
    pool: &PgPool,
    user_address: &str,
) -> Result<PolicyRecord, HubError> {
    let row = sqlx::query("SELECT * FROM policies WHERE user_address = $1")
        .bind(user_address)
        .fetch_optional(pool)
        .await?;
    Ok(match row {
        Some(row) => PolicyRecord {
            user_address: row.get("user_address"),
            allow_calls_from: allow_calls_from_from_str(row.get("allow_calls_from")),
            unknown_caller_behavior: unknown_caller_behavior_from_str(row.get("unknown_caller_behavior")),
            max_rings_per_sender: row.get::<i32, _>("max_rings_per_sender") as u32,
            ring_window_minutes: row.get::<i32, _>("ring_window_minutes") as u32,
            auto_block_after_rejections: row.get::<i32, _>("auto_block_after_rejections") as u32,
        },
        None => default_policy(user_address),
    })
}

pub async fn upsert_policy_record(pool: &PgPool, record: &PolicyRecord) -> Result<(), HubError> {
    sqlx::query(
        r"
        INSERT INTO policies (
            user_address, allow_calls_from, unknown_caller_behavior,
            max_rings_per_sender, ring_window_minutes, auto_block_after_rejections
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (user_address) DO UPDATE SET
            allow_calls_from = EXCLUDED.allow_calls_from,
            unknown_caller_behavior = EXCLUDED.unknown_caller_behavior,
            max_rings_per_sender = EXCLUDED.max_rings_per_sender,
            ring_window_minutes = EXCLUDED.ring_window_minutes,
            auto_block_after_rejections = EXCLUDED.auto_block_after_rejections
        ",
    )
    .bind(&record.user_address)
    .bind(allow_calls_from_to_str(record.allow_calls_from))
    .bind(unknown_caller_behavior_to_str(record.unknown_caller_behavior))
    .bind(record.max_rings_per_sender as i32)
    .bind(record.ring_window_minutes as i32)
    .bind(record.auto_block_after_rejections as i32)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn is_blocked(
    pool: &PgPool,
    owner_address: &str,
    candidate_address: &str,
    now: DateTime<Utc>,
) -> Result<bool, HubError> {
    let row = sqlx::query(
        r"
        SELECT EXISTS (
            SELECT 1 FROM blocklist
            WHERE owner_address = $1 AND blocked_address = $2
              AND (blocked_until IS NULL OR blocked_until > $3)
        ) AS present
        ",
    )
    .bind(owner_address)
    .bind(candidate_address)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(row.get("present"))
}

pub async fn add_to_blocklist(
    pool: &PgPool,
    owner_address: &str,
    blocked_address: &str,
) -> Result<(), HubError> {
    sqlx::query(
        r"
        INSERT INTO blocklist (owner_address, blocked_address, blocked_until)
        VALUES ($1, $2, NULL)
        ON CONFLICT (owner_address, blocked_address) DO NOTHING
        ",
    )
    .bind(owner_address)
    .bind(blocked_address)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn contact_override(
    pool: &PgPool,
    owner_address: &str,
    contact_address: &str,
    now: DateTime<Utc>,
) -> Result<Option<ContactOverrideMode>, HubError> {
    let row = sqlx::query(
        r"
        SELECT mode FROM contact_overrides
        WHERE owner_address = $1 AND contact_address = $2
          AND (expires_at IS NULL OR expires_at > $3)
        ",
    )
    .bind(owner_address)
    .bind(contact_address)
    .bind(now)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| contact_override_mode_from_str(r.get("mode"))))
}

pub async fn ring_attempts_in_window(
    pool: &PgPool,
    callee_address: &str,
    caller_address: &str,
    window: Duration,
    now: DateTime<Utc>,
) -> Result<u32, HubError> {
    let count: i64 = sqlx::query_scalar(
        r"
        SELECT COUNT(*) FROM ring_attempts
        WHERE callee_address = $1 AND caller_address = $2 AND rung_at > $3
        ",
    )
    .bind(callee_address)
    .bind(caller_address)
    .bind(now - window)
    .fetch_one(pool)
    .await?;
    Ok(count.max(0) as u32)
}

pub async fn rejection_count_against_caller(
    pool: &PgPool,
    callee_address: &str,
    caller_address: &str,
    now: DateTime<Utc>,
) -> Result<u32, HubError> {
    let count: i64 = sqlx::query_scalar(
        r"
        SELECT COUNT(*) FROM ring_attempts
        WHERE callee_address = $1 AND caller_address = $2 AND rejected = true AND rung_at > $3
        ",
    )
    .bind(callee_address)
    .bind(caller_address)
    .bind(now - REJECTION_WINDOW)
    .fetch_one(pool)
    .await?;
    Ok(count.max(0) as u32)
}

pub async fn record_ring_attempt(
    pool: &PgPool,
    callee_address: &str,
    caller_address: &str,
    now: DateTime<Utc>,
) -> Result<(), HubError> {
    sqlx::query(
        "INSERT INTO ring_attempts (callee_address, caller_address, rung_at, rejected) VALUES ($1, $2, $3, false)",
    )
    .bind(callee_address)
    .bind(caller_address)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Marks the most recent ring attempt for this pair as rejected, so it
/// counts toward the auto-block threshold.
pub async fn mark_last_ring_rejected(
    pool: &PgPool,
    callee_address: &str,
    caller_address: &str,
) -> Result<(), HubError> {
    sqlx::query(
        r"
        UPDATE ring_attempts SET rejected = true WHERE ctid = (
            SELECT ctid FROM ring_attempts
            WHERE callee_address = $1 AND caller_address = $2
            ORDER BY rung_at DESC LIMIT 1
        )
        ",
    )
    .bind(callee_address)
    .bind(caller_address)
    .execute(pool)
    .await?;
    Ok(())
}

/// An `unlimited` pass is valid as long as the row exists; a `limited` one
/// also needs `uses_remaining > 0`.
pub async fn lookup_valid_invite_pass(
    pool: &PgPool,
    pass_id: &str,
    issuer_address: &str,
) -> Result<bool, HubError> {
    let row = sqlx::query(
        "SELECT kind, uses_remaining FROM invite_passes WHERE pass_id = $1 AND issuer_address = $2",
    )
    .bind(pass_id)
    .bind(issuer_address)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some_and(|r| {
        let kind: String = r.get("kind");
        kind == "unlimited" || r.get::<i32, _>("uses_remaining") > 0
    }))
}

/// Unlimited passes never decrement -- `uses_remaining` is meaningless for
/// them, so the `WHERE` clause only guards the limited case.
pub async fn consume_invite_pass(pool: &PgPool, pass_id: &str) -> Result<(), HubError> {
    sqlx::query(
        r"
        UPDATE invite_passes SET uses_remaining = uses_remaining - 1
        WHERE pass_id = $1 AND kind = 'limited' AND uses_remaining > 0
        ",
    )
    .bind(pass_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_invite_pass(
    pool: &PgPool,
    pass_id: &str,
    issuer_address: &str,
    kind: &str,
    uses_remaining: i32,
) -> Result<(), HubError> {
    sqlx::query(
        r"
        INSERT INTO invite_passes (pass_id, issuer_address, kind, uses_remaining)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (pass_id) DO UPDATE SET kind = EXCLUDED.kind, uses_remaining = EXCLUDED.uses_remaining
        ",
    )
    .bind(pass_id)
    .bind(issuer_address)
    .bind(kind)
    .bind(uses_remaining)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn remove_from_blocklist(
    pool: &PgPool,
    owner_address: &str,
    blocked_address: &str,
) -> Result<(), HubError> {
    sqlx::query("DELETE FROM blocklist WHERE owner_address = $1 AND blocked_address = $2")
        .bind(owner_address)
        .bind(blocked_address)
        .execute(pool)
        .await?;
    Ok(())
}
