use chrono::{DateTime, Datelike, Utc};
use hub_core::UsageCounter;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use crate::error::HubError;

fn month_key_to_str((year, month): (i32, u32)) -> String {
    format!("{year:04}-{month:02}")
}

fn month_key_from_str(s: &str) -> (i32, u32) {
    let mut parts = s.splitn(2, '-');
    let year = parts.next().and_then(|y| y.parse().ok()).unwrap_or(1970);
    let month = parts.next().and_then(|m| m.parse().ok()).unwrap_or(1);
    (year, month)
}

fn row_to_counter(row: &sqlx::postgres::PgRow) -> UsageCounter {
    let month_key: String = row.get("month_key");
    let relay_call_timestamps: Json<Vec<DateTime<Utc>>> = row.get("relay_calls_24h_window");
    UsageCounter {
        user_address: row.get("user_address"),
        day_key: row.get("day_key"),
        month_key: month_key_from_str(&month_key),
        calls_started_today: row.get::<i32, _>("calls_started_today") as u32,
        failed_starts_today: row.get::<i32, _>("failed_starts_today") as u32,
        call_attempts_hour: row.get::<i32, _>("call_attempts_hour") as u32,
        last_attempt_hour: row.get("last_attempt_hour"),
        seconds_used_month: row.get("seconds_used_month"),
        relay_call_timestamps: relay_call_timestamps.0,
        relay_penalty_until: row.get("relay_penalty_until"),
    }
}

pub async fn get_or_create(
    pool: &PgPool,
    user_address: &str,
    now: DateTime<Utc>,
) -> Result<UsageCounter, HubError> {
    let fresh = UsageCounter::new(user_address, now);
    let row = sqlx::query(
        r"
        INSERT INTO usage_counters (
            user_address, day_key, month_key, calls_started_today, failed_starts_today,
            call_attempts_hour, last_attempt_hour, seconds_used_month,
            relay_calls_24h_window, relay_penalty_until
        )
        VALUES ($1, $2, $3, 0, 0, 0, $4, 0, $5, NULL)
        ON CONFLICT (user_address) DO UPDATE SET user_address = usage_counters.user_address
        RETURNING *
        ",
    )
    .bind(user_address)
    .bind(fresh.day_key)
    .bind(month_key_to_str(fresh.month_key))
    .bind(now)
    .bind(Json::<Vec<DateTime<Utc>>>(Vec::new()))
    .fetch_one(pool)
    .await?;
    Ok(row_to_counter(&row))
}

/// Invariant I4 (`calls_started_today(u,d) <= 5` and friends): every
/// increment below is one atomic `UPDATE ... SET x = x + $n` guarded by a
/// `CASE WHEN` rollover check, the same shape `active_calls::heartbeat`
/// uses. Two concurrent writers racing a read-modify-write round trip is
/// exactly how an increment gets lost; a single UPDATE statement can't lose
/// one, because Postgres serializes concurrent updates to the same row.
pub async fn increment_call_attempts(
    pool: &PgPool,
    user_address: &str,
    now: DateTime<Utc>,
) -> Result<(), HubError> {
    sqlx::query(
        r"
        UPDATE usage_counters SET
            call_attempts_hour = CASE
                WHEN date_trunc('hour', last_attempt_hour) = date_trunc('hour', $2::timestamptz)
                    THEN call_attempts_hour + 1
                ELSE 1
            END,
            last_attempt_hour = $2
        WHERE user_address = $1
        ",
    )
    .bind(user_address)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Day rollover resets `calls_started_today` and `failed_starts_today`
/// together (mirrors `UsageCounter::roll_windows`), so both are guarded by
/// the same `day_key` comparison.
pub async fn increment_calls_started(
    pool: &PgPool,
    user_address: &str,
    now: DateTime<Utc>,
) -> Result<(), HubError> {
    sqlx::query(
        r"
        UPDATE usage_counters SET
            calls_started_today = CASE WHEN day_key = $2::date THEN calls_started_today + 1 ELSE 1 END,
            failed_starts_today = CASE WHEN day_key = $2::date THEN failed_starts_today ELSE 0 END,
            day_key = $2::date
        WHERE user_address = $1
        ",
    )
    .bind(user_address)
    .bind(now.date_naive())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn increment_failed_starts(
    pool: &PgPool,
    user_address: &str,
    now: DateTime<Utc>,
) -> Result<(), HubError> {
    sqlx::query(
        r"
        UPDATE usage_counters SET
            failed_starts_today = CASE WHEN day_key = $2::date THEN failed_starts_today + 1 ELSE 1 END,
            calls_started_today = CASE WHEN day_key = $2::date THEN calls_started_today ELSE 0 END,
            day_key = $2::date
        WHERE user_address = $1
        ",
    )
    .bind(user_address)
    .bind(now.date_naive())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn add_seconds_used(
    pool: &PgPool,
    user_address: &str,
    now: DateTime<Utc>,
    seconds: i64,
) -> Result<(), HubError> {
    sqlx::query(
        r"
        UPDATE usage_counters SET
            seconds_used_month = CASE WHEN month_key = $2 THEN seconds_used_month + $3 ELSE $3 END,
            month_key = $2
        WHERE user_address = $1
        ",
    )
    .bind(user_address)
    .bind(month_key_to_str((now.year(), now.month())))
    .bind(seconds)
    .execute(pool)
    .await?;
    Ok(())
}

/// The relay-penalty window is a pruned JSONB array, not a plain counter --
/// there's no single atomic SQL expression for "append, drop entries older
/// than 24h, maybe start a 7-day penalty." `SELECT ... FOR UPDATE` row-locks
/// the counter for the rest of the transaction, so a concurrent relay-call
/// increment for the same user blocks until this one commits instead of
/// racing on the same read-modify-write `messages::append` avoids with an
/// advisory lock.
pub async fn increment_relay_calls(
    pool: &PgPool,
    user_address: &str,
    now: DateTime<Utc>,
) -> Result<(), HubError> {
    let mut tx = pool.begin().await?;
    let row = sqlx::query("SELECT * FROM usage_counters WHERE user_address = $1 FOR UPDATE")
        .bind(user_address)
        .fetch_one(&mut *tx)
        .await?;
    let mut counter = row_to_counter(&row);
    counter.increment_relay_calls(now);
    sqlx::query(
        r"
        UPDATE usage_counters SET
            relay_calls_24h_window = $2,
            relay_penalty_until = $3
        WHERE user_address = $1
        ",
    )
    .bind(user_address)
    .bind(Json(counter.relay_call_timestamps))
    .bind(counter.relay_penalty_until)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}
