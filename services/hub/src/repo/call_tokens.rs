use chrono::{DateTime, Utc};
use hub_core::{CallSessionToken, CALL_TOKEN_TTL};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::identities::plan_to_str;
use crate::error::HubError;
use hub_core::Plan;

fn row_to_token(row: &sqlx::postgres::PgRow) -> CallSessionToken {
    CallSessionToken {
        token: row.get("token"),
        nonce_hash: row.get("nonce_hash"),
        user_address: row.get("user_address"),
        target_address: row.get("target_address"),
        plan: row.get("plan"),
        allow_turn: row.get("allow_turn"),
        allow_video: row.get("allow_video"),
        issued_at: row.get("issued_at"),
        expires_at: row.get("expires_at"),
        used_at: row.get("used_at"),
        used_by_ip: row.get("used_by_ip"),
    }
}

pub fn hash_nonce(nonce: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce.as_bytes());
    hex::encode(hasher.finalize())
}

/// Issues a fresh call-session token. The caller picks `nonce` (a random
/// string minted per §4.6) and only its SHA-256 hash is persisted, matching
/// the teacher's bearer-token-hash pattern in `auth.rs` — the hub never
/// stores a secret it can present back to an attacker who reads the table.
#[allow(clippy::too_many_arguments)]
pub async fn issue(
    pool: &PgPool,
    user_address: &str,
    target_address: Option<&str>,
    plan: Plan,
    allow_turn: bool,
    allow_video: bool,
    nonce: &str,
    now: DateTime<Utc>,
) -> Result<CallSessionToken, HubError> {
    let token = Uuid::new_v4();
    let nonce_hash = hash_nonce(nonce);
    let expires_at = now + CALL_TOKEN_TTL;
    let row = sqlx::query(
        r"
        INSERT INTO call_tokens (
            token, nonce_hash, user_address, target_address, plan,
            allow_turn, allow_video, issued_at, expires_at, used_at, used_by_ip
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NULL, NULL)
        RETURNING *
        ",
    )
    .bind(token)
    .bind(&nonce_hash)
    .bind(user_address)
    .bind(target_address)
    .bind(plan_to_str(plan))
    .bind(allow_turn)
    .bind(allow_video)
    .bind(now)
    .bind(expires_at)
    .fetch_one(pool)
    .await?;
    Ok(row_to_token(&row))
}

/// Looks up `token`, verifies `nonce` against its stored hash, checks
/// expiry, then atomically transitions `used_at` from nil to `now` — the
/// single-use guarantee (invariant I3) lives entirely in the `WHERE
/// used_at IS NULL` clause, never in a read-then-write.
pub async fn verify_and_consume(
    pool: &PgPool,
    token: Uuid,
    nonce: &str,
    used_by_ip: &str,
    now: DateTime<Utc>,
) -> Result<CallSessionToken, HubError> {
    let row = sqlx::query("SELECT * FROM call_tokens WHERE token = $1")
        .bind(token)
        .fetch_optional(pool)
        .await?
        .ok_or(HubError::TokenNotFound)?;
    let record = row_to_token(&row);

    if record.nonce_hash != hash_nonce(nonce) {
        return Err(HubError::TokenNotFound);
    }
    if record.is_expired(now) {
        return Err(HubError::TokenExpired);
    }

    let updated = sqlx::query(
        "UPDATE call_tokens SET used_at = $2, used_by_ip = $3 WHERE token = $1 AND used_at IS NULL RETURNING *",
    )
    .bind(token)
    .bind(now)
    .bind(used_by_ip)
    .fetch_optional(pool)
    .await?;

    match updated {
        Some(row) => Ok(row_to_token(&row)),
        None => Err(HubError::TokenReplay),
    }
}

pub async fn prune_expired(pool: &PgPool, now: DateTime<Utc>) -> Result<(), HubError> {
    sqlx::query("DELETE FROM call_tokens WHERE expires_at < $1")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(())
}
