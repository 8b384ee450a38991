use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Single-use, short-TTL credential required to initiate a call.
pub const CALL_TOKEN_TTL: Duration = Duration::minutes(10);

/// Invariant I3: `used_at` transitions nil -> non-nil exactly once, enforced
/// atomically by the repo layer (a single `UPDATE ... WHERE used_at IS
/// NULL`), never by a read-then-write here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSessionToken {
    pub token: Uuid,
    pub nonce_hash: String,
    pub user_address: String,
    pub target_address: Option<String>,
    pub plan: String,
    pub allow_turn: bool,
    pub allow_video: bool,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub used_by_ip: Option<String>,
}

impl CallSessionToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_at(issued_at: DateTime<Utc>) -> CallSessionToken {
        CallSessionToken {
            token: Uuid::nil(),
            nonce_hash: String::new(),
            user_address: "call:a".to_string(),
            target_address: None,
            plan: "free".to_string(),
            allow_turn: false,
            allow_video: true,
            issued_at,
            expires_at: issued_at + CALL_TOKEN_TTL,
            used_at: None,
            used_by_ip: None,
        }
    }

    #[test]
    fn token_valid_one_ms_before_expiry() {
        let issued_at = Utc::now();
        let token = token_at(issued_at);
        let just_before = issued_at + CALL_TOKEN_TTL - Duration::milliseconds(1);
        assert!(!token.is_expired(just_before));
    }

    #[test]
    fn token_expired_one_ms_after_expiry() {
        let issued_at = Utc::now();
        let token = token_at(issued_at);
        let just_after = issued_at + CALL_TOKEN_TTL + Duration::milliseconds(1);
        assert!(token.is_expired(just_after));
    }
}
