use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::Plan;

const FREE_TIER_BASE_MAX_SECONDS: i64 = 15 * 60;
const FREE_TIER_RELAY_PENALTY_MAX_SECONDS: i64 = 5 * 60;
pub const STALE_HEARTBEAT_THRESHOLD: Duration = Duration::seconds(45);

/// Invariant I5: at most one active-call row per participant for free-tier
/// users -- enforced by the repo layer before insert, not by this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveCall {
    pub call_session_id: Uuid,
    pub caller_address: String,
    pub callee_address: String,
    pub caller_tier: Plan,
    pub callee_tier: Plan,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat_caller: DateTime<Utc>,
    pub last_heartbeat_callee: DateTime<Utc>,
    pub max_duration_seconds: Option<i64>,
    pub relay_used: bool,
}

impl ActiveCall {
    /// Both heartbeats older than the stale threshold, as of `now`.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_heartbeat_caller) > STALE_HEARTBEAT_THRESHOLD
            && now.signed_duration_since(self.last_heartbeat_callee) > STALE_HEARTBEAT_THRESHOLD
    }

    pub fn exceeded_duration_cap(&self, now: DateTime<Utc>) -> bool {
        match self.max_duration_seconds {
            Some(cap) => now.signed_duration_since(self.started_at).num_seconds() >= cap,
            None => false,
        }
    }

    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.started_at).num_seconds().max(0)
    }
}

/// Max duration for one free-tier participant: base 15 min, reduced to 5
/// min under a relay penalty, then clamped to whatever monthly seconds
/// remain. Paid tiers have no cap (`None`).
pub fn participant_max_duration_seconds(
    tier: Plan,
    relay_penalty_active: bool,
    remaining_monthly_seconds: i64,
) -> Option<i64> {
    if tier.is_paid() {
        return None;
    }
    let base = if relay_penalty_active {
        FREE_TIER_RELAY_PENALTY_MAX_SECONDS
    } else {
        FREE_TIER_BASE_MAX_SECONDS
    };
    Some(base.min(remaining_monthly_seconds.max(0)))
}

/// The call's effective cap is the tighter of both participants' caps.
/// `None` (paid / uncapped) only wins when the other side is also `None`.
pub fn effective_max_duration_seconds(caller_cap: Option<i64>, callee_cap: Option<i64>) -> Option<i64> {
    match (caller_cap, callee_cap) {
        (None, None) => None,
        (Some(a), None) | (None, Some(a)) => Some(a),
        (Some(a), Some(b)) => Some(a.min(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_penalty_reduces_free_tier_cap() {
        let normal = participant_max_duration_seconds(Plan::Free, false, 100_000);
        let penalized = participant_max_duration_seconds(Plan::Free, true, 100_000);
        assert_eq!(normal, Some(FREE_TIER_BASE_MAX_SECONDS));
        assert_eq!(penalized, Some(FREE_TIER_RELAY_PENALTY_MAX_SECONDS));
    }

    #[test]
    fn paid_tier_has_no_cap() {
        assert_eq!(participant_max_duration_seconds(Plan::Pro, true, 0), None);
    }

    #[test]
    fn effective_cap_is_the_tighter_side() {
        assert_eq!(effective_max_duration_seconds(Some(900), Some(300)), Some(300));
        assert_eq!(effective_max_duration_seconds(None, Some(300)), Some(300));
        assert_eq!(effective_max_duration_seconds(None, None), None);
    }

    #[test]
    fn monthly_remaining_clamps_the_cap() {
        let capped = participant_max_duration_seconds(Plan::Free, false, 120);
        assert_eq!(capped, Some(120));
    }
}
