//! The call policy engine: a pure function from a call attempt plus its
//! surrounding context to one decision. No I/O -- `services/hub` gathers
//! the context (quota reads, contact lookups, blocklist checks) and calls
//! `evaluate` once per attempt.

use serde::{Deserialize, Serialize};

use crate::identity::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowCallsFrom {
    Anyone,
    Contacts,
    InviteOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownCallerBehavior {
    Block,
    RingUnknown,
    Request,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactOverrideMode {
    Blocked,
    Always,
    OneTime,
    Scheduled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub user_address: String,
    pub allow_calls_from: AllowCallsFrom,
    pub unknown_caller_behavior: UnknownCallerBehavior,
    pub max_rings_per_sender: u32,
    pub ring_window_minutes: u32,
    pub auto_block_after_rejections: u32,
}

/// Free-tier quota state fed in by the caller's usage counter. Only
/// consulted when the caller is on the free plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerQuotaState {
    pub call_attempts_hour: u32,
    pub hourly_attempts_cap: u32,
    pub failed_starts_today: u32,
    pub daily_failed_starts_cap: u32,
    pub calls_started_today: u32,
    pub daily_calls_cap: u32,
    pub seconds_used_month: i64,
    pub monthly_seconds_cap: i64,
    pub concurrent_calls: u32,
    pub concurrent_calls_cap: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHoursState {
    pub callee_offline: bool,
    pub within_business_hours: bool,
    pub voicemail_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitePass {
    pub pass_id: String,
    pub valid: bool,
}

/// Every input the evaluation order (§4.5) needs, gathered up front so
/// `evaluate` stays a pure function.
#[derive(Debug, Clone, PartialEq)]
pub struct CallAttempt {
    pub caller_plan: Plan,
    pub callee_plan: Plan,
    pub is_contact: bool,
    pub is_group: bool,
    pub is_external_link: bool,
    pub is_paid_call: bool,
    pub caller_blocked_by_callee: bool,
    pub rejection_count_against_caller: u32,
    pub ring_attempts_in_window: u32,
    pub caller_quota: CallerQuotaState,
    pub pass: Option<InvitePass>,
    pub contact_override: Option<ContactOverrideMode>,
    pub callee_policy: PolicyRecord,
    pub business_hours: BusinessHoursState,
    pub callee_requires_payment: bool,
    pub has_valid_payment_token: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Ring {
        is_unknown: bool,
        consume_pass: Option<String>,
    },
    Request,
    Block {
        reason: &'static str,
        add_to_blocklist: bool,
    },
    AutoReply {
        message: String,
    },
}

fn block(reason: &'static str) -> PolicyDecision {
    PolicyDecision::Block {
        reason,
        add_to_blocklist: false,
    }
}

/// Evaluates one call attempt. First matching rule wins, in the order
/// specified: hard blocklist, auto-block threshold, ring rate limit,
/// free-tier quotas, free-tier callee ban, contact requirement, invite
/// pass, per-contact override, `allow_calls_from`, business-hours/DND,
/// payment gate.
pub fn evaluate(attempt: &CallAttempt) -> PolicyDecision {
    if attempt.caller_blocked_by_callee {
        return block("blocked");
    }

    if attempt.rejection_count_against_caller >= attempt.callee_policy.auto_block_after_rejections
        && attempt.callee_policy.auto_block_after_rejections > 0
    {
        return PolicyDecision::Block {
            reason: "blocked",
            add_to_blocklist: true,
        };
    }

    if attempt.ring_attempts_in_window > attempt.callee_policy.max_rings_per_sender {
        return block("rate_limited");
    }

    if !attempt.caller_plan.is_paid() {
        if let Some(reason) = quota_breach(&attempt.caller_quota) {
            return block(reason);
        }
    }

    if !attempt.callee_plan.is_paid()
        && (attempt.is_group || attempt.is_external_link)
        && !attempt.is_paid_call
    {
        return block("not_approved_contact");
    }

    let has_valid_pass = attempt.pass.as_ref().is_some_and(|p| p.valid);
    if !attempt.is_contact
        && !has_valid_pass
        && (!attempt.caller_plan.is_paid() || !attempt.callee_plan.is_paid())
    {
        return block("not_approved_contact");
    }

    if let Some(pass) = &attempt.pass {
        if pass.valid {
            return PolicyDecision::Ring {
                is_unknown: !attempt.is_contact,
                consume_pass: Some(pass.pass_id.clone()),
            };
        }
    }

    if let Some(mode) = attempt.contact_override {
        return match mode {
            ContactOverrideMode::Blocked => block("blocked"),
            ContactOverrideMode::Always | ContactOverrideMode::OneTime | ContactOverrideMode::Scheduled => {
                PolicyDecision::Ring {
                    is_unknown: false,
                    consume_pass: None,
                }
            }
        };
    }

    let from_allow_calls = match attempt.callee_policy.allow_calls_from {
        AllowCallsFrom::Anyone => Some(PolicyDecision::Ring {
            is_unknown: !attempt.is_contact,
            consume_pass: None,
        }),
        AllowCallsFrom::InviteOnly => Some(block("not_approved_contact")),
        AllowCallsFrom::Contacts => {
            if attempt.is_contact {
                Some(PolicyDecision::Ring {
                    is_unknown: false,
                    consume_pass: None,
                })
            } else {
                match attempt.callee_policy.unknown_caller_behavior {
                    UnknownCallerBehavior::Block => Some(block("not_approved_contact")),
                    UnknownCallerBehavior::RingUnknown => Some(PolicyDecision::Ring {
                        is_unknown: true,
                        consume_pass: None,
                    }),
                    UnknownCallerBehavior::Request => Some(PolicyDecision::Request),
                }
            }
        }
    };

    if let Some(decision) = from_allow_calls {
        if !matches!(decision, PolicyDecision::Ring { .. }) {
            return decision;
        }
        // A `ring` from allow_calls_from is still subject to business-hours
        // and the payment gate below before it's final.
        if attempt.business_hours.callee_offline && attempt.business_hours.within_business_hours {
            return if attempt.business_hours.voicemail_enabled {
                PolicyDecision::AutoReply {
                    message: "The person you are calling is unavailable. Leave a message after the tone."
                        .to_string(),
                }
            } else {
                block("dnd")
            };
        }
        if attempt.callee_requires_payment && !attempt.has_valid_payment_token {
            return block("payment_required");
        }
        return decision;
    }

    block("not_approved_contact")
}

fn quota_breach(quota: &CallerQuotaState) -> Option<&'static str> {
    if quota.call_attempts_hour >= quota.hourly_attempts_cap {
        return Some("limit_hourly_attempts");
    }
    if quota.failed_starts_today >= quota.daily_failed_starts_cap {
        return Some("limit_daily_failed_starts");
    }
    if quota.calls_started_today >= quota.daily_calls_cap {
        return Some("limit_daily_calls");
    }
    if quota.seconds_used_month >= quota.monthly_seconds_cap {
        return Some("limit_monthly_seconds");
    }
    if quota.concurrent_calls >= quota.concurrent_calls_cap {
        return Some("limit_concurrent_calls");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_policy() -> PolicyRecord {
        PolicyRecord {
            user_address: "call:callee".to_string(),
            allow_calls_from: AllowCallsFrom::Contacts,
            unknown_caller_behavior: UnknownCallerBehavior::Block,
            max_rings_per_sender: 5,
            ring_window_minutes: 10,
            auto_block_after_rejections: 3,
        }
    }

    fn roomy_quota() -> CallerQuotaState {
        CallerQuotaState {
            call_attempts_hour: 0,
            hourly_attempts_cap: 20,
            failed_starts_today: 0,
            daily_failed_starts_cap: 10,
            calls_started_today: 0,
            daily_calls_cap: 5,
            seconds_used_month: 0,
            monthly_seconds_cap: 100_000,
            concurrent_calls: 0,
            concurrent_calls_cap: 1,
        }
    }

    fn base_attempt() -> CallAttempt {
        CallAttempt {
            caller_plan: Plan::Pro,
            callee_plan: Plan::Pro,
            is_contact: true,
            is_group: false,
            is_external_link: false,
            is_paid_call: false,
            caller_blocked_by_callee: false,
            rejection_count_against_caller: 0,
            ring_attempts_in_window: 0,
            caller_quota: roomy_quota(),
            pass: None,
            contact_override: None,
            callee_policy: base_policy(),
            business_hours: BusinessHoursState {
                callee_offline: false,
                within_business_hours: false,
                voicemail_enabled: false,
            },
            callee_requires_payment: false,
            has_valid_payment_token: false,
        }
    }

    #[test]
    fn mutual_contacts_ring() {
        let decision = evaluate(&base_attempt());
        assert_eq!(
            decision,
            PolicyDecision::Ring {
                is_unknown: false,
                consume_pass: None
            }
        );
    }

    #[test]
    fn hard_blocklist_wins_over_everything() {
        let mut attempt = base_attempt();
        attempt.caller_blocked_by_callee = true;
        assert_eq!(
            evaluate(&attempt),
            PolicyDecision::Block {
                reason: "blocked",
                add_to_blocklist: false
            }
        );
    }

    #[test]
    fn auto_block_threshold_adds_to_blocklist() {
        let mut attempt = base_attempt();
        attempt.rejection_count_against_caller = 3;
        assert_eq!(
            evaluate(&attempt),
            PolicyDecision::Block {
                reason: "blocked",
                add_to_blocklist: true
            }
        );
    }

    #[test]
    fn free_tier_daily_call_cap_blocks_sixth_call() {
        let mut attempt = base_attempt();
        attempt.caller_plan = Plan::Free;
        attempt.callee_plan = Plan::Free;
        attempt.caller_quota.calls_started_today = 5;
        attempt.caller_quota.daily_calls_cap = 5;
        assert_eq!(
            evaluate(&attempt),
            PolicyDecision::Block {
                reason: "limit_daily_calls",
                add_to_blocklist: false
            }
        );
    }

    #[test]
    fn free_tier_fifth_call_is_accepted() {
        let mut attempt = base_attempt();
        attempt.caller_plan = Plan::Free;
        attempt.callee_plan = Plan::Free;
        attempt.caller_quota.calls_started_today = 4;
        attempt.caller_quota.daily_calls_cap = 5;
        assert!(matches!(evaluate(&attempt), PolicyDecision::Ring { .. }));
    }

    #[test]
    fn non_contact_without_pass_blocked_on_free_tier() {
        let mut attempt = base_attempt();
        attempt.is_contact = false;
        attempt.caller_plan = Plan::Free;
        assert_eq!(
            evaluate(&attempt),
            PolicyDecision::Block {
                reason: "not_approved_contact",
                add_to_blocklist: false
            }
        );
    }

    #[test]
    fn valid_pass_rings_and_is_consumed() {
        let mut attempt = base_attempt();
        attempt.is_contact = false;
        attempt.caller_plan = Plan::Free;
        attempt.pass = Some(InvitePass {
            pass_id: "pass-1".to_string(),
            valid: true,
        });
        assert_eq!(
            evaluate(&attempt),
            PolicyDecision::Ring {
                is_unknown: true,
                consume_pass: Some("pass-1".to_string())
            }
        );
    }

    #[test]
    fn allow_calls_from_anyone_rings_non_contact() {
        let mut attempt = base_attempt();
        attempt.is_contact = false;
        attempt.callee_policy.allow_calls_from = AllowCallsFrom::Anyone;
        assert_eq!(
            evaluate(&attempt),
            PolicyDecision::Ring {
                is_unknown: true,
                consume_pass: None
            }
        );
    }

    #[test]
    fn invite_only_blocks_non_contact() {
        let mut attempt = base_attempt();
        attempt.is_contact = false;
        attempt.callee_policy.allow_calls_from = AllowCallsFrom::InviteOnly;
        assert_eq!(
            evaluate(&attempt),
            PolicyDecision::Block {
                reason: "not_approved_contact",
                add_to_blocklist: false
            }
        );
    }

    #[test]
    fn unknown_caller_behavior_request_when_contacts_only() {
        let mut attempt = base_attempt();
        attempt.is_contact = false;
        attempt.callee_policy.allow_calls_from = AllowCallsFrom::Anyone;
        attempt.callee_policy.unknown_caller_behavior = UnknownCallerBehavior::Request;
        // allow_calls_from::Anyone takes priority over unknown_caller_behavior,
        // which only applies under Contacts.
        assert!(matches!(evaluate(&attempt), PolicyDecision::Ring { .. }));
    }

    #[test]
    fn dnd_blocks_when_offline_in_business_hours_without_voicemail() {
        let mut attempt = base_attempt();
        attempt.business_hours.callee_offline = true;
        attempt.business_hours.within_business_hours = true;
        attempt.business_hours.voicemail_enabled = false;
        assert_eq!(
            evaluate(&attempt),
            PolicyDecision::Block {
                reason: "dnd",
                add_to_blocklist: false
            }
        );
    }

    #[test]
    fn voicemail_auto_replies_instead_of_blocking() {
        let mut attempt = base_attempt();
        attempt.business_hours.callee_offline = true;
        attempt.business_hours.within_business_hours = true;
        attempt.business_hours.voicemail_enabled = true;
        assert!(matches!(evaluate(&attempt), PolicyDecision::AutoReply { .. }));
    }

    #[test]
    fn payment_gate_blocks_without_valid_token() {
        let mut attempt = base_attempt();
        attempt.callee_requires_payment = true;
        attempt.has_valid_payment_token = false;
        assert_eq!(
            evaluate(&attempt),
            PolicyDecision::Block {
                reason: "payment_required",
                add_to_blocklist: false
            }
        );
    }

    #[test]
    fn payment_gate_passes_with_valid_token() {
        let mut attempt = base_attempt();
        attempt.callee_requires_payment = true;
        attempt.has_valid_payment_token = true;
        assert!(matches!(evaluate(&attempt), PolicyDecision::Ring { .. }));
    }
}
