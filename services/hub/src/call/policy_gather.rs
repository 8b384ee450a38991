use chrono::{DateTime, Duration, Utc};
use hub_core::policy::{BusinessHoursState, CallAttempt, CallerQuotaState, InvitePass};
use sqlx::PgPool;

use crate::call::payment::PaymentGate;
use crate::error::HubError;
use crate::registry::ConnectionRegistry;
use crate::repo::{active_calls, contacts, identities, policy, usage_counters};

/// Quota caps. Not config-driven yet (no per-plan override table in scope) --
/// free-tier limits are the values spec.md's testable-properties scenarios
/// exercise directly.
const HOURLY_ATTEMPTS_CAP: u32 = 20;
const DAILY_FAILED_STARTS_CAP: u32 = 10;
const DAILY_CALLS_CAP: u32 = 5;
const MONTHLY_SECONDS_CAP: i64 = 3 * 60 * 60;
const CONCURRENT_CALLS_CAP: u32 = 1;

/// Gathers every input `hub_core::policy::evaluate` needs for one call
/// attempt from `caller_address` to `callee_address`. Pure DB reads only --
/// no mutation, so it's safe to call speculatively before a decision is
/// final.
#[allow(clippy::too_many_arguments)]
pub async fn gather(
    pool: &PgPool,
    connections: &ConnectionRegistry,
    payment_gate: &dyn PaymentGate,
    caller_address: &str,
    callee_address: &str,
    is_group: bool,
    is_external_link: bool,
    is_paid_call: bool,
    pass_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<CallAttempt, HubError> {
    let caller_identity = identities::get(pool, caller_address)
        .await?
        .ok_or(HubError::NotRegistered)?;
    let callee_identity = identities::get(pool, callee_address)
        .await?
        .ok_or(HubError::NotRegistered)?;

    let is_contact = contacts::is_mutual_or_either(pool, caller_address, callee_address).await?;
    let caller_blocked_by_callee = policy::is_blocked(pool, callee_address, caller_address, now).await?;
    let callee_policy = policy::get_policy_record(pool, callee_address).await?;

    let rejection_count_against_caller =
        policy::rejection_count_against_caller(pool, callee_address, caller_address, now).await?;
    let ring_attempts_in_window = policy::ring_attempts_in_window(
        pool,
        callee_address,
        caller_address,
        Duration::minutes(i64::from(callee_policy.ring_window_minutes)),
        now,
    )
    .await?;

    let mut caller_usage = usage_counters::get_or_create(pool, caller_address, now).await?;
    caller_usage.roll_windows(now);
    let concurrent_calls = u32::from(active_calls::has_active_call(pool, caller_address).await?);

    let caller_quota = CallerQuotaState {
        call_attempts_hour: caller_usage.call_attempts_hour,
        hourly_attempts_cap: HOURLY_ATTEMPTS_CAP,
        failed_starts_today: caller_usage.failed_starts_today,
        daily_failed_starts_cap: DAILY_FAILED_STARTS_CAP,
        calls_started_today: caller_usage.calls_started_today,
        daily_calls_cap: DAILY_CALLS_CAP,
        seconds_used_month: caller_usage.seconds_used_month,
        monthly_seconds_cap: MONTHLY_SECONDS_CAP,
        concurrent_calls,
        concurrent_calls_cap: CONCURRENT_CALLS_CAP,
    };

    let pass = match pass_id {
        Some(pass_id) => {
            let valid = policy::lookup_valid_invite_pass(pool, pass_id, callee_address).await?;
            Some(InvitePass {
                pass_id: pass_id.to_string(),
                valid,
            })
        }
        None => None,
    };

    let contact_override = policy::contact_override(pool, callee_address, caller_address, now).await?;

    // No business-hours config table exists yet (Non-goal-adjacent: out of
    // scope until a scheduling UI exists), so this branch of the policy
    // engine is always inert -- the callee is only ever "offline" in the
    // sense of not holding a live connection, which the DND rule doesn't key
    // off of here.
    let business_hours = BusinessHoursState {
        callee_offline: !connections.is_online(callee_address).await,
        within_business_hours: false,
        voicemail_enabled: false,
    };

    Ok(CallAttempt {
        caller_plan: caller_identity.plan,
        callee_plan: callee_identity.plan,
        is_contact,
        is_group,
        is_external_link,
        is_paid_call,
        caller_blocked_by_callee,
        rejection_count_against_caller,
        ring_attempts_in_window,
        caller_quota,
        pass,
        contact_override,
        callee_policy,
        business_hours,
        callee_requires_payment: payment_gate.callee_requires_payment(callee_address),
        has_valid_payment_token: payment_gate.has_valid_payment_token(caller_address, callee_address),
    })
}
