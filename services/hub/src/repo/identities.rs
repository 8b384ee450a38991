use chrono::{DateTime, Utc};
use hub_core::{Identity, Plan, Role, TrialState};
use sqlx::{PgPool, Row};

use crate::error::HubError;

pub(crate) fn plan_to_str(plan: Plan) -> &'static str {
    match plan {
        Plan::Free => "free",
        Plan::Pro => "pro",
        Plan::Business => "business",
        Plan::Enterprise => "enterprise",
    }
}

pub(crate) fn plan_from_str(s: &str) -> Plan {
    match s {
        "pro" => Plan::Pro,
        "business" => Plan::Business,
        "enterprise" => Plan::Enterprise,
        _ => Plan::Free,
    }
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Support => "support",
        Role::Admin => "admin",
        Role::SuperAdmin => "super_admin",
        Role::UltraGodAdmin => "ultra_god_admin",
        Role::Founder => "founder",
    }
}

fn role_from_str(s: &str) -> Role {
    match s {
        "support" => Role::Support,
        "admin" => Role::Admin,
        "super_admin" => Role::SuperAdmin,
        "ultra_god_admin" => Role::UltraGodAdmin,
        "founder" => Role::Founder,
        _ => Role::User,
    }
}

fn trial_state_to_str(state: TrialState) -> &'static str {
    match state {
        TrialState::None => "none",
        TrialState::Active => "active",
        TrialState::Expired => "expired",
    }
}

fn trial_state_from_str(s: &str) -> TrialState {
    match s {
        "active" => TrialState::Active,
        "expired" => TrialState::Expired,
        _ => TrialState::None,
    }
}

fn row_to_identity(row: &sqlx::postgres::PgRow) -> Identity {
    Identity {
        address: row.get("address"),
        public_key: row.get("public_key"),
        plan: plan_from_str(row.get("plan")),
        plan_status: row.get("plan_status"),
        role: role_from_str(row.get("role")),
        trial_state: trial_state_from_str(row.get("trial_state")),
        suspended: row.get("suspended"),
        created_at: row.get("created_at"),
    }
}

pub async fn get(pool: &PgPool, address: &str) -> Result<Option<Identity>, HubError> {
    let row = sqlx::query("SELECT * FROM identities WHERE address = $1")
        .bind(address)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(row_to_identity))
}

/// Registers `address` if it's never been seen, otherwise leaves its
/// identity row untouched and just returns it. Registration carries no
/// plan/role elevation -- those only change through billing webhooks or
/// admin action, neither of which exist yet (see Non-goals).
pub async fn get_or_register(
    pool: &PgPool,
    address: &str,
    public_key: &str,
    now: DateTime<Utc>,
) -> Result<Identity, HubError> {
    let row = sqlx::query(
        r"
        INSERT INTO identities (address, public_key, plan, plan_status, role, trial_state, suspended, created_at)
        VALUES ($1, $2, 'free', 'active', 'user', 'none', false, $3)
        ON CONFLICT (address) DO UPDATE SET address = identities.address
        RETURNING *
        ",
    )
    .bind(address)
    .bind(public_key)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(row_to_identity(&row))
}

pub fn plan_wire_name(plan: Plan) -> &'static str {
    plan_to_str(plan)
}

pub fn role_wire_name(role: Role) -> &'static str {
    role_to_str(role)
}

pub fn trial_state_wire_name(state: TrialState) -> &'static str {
    trial_state_to_str(state)
}
