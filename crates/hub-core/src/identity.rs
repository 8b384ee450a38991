use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `"call:" + base58(public_key)`. The binding to the key is never stored;
/// it's re-proven by signature on every envelope.
pub fn address_from_pubkey(pubkey: &[u8]) -> String {
    format!("call:{}", bs58::encode(pubkey).into_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,
    Pro,
    Business,
    Enterprise,
}

impl Plan {
    pub fn is_paid(self) -> bool {
        !matches!(self, Plan::Free)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Support,
    Admin,
    SuperAdmin,
    UltraGodAdmin,
    Founder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialState {
    None,
    Active,
    Expired,
}

/// A registered user. Created on first registration, mutated by admins or
/// billing webhooks, never destroyed -- bans are a `suspended` flag, not a
/// delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub address: String,
    pub public_key: String,
    pub plan: Plan,
    pub plan_status: String,
    pub role: Role,
    pub trial_state: TrialState,
    pub suspended: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_prefixed_base58() {
        let pubkey = [1u8, 2, 3, 4];
        let addr = address_from_pubkey(&pubkey);
        assert!(addr.starts_with("call:"));
        assert_eq!(bs58::decode(&addr[5..]).into_vec().unwrap(), pubkey);
    }

    #[test]
    fn free_plan_is_not_paid() {
        assert!(!Plan::Free.is_paid());
        assert!(Plan::Pro.is_paid());
    }
}
