//! `GET /api/ice` -- returns the ICE server set a client should pass to its
//! `RTCPeerConnection`. TURN credentials are never static secrets sitting in
//! client code: when `TURN_SECRET` is configured, credentials are minted
//! per request via the coturn/RFC 5766 §15 time-limited scheme (HMAC-SHA1
//! over the expiry timestamp, base64-encoded); otherwise the operator's
//! static `TURN_USERNAME`/`TURN_CREDENTIAL` pair is handed back unchanged.

use axum::extract::State;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use hub_core::Plan;
use hub_protocol::{IceConfigResponse, IceServer};
use sha1::Sha1;

use crate::config::{Config, TurnMode};
use crate::state::AppState;

type HmacSha1 = Hmac<Sha1>;

/// Ephemeral TURN credentials are valid for this long after issue.
const TURN_CREDENTIAL_TTL_SECS: i64 = 6 * 60 * 60;

fn ephemeral_turn_credential(secret: &str) -> (String, String) {
    let expiry = Utc::now().timestamp() + TURN_CREDENTIAL_TTL_SECS;
    let username = expiry.to_string();
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(username.as_bytes());
    let credential = BASE64.encode(mac.finalize().into_bytes());
    (username, credential)
}

/// STUN-only for free plans; STUN+TURN for paid ones, per the call-token
/// `allow_turn` rule -- a free caller gets the same STUN set but never a
/// TURN credential, even when TURN is configured for the deployment.
pub fn build_ice_servers(config: &Config, plan: Plan) -> Vec<IceServer> {
    let mut servers = Vec::new();
    if !config.stun_urls.is_empty() {
        servers.push(IceServer { urls: config.stun_urls.clone(), username: None, credential: None });
    }

    if plan.is_paid() && config.turn_mode == TurnMode::Custom && !config.turn_urls.is_empty() {
        let (username, credential) = match &config.turn_secret {
            Some(secret) => {
                let (u, c) = ephemeral_turn_credential(secret);
                (Some(u), Some(c))
            }
            None => (config.turn_username.clone(), config.turn_credential.clone()),
        };
        servers.push(IceServer { urls: config.turn_urls.clone(), username, credential });
    }

    servers
}

/// Unauthenticated, so there's no identity to read a plan off of; reports
/// the STUN-only view every free caller would get. Paid callers see their
/// actual TURN entry in the `call-session-token` response instead.
pub async fn get_ice_config(State(state): State<AppState>) -> Json<IceConfigResponse> {
    let mode = match state.config.turn_mode {
        TurnMode::Public => "public",
        TurnMode::Custom => "custom",
        TurnMode::Off => "off",
    };
    Json(IceConfigResponse {
        mode: mode.to_owned(),
        ice_servers: build_ice_servers(&state.config, Plan::Free),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ephemeral_credential_is_base64_and_username_is_a_timestamp() {
        let (username, credential) = ephemeral_turn_credential("shared-secret");
        assert!(username.parse::<i64>().is_ok());
        assert!(BASE64.decode(&credential).is_ok());
    }

    fn test_config(turn_mode: TurnMode) -> Config {
        Config {
            database_url: String::new(),
            node_env: "test".to_owned(),
            bind_addr: String::new(),
            public_url: String::new(),
            trust_proxy: false,
            log_level: "info".to_owned(),
            turn_mode,
            turn_urls: Vec::new(),
            turn_username: None,
            turn_credential: None,
            turn_secret: None,
            stun_urls: Vec::new(),
            vapid_public_key: None,
            vapid_private_key: None,
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            uploads_dir: String::new(),
        }
    }

    #[test]
    fn build_ice_servers_is_empty_when_off_and_no_stun() {
        assert!(build_ice_servers(&test_config(TurnMode::Off), Plan::Pro).is_empty());
    }

    #[test]
    fn build_ice_servers_includes_turn_when_custom_with_static_credentials() {
        let mut config = test_config(TurnMode::Custom);
        config.turn_urls = vec!["turn:example.com:3478".to_owned()];
        config.turn_username = Some("u".to_owned());
        config.turn_credential = Some("c".to_owned());
        let servers = build_ice_servers(&config, Plan::Pro);
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].username.as_deref(), Some("u"));
    }

    #[test]
    fn build_ice_servers_omits_turn_for_free_plan_even_when_configured() {
        let mut config = test_config(TurnMode::Custom);
        config.turn_urls = vec!["turn:example.com:3478".to_owned()];
        config.turn_username = Some("u".to_owned());
        config.turn_credential = Some("c".to_owned());
        let servers = build_ice_servers(&config, Plan::Free);
        assert_eq!(servers.len(), 0);
    }
}
