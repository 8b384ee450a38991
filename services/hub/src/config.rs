use std::env;

/// Process configuration, read once at startup from the environment.
///
/// Mirrors the teacher's `env::var` + `.expect()`/`unwrap_or_else` pattern in
/// `main.rs`, just gathered into one struct so the rest of the binary doesn't
/// touch `std::env` directly. Every key the wire spec recognizes is read here
/// even where the feature it gates isn't implemented yet (VAPID push,
/// Stripe) — an operator setting `STRIPE_SECRET_KEY` today shouldn't have it
/// silently ignored once that Non-goal is lifted.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub node_env: String,
    pub bind_addr: String,
    pub public_url: String,
    pub trust_proxy: bool,
    pub log_level: String,
    pub turn_mode: TurnMode,
    pub turn_urls: Vec<String>,
    pub turn_username: Option<String>,
    pub turn_credential: Option<String>,
    pub turn_secret: Option<String>,
    pub stun_urls: Vec<String>,
    pub vapid_public_key: Option<String>,
    pub vapid_private_key: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    /// Not one of the wire-documented keys, but every process needs
    /// somewhere to put `/api/upload` payloads. Defaults to a local
    /// directory the way the teacher's own `./data` defaults work.
    pub uploads_dir: String,
}

/// How `/api/ice` should answer. `Custom` is the only mode that ever
/// returns TURN servers; `Public` advertises STUN-only candidates, `Off`
/// advertises nothing and leaves clients to rely on host/srflx candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnMode {
    Public,
    Custom,
    Off,
}

impl Config {
    pub fn from_env() -> Self {
        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let node_env = env::var("NODE_ENV").unwrap_or_else(|_| "production".to_owned());
        let port = env::var("PORT").ok();
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| match &port {
            Some(p) => format!("0.0.0.0:{p}"),
            None => "0.0.0.0:8080".to_owned(),
        });
        let public_url = env::var("PUBLIC_URL").unwrap_or_else(|_| format!("http://{bind_addr}"));
        let trust_proxy = matches!(env::var("TRUST_PROXY").as_deref(), Ok("1") | Ok("true"));
        let log_level = env::var("LOG_LEVEL")
            .or_else(|_| env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_owned());

        let turn_mode = match env::var("TURN_MODE").as_deref() {
            Ok("custom") => TurnMode::Custom,
            Ok("off") => TurnMode::Off,
            _ => TurnMode::Public,
        };
        let turn_urls = split_csv_env("TURN_URLS");
        let stun_urls = split_csv_env("STUN_URLS");

        Self {
            database_url,
            node_env,
            bind_addr,
            public_url,
            trust_proxy,
            log_level,
            turn_mode,
            turn_urls,
            turn_username: env::var("TURN_USERNAME").ok(),
            turn_credential: env::var("TURN_CREDENTIAL").ok(),
            turn_secret: env::var("TURN_SECRET").ok(),
            stun_urls,
            vapid_public_key: env::var("VAPID_PUBLIC_KEY").ok(),
            vapid_private_key: env::var("VAPID_PRIVATE_KEY").ok(),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").ok(),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").ok(),
            uploads_dir: env::var("UPLOADS_DIR").unwrap_or_else(|_| "./uploads".to_owned()),
        }
    }
}

fn split_csv_env(key: &str) -> Vec<String> {
    env::var(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        for (k, v) in vars {
            env::set_var(k, v);
        }
        let result = f();
        for (k, _) in vars {
            env::remove_var(k);
        }
        result
    }

    #[test]
    fn turn_mode_defaults_to_public() {
        let config = with_env(&[("DATABASE_URL", "postgres://x")], Config::from_env);
        assert_eq!(config.turn_mode, TurnMode::Public);
        env::remove_var("DATABASE_URL");
    }

    #[test]
    fn turn_mode_reads_custom() {
        let config = with_env(
            &[("DATABASE_URL", "postgres://x"), ("TURN_MODE", "custom")],
            Config::from_env,
        );
        assert_eq!(config.turn_mode, TurnMode::Custom);
        env::remove_var("DATABASE_URL");
        env::remove_var("TURN_MODE");
    }

    #[test]
    fn csv_env_splits_and_trims() {
        let result = with_env(&[("STUN_URLS", " a , b ,,c")], || split_csv_env("STUN_URLS"));
        assert_eq!(result, vec!["a", "b", "c"]);
        env::remove_var("STUN_URLS");
    }
}
