use crate::application_impl::FailurePolicy;
use anyhow::{Result, anyhow, bail};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub auth: Auth,
    pub rate_limit: RateLimit,
    pub store: Store,
    pub http: Http,
    pub log: Log,
    #[serde(default)]
    pub users: Vec<SeedUser>,
}

#[derive(Deserialize)]
pub struct Auth {
    pub access_secret: String,
    pub refresh_secret: String,
    #[serde(default = "default_access_ttl_secs")]
    pub access_ttl_secs: u64,
    #[serde(default = "default_refresh_ttl_secs")]
    pub refresh_ttl_secs: u64,
    pub issuer: String,
    pub secret_version: String,
    #[serde(default = "default_refresh_prefix")]
    pub refresh_prefix: String,
    #[serde(default)]
    pub leeway_secs: u64,
}

// Keeps secrets out of `info!(?settings)`.
impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("issuer", &self.issuer)
            .field("secret_version", &self.secret_version)
            .field("refresh_prefix", &self.refresh_prefix)
            .field("leeway_secs", &self.leeway_secs)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
pub struct RateLimit {
    pub enabled: bool,
    pub backend: String, // "local" or "redis"
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_burst")]
    pub burst: u32,
    #[serde(default = "default_rate_limit_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub on_store_error: FailurePolicy,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Store {
    pub backend: String, // "memory" or "redis"
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    pub id: uuid::Uuid,
    pub role: String,
}

fn default_access_ttl_secs() -> u64 {
    15 * 60
}

fn default_refresh_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_refresh_prefix() -> String {
    "refresh".to_string()
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_burst() -> u32 {
    5
}

fn default_rate_limit_prefix() -> String {
    "ratelimit".to_string()
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_op_timeout_ms() -> u64 {
    2000
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.auth.access_secret.is_empty() || self.auth.refresh_secret.is_empty() {
            bail!("jwt secrets must be provided");
        }
        if self.auth.access_ttl_secs == 0 || self.auth.refresh_ttl_secs == 0 {
            bail!("token lifetimes must be non-zero");
        }
        if self.rate_limit.requests_per_minute == 0 {
            bail!("rate_limit.requests_per_minute must be at least 1");
        }
        match self.store.backend.as_str() {
            "memory" => {}
            "redis" if self.store.redis_url.is_some() => {}
            "redis" => bail!("store.redis_url is required for the redis backend"),
            other => bail!("unknown store backend: {}", other),
        }
        match self.rate_limit.backend.as_str() {
            "local" => {}
            "redis" if self.store.backend == "redis" => {}
            "redis" => bail!("rate_limit.backend = \"redis\" needs store.backend = \"redis\""),
            other => bail!("unknown rate limit backend: {}", other),
        }
        if self.http.cert_path.is_some() != self.http.key_path.is_some() {
            bail!("http.cert_path and http.key_path must be set together");
        }
        Ok(())
    }
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .add_source(
            Environment::with_prefix("SESSIONGUARD")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const BASE: &str = r#"
        [auth]
        access_secret = "a"
        refresh_secret = "r"
        issuer = "sessionguard"
        secret_version = "v1"

        [rate_limit]
        enabled = true
        backend = "local"

        [store]
        backend = "memory"

        [http]
        address = "127.0.0.1:8080"

        [log]
        filter = "info"
    "#;

    fn load(extra: &str) -> Result<Settings> {
        let text = format!("{}\n{}", BASE, extra);
        let settings: Settings = Config::builder()
            .add_source(File::from_str(&text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    #[test]
    fn defaults_fill_in() {
        let settings = load("").unwrap();
        assert_eq!(settings.auth.access_ttl_secs, 900);
        assert_eq!(settings.auth.refresh_prefix, "refresh");
        assert_eq!(settings.rate_limit.requests_per_minute, 60);
        assert_eq!(settings.rate_limit.burst, 5);
        assert_eq!(settings.rate_limit.on_store_error, FailurePolicy::Open);
        assert!(settings.users.is_empty());
    }

    #[test]
    fn seed_users_parse() {
        let settings = load(
            r#"
            [[users]]
            id = "6f1c2a5e-3a8e-4d5b-9a65-2f0a1f4e9b10"
            role = "admin"
            "#,
        )
        .unwrap();
        assert_eq!(settings.users.len(), 1);
        assert_eq!(settings.users[0].role, "admin");
    }

    #[test]
    fn debug_output_hides_secrets() {
        let settings = load("").unwrap();
        let printed = format!("{:?}", settings);
        assert!(!printed.contains("access_secret"));
    }

    #[test]
    fn redis_limiter_requires_redis_store() {
        let mut settings = load("").unwrap();
        settings.rate_limit.backend = "redis".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn empty_secret_is_rejected() {
        let mut settings = load("").unwrap();
        settings.auth.refresh_secret.clear();
        assert!(settings.validate().is_err());
    }
}
