//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.safebot/config.json`) and environment.
//! The environment names match the ones the Heroku deployment already sets
//! (`PAGE_ACCESS_TOKEN`, `FB_VERIFY_TOKEN`, `CLIENT_ID`, `CLIENT_SECRET`, `PORT`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Messenger page credentials and Send API endpoint.
    #[serde(default)]
    pub messenger: MessengerConfig,

    /// SafeTrek OAuth client settings.
    #[serde(default)]
    pub safetrek: SafeTrekConfig,
}

/// Listener bind, port, and outbound HTTP policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for the webhook listener (default 1337). Overridden by PORT env.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0"; Messenger must be able to reach the webhook).
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Timeout applied to every outbound call (Send API and token endpoint).
    #[serde(default = "default_outbound_timeout_secs")]
    pub outbound_timeout_secs: u64,
}

fn default_gateway_port() -> u16 {
    1337
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_outbound_timeout_secs() -> u64 {
    10
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            outbound_timeout_secs: default_outbound_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    /// Outbound timeout as a Duration; zero is bumped to one second so calls stay bounded.
    pub fn outbound_timeout(&self) -> Duration {
        Duration::from_secs(self.outbound_timeout_secs.max(1))
    }
}

/// Messenger page config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessengerConfig {
    /// Page access token for the Send API. Overridden by PAGE_ACCESS_TOKEN env.
    pub page_access_token: Option<String>,
    /// Secret compared against hub.verify_token. Overridden by FB_VERIFY_TOKEN env.
    pub verify_token: Option<String>,
    #[serde(default = "default_send_api_url")]
    pub send_api_url: String,
}

fn default_send_api_url() -> String {
    "https://graph.facebook.com/v2.6/me/messages".to_string()
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            page_access_token: None,
            verify_token: None,
            send_api_url: default_send_api_url(),
        }
    }
}

/// SafeTrek OAuth client config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeTrekConfig {
    /// Overridden by CLIENT_ID env.
    pub client_id: Option<String>,
    /// Overridden by CLIENT_SECRET env.
    pub client_secret: Option<String>,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_audience")]
    pub audience: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Where SafeTrek sends the user back with `?code=`; must be this service's /webhook.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_state")]
    pub state: String,
}

fn default_authorize_url() -> String {
    "https://account-sandbox.safetrek.io/authorize".to_string()
}

fn default_audience() -> String {
    "https://api-sandbox.safetrek.io".to_string()
}

fn default_token_url() -> String {
    "https://login.safetrek.io/oauth/token".to_string()
}

fn default_redirect_uri() -> String {
    "https://safe-bot.herokuapp.com/webhook".to_string()
}

fn default_state() -> String {
    "statecode".to_string()
}

impl Default for SafeTrekConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            authorize_url: default_authorize_url(),
            audience: default_audience(),
            token_url: default_token_url(),
            redirect_uri: default_redirect_uri(),
            state: default_state(),
        }
    }
}

/// Read a non-empty, trimmed env var.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Env wins over config; blank config values count as unset.
fn env_or(name: &str, configured: &Option<String>) -> Option<String> {
    env_value(name).or_else(|| {
        configured
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the page access token: env PAGE_ACCESS_TOKEN overrides config.
pub fn resolve_page_access_token(config: &Config) -> Option<String> {
    env_or("PAGE_ACCESS_TOKEN", &config.messenger.page_access_token)
}

/// Resolve the webhook verify secret: env FB_VERIFY_TOKEN overrides config.
pub fn resolve_verify_token(config: &Config) -> Option<String> {
    env_or("FB_VERIFY_TOKEN", &config.messenger.verify_token)
}

/// Resolve the SafeTrek client id: env CLIENT_ID overrides config.
pub fn resolve_client_id(config: &Config) -> Option<String> {
    env_or("CLIENT_ID", &config.safetrek.client_id)
}

/// Resolve the SafeTrek client secret: env CLIENT_SECRET overrides config.
pub fn resolve_client_secret(config: &Config) -> Option<String> {
    env_or("CLIENT_SECRET", &config.safetrek.client_secret)
}

/// Parse a PORT value; None when it is not a valid u16.
fn parse_port(raw: &str) -> Option<u16> {
    raw.trim().parse::<u16>().ok()
}

/// Apply environment overrides that change the config itself (currently PORT).
/// Secrets are resolved lazily through the `resolve_*` helpers instead.
pub fn apply_env_overrides(config: &mut Config) {
    if let Some(raw) = env_value("PORT") {
        match parse_port(&raw) {
            Some(port) => config.gateway.port = port,
            None => log::warn!("ignoring invalid PORT value: {}", raw),
        }
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("SAFEBOT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".safebot").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, the default path, or SAFEBOT_CONFIG_PATH. Missing file => default config.
/// Environment overrides are applied before returning.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    apply_env_overrides(&mut config);
    Ok((config, path))
}
