//! SafeTrek OAuth: authorization URL, authorization-code exchange, and the token store.
//!
//! The store holds one token for the whole service (SafeTrek accounts are not yet mapped
//! to Messenger users). A successful exchange replaces the stored record wholesale, so
//! concurrent exchanges resolve last-write-wins.

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::{self, Config};

/// Scopes requested at login; `offline_access` is what gets us a refresh token.
pub const LOGIN_SCOPE: &str = "openid phone offline_access";

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("safetrek {0} not configured")]
    NotConfigured(&'static str),
    #[error("invalid safetrek url: {0}")]
    InvalidUrl(String),
    #[error("safetrek token request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("safetrek token api error: {0}")]
    Api(String),
    #[error("safetrek token response invalid: {0}")]
    InvalidResponse(String),
}

/// Current SafeTrek credential.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    /// Recorded for callers; nothing refreshes the token automatically.
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

impl OAuthToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    code: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    redirect_uri: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_token(self, now: DateTime<Utc>) -> OAuthToken {
        let expires_at = self
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(TimeDelta::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl));
        OAuthToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at,
            scope: self.scope,
        }
    }
}

/// Holder of the current SafeTrek token. Writes replace the whole record; reads clone it.
#[derive(Debug, Default)]
pub struct TokenStore {
    current: RwLock<Option<OAuthToken>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored token (no merge with the previous record).
    pub async fn replace(&self, token: OAuthToken) {
        *self.current.write().await = Some(token);
    }

    pub async fn current(&self) -> Option<OAuthToken> {
        self.current.read().await.clone()
    }

    /// True when a token is stored and not past its recorded expiry.
    pub async fn is_authorized(&self, now: DateTime<Utc>) -> bool {
        self.current
            .read()
            .await
            .as_ref()
            .map(|t| !t.is_expired(now))
            .unwrap_or(false)
    }
}

/// SafeTrek OAuth client (authorization URL + token endpoint).
#[derive(Clone)]
pub struct SafeTrekClient {
    client: reqwest::Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    authorize_url: String,
    audience: String,
    token_url: String,
    redirect_uri: String,
    state: String,
}

impl SafeTrekClient {
    /// Build from config; CLIENT_ID / CLIENT_SECRET env take precedence. `client` should carry the outbound timeout.
    pub fn from_config(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            client_id: config::resolve_client_id(config),
            client_secret: config::resolve_client_secret(config),
            authorize_url: config.safetrek.authorize_url.clone(),
            audience: config.safetrek.audience.clone(),
            token_url: config.safetrek.token_url.clone(),
            redirect_uri: config.safetrek.redirect_uri.clone(),
            state: config.safetrek.state.clone(),
        }
    }

    fn client_id(&self) -> Result<&str, OAuthError> {
        self.client_id
            .as_deref()
            .ok_or(OAuthError::NotConfigured("client id"))
    }

    /// Login URL the "get started" button points at.
    pub fn authorization_url(&self) -> Result<Url, OAuthError> {
        let client_id = self.client_id()?;
        Url::parse_with_params(
            &self.authorize_url,
            &[
                ("audience", self.audience.as_str()),
                ("client_id", client_id),
                ("scope", LOGIN_SCOPE),
                ("state", self.state.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.redirect_uri.as_str()),
            ],
        )
        .map_err(|e| OAuthError::InvalidUrl(format!("{}: {}", self.authorize_url, e)))
    }

    /// Exchange an authorization code for a token and store it. On any error the store is left untouched.
    pub async fn exchange(&self, code: &str, store: &TokenStore) -> Result<OAuthToken, OAuthError> {
        let client_id = self.client_id()?;
        let client_secret = self
            .client_secret
            .as_deref()
            .ok_or(OAuthError::NotConfigured("client secret"))?;
        let body = TokenRequest {
            grant_type: "authorization_code",
            code,
            client_id,
            client_secret,
            redirect_uri: &self.redirect_uri,
        };
        let res = self.client.post(&self.token_url).json(&body).send().await?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(OAuthError::Api(format!("{} {}", status, text)));
        }
        let parsed: TokenResponse =
            serde_json::from_str(&text).map_err(|e| OAuthError::InvalidResponse(e.to_string()))?;
        let token = parsed.into_token(Utc::now());
        store.replace(token.clone()).await;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_id(id: Option<&str>) -> SafeTrekClient {
        let mut config = Config::default();
        config.safetrek.client_id = id.map(str::to_string);
        let mut c = SafeTrekClient::from_config(reqwest::Client::new(), &config);
        // Pin the id so a CLIENT_ID in the test environment does not leak in.
        c.client_id = id.map(str::to_string);
        c
    }

    fn token(access: &str) -> OAuthToken {
        OAuthToken {
            access_token: access.to_string(),
            refresh_token: Some(format!("{}-refresh", access)),
            token_type: "Bearer".to_string(),
            expires_at: None,
            scope: None,
        }
    }

    #[test]
    fn authorization_url_is_query_encoded() {
        let url = client_with_id(Some("client id&x")).authorization_url().unwrap();
        assert_eq!(url.host_str(), Some("account-sandbox.safetrek.io"));
        assert_eq!(url.path(), "/authorize");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("audience".to_string(), "https://api-sandbox.safetrek.io".to_string()),
                ("client_id".to_string(), "client id&x".to_string()),
                ("scope".to_string(), LOGIN_SCOPE.to_string()),
                ("state".to_string(), "statecode".to_string()),
                ("response_type".to_string(), "code".to_string()),
                (
                    "redirect_uri".to_string(),
                    "https://safe-bot.herokuapp.com/webhook".to_string()
                ),
            ]
        );
        assert!(!url.as_str().contains("client id&x"));
    }

    #[test]
    fn authorization_url_requires_client_id() {
        assert!(matches!(
            client_with_id(None).authorization_url(),
            Err(OAuthError::NotConfigured("client id"))
        ));
    }

    #[test]
    fn token_response_records_expiry() {
        let now = Utc::now();
        let parsed: TokenResponse = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","token_type":"Bearer","expires_in":36000,"scope":"openid phone offline_access"}"#,
        )
        .unwrap();
        let token = parsed.into_token(now);
        assert_eq!(token.access_token, "a");
        assert_eq!(token.refresh_token.as_deref(), Some("r"));
        assert_eq!(token.expires_at, Some(now + TimeDelta::seconds(36000)));
        assert!(!token.is_expired(now));
        assert!(token.is_expired(now + TimeDelta::seconds(36000)));
    }

    #[test]
    fn token_response_without_optional_fields() {
        let parsed: TokenResponse = serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();
        let token = parsed.into_token(Utc::now());
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.expires_at, None);
        assert_eq!(token.refresh_token, None);
    }

    #[tokio::test]
    async fn store_replaces_whole_record() {
        let store = TokenStore::new();
        assert_eq!(store.current().await, None);
        assert!(!store.is_authorized(Utc::now()).await);

        store.replace(token("first")).await;
        let mut second = token("second");
        second.refresh_token = None;
        store.replace(second.clone()).await;

        assert_eq!(store.current().await, Some(second));
        assert!(store.is_authorized(Utc::now()).await);
    }

    #[tokio::test]
    async fn exchange_without_secret_leaves_store_empty() {
        let mut c = client_with_id(Some("id"));
        c.client_secret = None;
        let store = TokenStore::new();
        let err = c.exchange("code", &store).await.unwrap_err();
        assert!(matches!(err, OAuthError::NotConfigured("client secret")));
        assert_eq!(store.current().await, None);
    }
}
