use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::error::AuthError;
use crate::token::{Hop, TokenChainLink};

/// Lifetime assumed when the token service omits an expiration.
const DEFAULT_PLATFORM_TTL_SECS: i64 = 3600;

/// A user's platform sign-in token for one connection.
#[derive(Clone, PartialEq)]
pub struct PlatformToken {
    pub connection_name: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl PlatformToken {
    pub fn into_link(self) -> TokenChainLink {
        TokenChainLink::new(Hop::Platform, self.token, self.expires_at)
    }
}

impl std::fmt::Debug for PlatformToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformToken")
            .field("connection_name", &self.connection_name)
            .field("token", &warden_core::Redacted(&self.token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The platform's per-user token cache.
///
/// `Ok(None)` means "no token": the user has to sign in.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Cached token, or the one a magic code redeems to.
    async fn get_token(
        &self,
        user_id: &str,
        connection: &str,
        magic_code: Option<&str>,
    ) -> Result<Option<PlatformToken>, AuthError>;

    /// Swap an SSO-exchangeable token for a platform token.
    async fn exchange_token(
        &self,
        user_id: &str,
        connection: &str,
        exchangeable: &str,
    ) -> Result<Option<PlatformToken>, AuthError>;

    async fn sign_out(&self, user_id: &str, connection: &str) -> Result<(), AuthError>;
}

// ── In-process store ─────────────────────────────────────────────────────────

/// Token store held in memory. Used in local mode and in tests.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: DashMap<(String, String), PlatformToken>,
    magic_codes: DashMap<(String, String), PlatformToken>,
    exchangeable: DashMap<String, PlatformToken>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_token(&self, user_id: &str, token: PlatformToken) {
        self.tokens
            .insert((user_id.to_string(), token.connection_name.clone()), token);
    }

    /// Register a one-time magic code that redeems to `token`.
    pub fn insert_magic_code(&self, user_id: &str, code: &str, token: PlatformToken) {
        self.magic_codes
            .insert((user_id.to_string(), code.to_string()), token);
    }

    pub fn insert_exchangeable(&self, exchangeable: &str, token: PlatformToken) {
        self.exchangeable.insert(exchangeable.to_string(), token);
    }

    pub fn has_token(&self, user_id: &str, connection: &str) -> bool {
        self.tokens
            .contains_key(&(user_id.to_string(), connection.to_string()))
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get_token(
        &self,
        user_id: &str,
        connection: &str,
        magic_code: Option<&str>,
    ) -> Result<Option<PlatformToken>, AuthError> {
        if let Some(code) = magic_code {
            let Some((_, token)) = self
                .magic_codes
                .remove(&(user_id.to_string(), code.to_string()))
            else {
                return Ok(None);
            };
            if token.connection_name != connection {
                return Ok(None);
            }
            self.insert_token(user_id, token.clone());
            return Ok(Some(token));
        }
        let key = (user_id.to_string(), connection.to_string());
        let now = Utc::now();
        match self.tokens.get(&key) {
            Some(t) if t.expires_at > now => Ok(Some(t.clone())),
            _ => Ok(None),
        }
    }

    async fn exchange_token(
        &self,
        user_id: &str,
        connection: &str,
        exchangeable: &str,
    ) -> Result<Option<PlatformToken>, AuthError> {
        match self.exchangeable.get(exchangeable) {
            Some(t) if t.connection_name == connection => {
                let token = t.clone();
                drop(t);
                self.insert_token(user_id, token.clone());
                Ok(Some(token))
            }
            _ => Ok(None),
        }
    }

    async fn sign_out(&self, user_id: &str, connection: &str) -> Result<(), AuthError> {
        self.tokens
            .remove(&(user_id.to_string(), connection.to_string()));
        Ok(())
    }
}

// ── Remote user-token service ────────────────────────────────────────────────

/// Client for a Bot-Framework-style user-token service.
///
/// Endpoints: `GET /api/usertoken/GetToken`, `POST /api/usertoken/exchange`,
/// `DELETE /api/usertoken/SignOut`. 404 means "no token".
pub struct HttpTokenStore {
    client: reqwest::Client,
    base_url: String,
    app_token: Option<String>,
}

impl HttpTokenStore {
    pub fn new(base_url: impl Into<String>, app_token: Option<String>, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_token,
        })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.app_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn read_token(
        resp: reqwest::Response,
        connection: &str,
    ) -> Result<Option<PlatformToken>, AuthError> {
        let status = resp.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if status.is_client_error() {
            let text = resp.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), body = %text, "token service declined");
            return Ok(None);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "token service error");
            return Err(AuthError::Service {
                status: status.as_u16(),
                message: text,
            });
        }
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::Parse(e.to_string()))?;
        if body.token.is_empty() {
            return Ok(None);
        }
        Ok(Some(PlatformToken {
            connection_name: body
                .connection_name
                .unwrap_or_else(|| connection.to_string()),
            token: body.token,
            expires_at: body
                .expiration
                .unwrap_or_else(|| Utc::now() + chrono::Duration::seconds(DEFAULT_PLATFORM_TTL_SECS)),
        }))
    }
}

#[async_trait]
impl TokenStore for HttpTokenStore {
    #[instrument(skip(self, magic_code), fields(has_code = magic_code.is_some()))]
    async fn get_token(
        &self,
        user_id: &str,
        connection: &str,
        magic_code: Option<&str>,
    ) -> Result<Option<PlatformToken>, AuthError> {
        let mut url = format!(
            "{}/api/usertoken/GetToken?userId={}&connectionName={}",
            self.base_url,
            urlencoding::encode(user_id),
            urlencoding::encode(connection)
        );
        if let Some(code) = magic_code {
            url.push_str("&code=");
            url.push_str(&urlencoding::encode(code));
        }
        let resp = self.authorize(self.client.get(&url)).send().await?;
        Self::read_token(resp, connection).await
    }

    #[instrument(skip(self, exchangeable))]
    async fn exchange_token(
        &self,
        user_id: &str,
        connection: &str,
        exchangeable: &str,
    ) -> Result<Option<PlatformToken>, AuthError> {
        let url = format!(
            "{}/api/usertoken/exchange?userId={}&connectionName={}",
            self.base_url,
            urlencoding::encode(user_id),
            urlencoding::encode(connection)
        );
        let resp = self
            .authorize(self.client.post(&url))
            .json(&serde_json::json!({ "token": exchangeable }))
            .send()
            .await?;
        Self::read_token(resp, connection).await
    }

    #[instrument(skip(self))]
    async fn sign_out(&self, user_id: &str, connection: &str) -> Result<(), AuthError> {
        let url = format!(
            "{}/api/usertoken/SignOut?userId={}&connectionName={}",
            self.base_url,
            urlencoding::encode(user_id),
            urlencoding::encode(connection)
        );
        let resp = self.authorize(self.client.delete(&url)).send().await?;
        let status = resp.status();
        if status.is_success() || status.as_u16() == 404 {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(AuthError::Service {
            status: status.as_u16(),
            message: text,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    #[serde(default)]
    token: String,
    connection_name: Option<String>,
    expiration: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(value: &str) -> PlatformToken {
        PlatformToken {
            connection_name: "conn".into(),
            token: value.into(),
            expires_at: Utc::now() + chrono::Duration::minutes(30),
        }
    }

    #[tokio::test]
    async fn magic_code_is_single_use() {
        let store = MemoryTokenStore::new();
        store.insert_magic_code("u1", "123456", token("p1"));

        let first = store.get_token("u1", "conn", Some("123456")).await.unwrap();
        assert_eq!(first.unwrap().token, "p1");
        assert!(store.get_token("u1", "conn", Some("123456")).await.unwrap().is_none());
        // The redeemed token is now cached for the user.
        assert!(store.get_token("u1", "conn", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_token_is_not_returned() {
        let store = MemoryTokenStore::new();
        let mut t = token("p1");
        t.expires_at = Utc::now() - chrono::Duration::seconds(1);
        store.insert_token("u1", t);
        assert!(store.get_token("u1", "conn", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exchange_and_sign_out() {
        let store = MemoryTokenStore::new();
        store.insert_exchangeable("sso-abc", token("p2"));
        assert!(store.exchange_token("u1", "other", "sso-abc").await.unwrap().is_none());
        let got = store.exchange_token("u1", "conn", "sso-abc").await.unwrap();
        assert_eq!(got.unwrap().token, "p2");
        assert!(store.has_token("u1", "conn"));
        store.sign_out("u1", "conn").await.unwrap();
        assert!(!store.has_token("u1", "conn"));
    }

    #[test]
    fn debug_hides_token() {
        let dbg = format!("{:?}", token("very-secret-platform"));
        assert!(!dbg.contains("very-secret-platform"));
    }
}
