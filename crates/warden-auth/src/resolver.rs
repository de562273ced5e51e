use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use warden_core::config::OboAssertion;
use warden_core::{WardenConfig, WardenError};

use crate::backend::BackendExchanger;
use crate::cache::TokenCache;
use crate::error::{AuthError, ExchangeError};
use crate::obo::OboExchanger;
use crate::retry::RetryPolicy;
use crate::store::{PlatformToken, TokenStore};
use crate::token::{Hop, TokenChainLink};

/// Result of a chain lookup.
#[derive(Debug)]
pub enum TokenOutcome {
    Token(TokenChainLink),
    /// The user must sign in again before `hop` can succeed.
    SigninRequired { hop: Hop, reason: String },
    /// Non-recoverable failure for this request.
    Failed(ExchangeError),
}

impl TokenOutcome {
    fn from_error(err: ExchangeError) -> Self {
        if err.is_recoverable() {
            TokenOutcome::SigninRequired {
                hop: err.hop(),
                reason: err.to_string(),
            }
        } else {
            TokenOutcome::Failed(err)
        }
    }

    pub fn token(self) -> Option<TokenChainLink> {
        match self {
            TokenOutcome::Token(link) => Some(link),
            _ => None,
        }
    }

    pub fn is_token(&self) -> bool {
        matches!(self, TokenOutcome::Token(_))
    }
}

/// Platform → backend → downstream token chain for one connection.
///
/// Each hop's result is cached per (user, connection, hop) until it expires.
pub struct TokenChainResolver {
    store: Arc<dyn TokenStore>,
    cache: Arc<TokenCache>,
    backend: BackendExchanger,
    obo: OboExchanger,
    retry: RetryPolicy,
    connection: String,
    assertion: OboAssertion,
}

impl TokenChainResolver {
    /// Build from validated configuration.
    pub fn from_config(config: &WardenConfig, store: Arc<dyn TokenStore>) -> warden_core::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http.timeout_ms))
            .build()
            .map_err(|e| WardenError::Config(format!("cannot build HTTP client: {e}")))?;
        let identity = &config.identity;
        Ok(Self {
            store,
            cache: Arc::new(TokenCache::new()),
            backend: BackendExchanger::new(client.clone(), config.backend.token_url.clone()),
            obo: OboExchanger::new(
                client,
                identity.token_endpoint(),
                identity.client_id.clone(),
                identity.client_secret.clone(),
                identity.downstream_scope.clone(),
            ),
            retry: RetryPolicy::from_config(&config.http),
            connection: config.bot.connection_name.clone(),
            assertion: identity.obo_assertion,
        })
    }

    pub fn connection_name(&self) -> &str {
        &self.connection
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    pub fn downstream_scope(&self) -> &str {
        self.obo.scope()
    }

    /// Cache a platform token obtained by the sign-in dialog.
    pub fn remember_platform(&self, user_id: &str, token: PlatformToken) -> TokenChainLink {
        let link = token.into_link();
        self.cache.put(user_id, &self.connection, link.clone());
        link
    }

    /// Forget every cached hop for the user (logout, revoked grant).
    pub fn forget(&self, user_id: &str) {
        self.cache.evict_user(user_id, &self.connection);
    }

    /// Hop 1: cached platform token. A miss means the user must sign in.
    #[instrument(skip(self))]
    pub async fn platform(&self, user_id: &str) -> TokenOutcome {
        if let Some(link) = self.cache.get(user_id, &self.connection, Hop::Platform, Utc::now()) {
            debug!("platform token cache hit");
            return TokenOutcome::Token(link);
        }
        match self.store.get_token(user_id, &self.connection, None).await {
            Ok(Some(token)) if !token.token.is_empty() => {
                TokenOutcome::Token(self.remember_platform(user_id, token))
            }
            Ok(_) => TokenOutcome::SigninRequired {
                hop: Hop::Platform,
                reason: "no platform token cached".to_string(),
            },
            Err(e) => TokenOutcome::Failed(store_failure(e)),
        }
    }

    /// Hop 2: exchange the platform token for a backend token.
    #[instrument(skip(self, platform), fields(platform = %platform.redacted()))]
    pub async fn backend(&self, user_id: &str, platform: &TokenChainLink) -> TokenOutcome {
        if let Some(link) = self.cache.get(user_id, &self.connection, Hop::Backend, Utc::now()) {
            debug!("backend token cache hit");
            return TokenOutcome::Token(link);
        }
        match self.retry.run(Hop::Backend, || self.backend.exchange(platform)).await {
            Ok(link) => {
                self.cache.put(user_id, &self.connection, link.clone());
                TokenOutcome::Token(link)
            }
            Err(e) => {
                if e.is_recoverable() {
                    self.cache.evict(user_id, &self.connection, Hop::Platform);
                }
                warn!(err = %e, "backend hop failed");
                TokenOutcome::from_error(e)
            }
        }
    }

    /// Hop 3: on-behalf-of exchange using `assertion`.
    #[instrument(skip(self, assertion), fields(assertion_kind = %assertion.kind))]
    pub async fn downstream(&self, user_id: &str, assertion: &TokenChainLink) -> TokenOutcome {
        if let Some(link) = self.cache.get(user_id, &self.connection, Hop::Downstream, Utc::now()) {
            debug!("downstream token cache hit");
            return TokenOutcome::Token(link);
        }
        match self.retry.run(Hop::Downstream, || self.obo.exchange(assertion)).await {
            Ok(link) => {
                self.cache.put(user_id, &self.connection, link.clone());
                TokenOutcome::Token(link)
            }
            Err(e) => {
                if matches!(e, ExchangeError::InvalidGrant { .. }) {
                    info!("grant rejected, evicting cached chain");
                    self.forget(user_id);
                }
                warn!(err = %e, "downstream hop failed");
                TokenOutcome::from_error(e)
            }
        }
    }

    /// Platform then backend.
    pub async fn resolve_backend(&self, user_id: &str) -> TokenOutcome {
        let platform = match self.platform(user_id).await {
            TokenOutcome::Token(link) => link,
            other => return other,
        };
        self.backend(user_id, &platform).await
    }

    /// Full chain. The backend hop always runs first so an invalid platform
    /// token never reaches the identity provider.
    pub async fn resolve_downstream(&self, user_id: &str) -> TokenOutcome {
        let platform = match self.platform(user_id).await {
            TokenOutcome::Token(link) => link,
            other => return other,
        };
        let backend = match self.backend(user_id, &platform).await {
            TokenOutcome::Token(link) => link,
            other => return other,
        };
        let assertion = match self.assertion {
            OboAssertion::Platform => &platform,
            OboAssertion::Backend => &backend,
        };
        self.downstream(user_id, assertion).await
    }

    /// Chain for a caller-supplied bearer token (the OBO relay). Nothing is
    /// cached: there is no user identity to key on, and there is no dialog
    /// to re-prompt, so the raw exchange error is returned.
    #[instrument(skip(self, bearer), fields(bearer = %warden_core::Redacted(bearer)))]
    pub async fn resolve_bearer(&self, bearer: &str) -> Result<TokenChainLink, ExchangeError> {
        let presented = TokenChainLink::new(
            Hop::Platform,
            bearer,
            Utc::now() + chrono::Duration::hours(1),
        );
        let backend = self
            .retry
            .run(Hop::Backend, || self.backend.exchange(&presented))
            .await?;
        let assertion = match self.assertion {
            OboAssertion::Platform => &presented,
            OboAssertion::Backend => &backend,
        };
        self.retry
            .run(Hop::Downstream, || self.obo.exchange(assertion))
            .await
    }
}

fn store_failure(err: AuthError) -> ExchangeError {
    match err {
        AuthError::Http(e) => ExchangeError::from_http(Hop::Platform, e),
        AuthError::Service { status, message } => ExchangeError::Service {
            hop: Hop::Platform,
            status: Some(status),
            message,
        },
        AuthError::Parse(message) => ExchangeError::InvalidResponse {
            hop: Hop::Platform,
            message,
        },
        AuthError::Random => ExchangeError::Service {
            hop: Hop::Platform,
            status: None,
            message: "secure random generator failed".to_string(),
        },
    }
}
