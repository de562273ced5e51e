//! Backend hop: platform token → backend-scoped token.
//!
//! The backend identity service takes the platform token as bearer
//! credential and returns `{ token | access_token, expires_in }`.

use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use crate::error::ExchangeError;
use crate::token::{expiry_after, Hop, TokenChainLink};

pub struct BackendExchanger {
    client: reqwest::Client,
    token_url: String,
}

impl BackendExchanger {
    pub fn new(client: reqwest::Client, token_url: impl Into<String>) -> Self {
        Self {
            client,
            token_url: token_url.into(),
        }
    }

    pub async fn exchange(&self, platform: &TokenChainLink) -> Result<TokenChainLink, ExchangeError> {
        if platform.secret().is_empty() {
            return Err(ExchangeError::Unauthorized {
                hop: Hop::Backend,
                status: 401,
            });
        }

        let resp = self
            .client
            .post(&self.token_url)
            .bearer_auth(platform.secret())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ExchangeError::from_http(Hop::Backend, e))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(Hop::Backend, status, text));
        }

        let body: BackendTokenResponse = resp.json().await.map_err(|e| ExchangeError::InvalidResponse {
            hop: Hop::Backend,
            message: e.to_string(),
        })?;
        if body.token.is_empty() {
            return Err(ExchangeError::InvalidResponse {
                hop: Hop::Backend,
                message: "empty token".to_string(),
            });
        }

        let expires_at = expiry_after(Utc::now(), body.expires_in).ok_or_else(|| ExchangeError::InvalidResponse {
            hop: Hop::Backend,
            message: format!("expires_in out of range: {}", body.expires_in),
        })?;
        debug!(expires_in = body.expires_in, token = %warden_core::Redacted(&body.token), "backend token issued");
        Ok(TokenChainLink::new(Hop::Backend, body.token, expires_at))
    }
}

/// Map a non-2xx status onto the hop failure taxonomy.
pub(crate) fn classify_status(hop: Hop, status: u16, body: String) -> ExchangeError {
    match status {
        401 | 403 => ExchangeError::Unauthorized { hop, status },
        408 | 429 | 500..=599 => ExchangeError::Service {
            hop,
            status: Some(status),
            message: body,
        },
        _ => ExchangeError::Rejected {
            hop,
            status,
            message: body,
        },
    }
}

#[derive(Deserialize)]
struct BackendTokenResponse {
    #[serde(alias = "access_token", alias = "accessToken")]
    token: String,
    #[serde(default = "default_expires", alias = "expiresIn")]
    expires_in: u64,
}

fn default_expires() -> u64 {
    3600
}
