//! Downstream hop: on-behalf-of exchange against the identity provider.

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::backend::classify_status;
use crate::error::ExchangeError;
use crate::token::{expiry_after, Hop, TokenChainLink};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Error codes meaning the assertion can never succeed as presented.
const GRANT_ERRORS: &[&str] = &["invalid_grant", "interaction_required", "consent_required"];

/// Client credentials and target scope for the OBO exchange.
pub struct OboExchanger {
    client: reqwest::Client,
    token_endpoint: String,
    client_id: String,
    client_secret: String,
    scope: String,
}

impl OboExchanger {
    pub fn new(
        client: reqwest::Client,
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub async fn exchange(&self, assertion: &TokenChainLink) -> Result<TokenChainLink, ExchangeError> {
        let resp = self
            .client
            .post(&self.token_endpoint)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", JWT_BEARER_GRANT),
                ("assertion", assertion.secret()),
                ("scope", self.scope.as_str()),
                ("requested_token_use", "on_behalf_of"),
            ])
            .send()
            .await
            .map_err(|e| ExchangeError::from_http(Hop::Downstream, e))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<OboErrorResponse>(&text) {
                if GRANT_ERRORS.contains(&err.error.as_str()) {
                    warn!(status, code = %err.error, "OBO grant rejected");
                    return Err(ExchangeError::InvalidGrant {
                        hop: Hop::Downstream,
                        code: err.error,
                        description: err.error_description.unwrap_or_default(),
                    });
                }
            }
            return Err(classify_status(Hop::Downstream, status, text));
        }

        let body: OboTokenResponse = resp.json().await.map_err(|e| ExchangeError::InvalidResponse {
            hop: Hop::Downstream,
            message: e.to_string(),
        })?;
        if body.access_token.is_empty() {
            return Err(ExchangeError::InvalidResponse {
                hop: Hop::Downstream,
                message: "empty access_token".to_string(),
            });
        }

        let now = Utc::now();
        let expires_at = expiry_after(now, body.expires_in).ok_or_else(|| ExchangeError::InvalidResponse {
            hop: Hop::Downstream,
            message: format!("expires_in out of range: {}", body.expires_in),
        })?;
        let link = TokenChainLink::new(Hop::Downstream, body.access_token, expires_at)
        .with_scope(body.scope.unwrap_or_else(|| self.scope.clone()));

        if !link.is_valid_at(now) {
            return Err(ExchangeError::Service {
                hop: Hop::Downstream,
                status: Some(status),
                message: "issued token is already expired".to_string(),
            });
        }

        debug!(expires_in = body.expires_in, scope = ?link.scope, "downstream token issued");
        Ok(link)
    }
}

#[derive(Deserialize)]
struct OboTokenResponse {
    access_token: String,
    scope: Option<String>,
    #[serde(default = "default_expires")]
    expires_in: u64,
}

fn default_expires() -> u64 {
    3600
}

#[derive(Deserialize)]
struct OboErrorResponse {
    error: String,
    error_description: Option<String>,
}
