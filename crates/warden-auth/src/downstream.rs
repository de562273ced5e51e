use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::backend::classify_status;
use crate::error::ExchangeError;
use crate::token::{Hop, TokenChainLink};

/// Calls the downstream API with an OBO token.
pub struct DownstreamClient {
    client: reqwest::Client,
    profile_url: String,
}

impl DownstreamClient {
    pub fn new(profile_url: impl Into<String>, timeout: Duration) -> Result<Self, ExchangeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExchangeError::from_http(Hop::Downstream, e))?;
        Ok(Self {
            client,
            profile_url: profile_url.into(),
        })
    }

    /// `GET` the profile resource as the signed-in user.
    pub async fn profile(&self, token: &TokenChainLink) -> Result<Value, ExchangeError> {
        let resp = self
            .client
            .get(&self.profile_url)
            .bearer_auth(token.secret())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ExchangeError::from_http(Hop::Downstream, e))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(Hop::Downstream, status, text));
        }
        debug!(status, "downstream profile fetched");
        resp.json().await.map_err(|e| ExchangeError::InvalidResponse {
            hop: Hop::Downstream,
            message: e.to_string(),
        })
    }
}
