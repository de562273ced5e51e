//! Authorization-code + PKCE (S256) helpers.
//!
//! The browser client generates a verifier, sends its SHA-256 challenge to
//! the authorize endpoint, and redeems the returned code together with the
//! verifier at the token endpoint.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::AuthError;

const VERIFIER_BYTES: usize = 32;
const STATE_BYTES: usize = 16;

/// A verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

/// Fresh verifier (32 random bytes, base64url without padding) and challenge.
pub fn generate() -> Result<PkcePair, AuthError> {
    let verifier = random_urlsafe(VERIFIER_BYTES)?;
    let challenge = challenge_for(&verifier);
    Ok(PkcePair { verifier, challenge })
}

/// Opaque anti-forgery `state` value.
pub fn generate_state() -> Result<String, AuthError> {
    random_urlsafe(STATE_BYTES)
}

pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn random_urlsafe(len: usize) -> Result<String, AuthError> {
    let mut buf = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| AuthError::Random)?;
    Ok(URL_SAFE_NO_PAD.encode(&buf))
}

/// Parameters of an authorization request.
pub struct AuthorizeRequest<'a> {
    pub authorize_endpoint: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scope: &'a str,
    pub challenge: &'a str,
    pub state: &'a str,
}

pub fn authorize_url(req: &AuthorizeRequest<'_>) -> String {
    format!(
        "{}?client_id={}&response_type=code&redirect_uri={}&scope={}&code_challenge={}&code_challenge_method=S256&state={}",
        req.authorize_endpoint,
        urlencoding::encode(req.client_id),
        urlencoding::encode(req.redirect_uri),
        urlencoding::encode(req.scope),
        urlencoding::encode(req.challenge),
        urlencoding::encode(req.state),
    )
}

/// Tokens returned for a redeemed authorization code.
#[derive(Deserialize)]
pub struct CodeTokens {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    pub scope: Option<String>,
}

impl std::fmt::Debug for CodeTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeTokens")
            .field("access_token", &warden_core::Redacted(&self.access_token))
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Redeem `code` at the token endpoint (`grant_type=authorization_code`).
pub async fn exchange_code(
    client: &reqwest::Client,
    token_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    code: &str,
    verifier: &str,
) -> Result<CodeTokens, AuthError> {
    let resp = client
        .post(token_endpoint)
        .header("Accept", "application/json")
        .form(&[
            ("client_id", client_id),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", verifier),
        ])
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        return Err(AuthError::Service {
            status,
            message: text,
        });
    }
    resp.json().await.map_err(|e| AuthError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc7636_appendix_b_vector() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            challenge_for(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn verifier_shape() {
        let pair = generate().unwrap();
        assert_eq!(pair.verifier.len(), 43);
        assert!(!pair.verifier.contains('='));
        assert_eq!(pair.challenge, challenge_for(&pair.verifier));
        assert_ne!(generate().unwrap().verifier, pair.verifier);
    }

    #[test]
    fn authorize_url_carries_pkce_params() {
        let url = authorize_url(&AuthorizeRequest {
            authorize_endpoint: "https://login.example/authorize",
            client_id: "app",
            redirect_uri: "http://localhost:3000/redirect",
            scope: "openid profile",
            challenge: "abc",
            state: "xyz",
        });
        assert!(url.starts_with("https://login.example/authorize?"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("code_challenge=abc"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("scope=openid%20profile"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fredirect"));
    }
}
