//! On-behalf-of relay, GET /api/obo-profile
//!
//! Auth: `Authorization: Bearer <platform-or-backend-token>`.
//!
//! The presented token runs through the backend hop and the OBO exchange;
//! the resulting downstream token reads the caller's profile.
//!
//! Response: `{"message", "downstreamProfile", "exchangeDetails": {"scopes", "expiresIn"}}`
//! Error:    `{"error", "details"?}` with the upstream status.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};
use warden_auth::ExchangeError;

use crate::app::AppState;

type Rejection = (StatusCode, Json<Value>);

pub async fn obo_profile_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, Rejection> {
    let bearer = extract_bearer(&headers).map_err(|reason| {
        warn!(reason, "OBO relay request rejected");
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": reason })))
    })?;

    let link = state
        .resolver
        .resolve_bearer(bearer)
        .await
        .map_err(|e| upstream_failure("Token exchange failed", e))?;
    let profile = state
        .downstream
        .profile(&link)
        .await
        .map_err(|e| upstream_failure("Downstream API call failed", e))?;

    let scopes: Vec<&str> = link
        .scope
        .as_deref()
        .unwrap_or_else(|| state.resolver.downstream_scope())
        .split_whitespace()
        .collect();
    let expires_in = link.expires_in_secs(Utc::now());
    info!(expires_in, "OBO relay succeeded");

    Ok(Json(json!({
        "message": "On-behalf-of exchange succeeded",
        "downstreamProfile": profile,
        "exchangeDetails": { "scopes": scopes, "expiresIn": expires_in },
    })))
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, &'static str> {
    let value = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or("Missing Authorization header")?;
    // Auth schemes are case-insensitive (RFC 7235 section 2.1).
    let (scheme, token) = value.trim_start().split_once(' ').unwrap_or((value, ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err("Authorization header must use the Bearer scheme");
    }
    Some(token.trim())
        .filter(|t| !t.is_empty())
        .ok_or("Authorization header must use the Bearer scheme")
}


fn upstream_failure(error: &str, err: ExchangeError) -> Rejection {
    let status = StatusCode::from_u16(err.upstream_status()).unwrap_or(StatusCode::BAD_GATEWAY);
    warn!(hop = %err.hop(), status = status.as_u16(), err = %err, "OBO relay failed");
    (
        status,
        Json(json!({ "error": error, "details": err.to_string() })),
    )
}
