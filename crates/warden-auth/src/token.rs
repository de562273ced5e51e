use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use warden_core::Redacted;

/// One link of the token chain, and the hop that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Hop {
    Platform,
    Backend,
    Downstream,
}

impl Hop {
    pub fn as_str(self) -> &'static str {
        match self {
            Hop::Platform => "platform",
            Hop::Backend => "backend",
            Hop::Downstream => "downstream",
        }
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An issued token with its expiry.
///
/// `Debug` never prints the token value.
#[derive(Clone, PartialEq)]
pub struct TokenChainLink {
    pub kind: Hop,
    value: String,
    pub expires_at: DateTime<Utc>,
    /// Granted scope, set on downstream links.
    pub scope: Option<String>,
}

impl TokenChainLink {
    pub fn new(kind: Hop, value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            value: value.into(),
            expires_at,
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// The raw token. Callers must not log it.
    pub fn secret(&self) -> &str {
        &self.value
    }

    pub fn redacted(&self) -> Redacted<'_> {
        Redacted(&self.value)
    }

    /// Usable at `now`: expiry strictly in the future.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Whole seconds remaining at `now`, floored at zero.
    pub fn expires_in_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// `now + expires_in` seconds, or `None` when the lifetime does not fit a timestamp.
pub(crate) fn expiry_after(now: DateTime<Utc>, expires_in: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(expires_in).ok()?;
    now.checked_add_signed(chrono::Duration::try_seconds(secs)?)
}

impl fmt::Debug for TokenChainLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenChainLink")
            .field("kind", &self.kind)
            .field("value", &self.redacted())
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn debug_output_is_redacted() {
        let link = TokenChainLink::new(
            Hop::Backend,
            "super-secret-backend-token",
            Utc::now() + Duration::minutes(5),
        );
        let dbg = format!("{link:?}");
        assert!(!dbg.contains("super-secret-backend-token"));
        assert!(dbg.contains("super-"));
    }

    #[test]
    fn validity_is_strict() {
        let now = Utc::now();
        let link = TokenChainLink::new(Hop::Platform, "tok", now);
        assert!(!link.is_valid_at(now));
        assert!(link.is_valid_at(now - Duration::seconds(1)));
        assert_eq!(link.expires_in_secs(now + Duration::seconds(10)), 0);
    }

    #[test]
    fn expiry_after_rejects_unrepresentable_lifetimes() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, 60), Some(now + Duration::seconds(60)));
        assert!(expiry_after(now, 10_000_000_000_000).is_none());
        assert!(expiry_after(now, u64::MAX).is_none());
    }
}
