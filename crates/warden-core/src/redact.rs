//! Log-safe rendering of bearer tokens and secrets.

use std::fmt;

/// Number of leading characters of a secret that may appear in logs.
const VISIBLE_PREFIX: usize = 6;

/// Display wrapper that never prints a secret in full.
///
/// `Redacted("eyJ0eXAiOiJKV1Qi...")` renders as `eyJ0eX…(412 chars)`.
/// Values no longer than the visible prefix render as `***`.
pub struct Redacted<'a>(pub &'a str);

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.0.chars().count();
        if len <= VISIBLE_PREFIX {
            return f.write_str("***");
        }
        let prefix: String = self.0.chars().take(VISIBLE_PREFIX).collect();
        write!(f, "{prefix}…({len} chars)")
    }
}

impl fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
